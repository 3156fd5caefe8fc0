//! Error types for matchmaking and sessions.

use quatro_protocol::{ParticipantId, SessionId};

/// Errors raised by queue and session operations.
///
/// Every variant is a rejection of one request. None of them leaves
/// queue or session state partially modified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("participant {0} is already queued")]
    AlreadyQueued(ParticipantId),

    /// The one-session-per-participant rule.
    #[error("participant {0} is already in a session")]
    AlreadyInSession(ParticipantId),

    #[error("queue is full ({max} entries)")]
    QueueFull { max: usize },

    #[error("participant {0} is not queued")]
    NotQueued(ParticipantId),

    /// An admin targeted someone who is not waiting.
    #[error("participant {0} is not queued")]
    TargetNotQueued(ParticipantId),

    #[error("participant {0} is not paired")]
    NotPaired(ParticipantId),

    #[error("not your turn")]
    NotYourTurn,

    #[error("column {0} is out of range")]
    InvalidColumn(i64),

    #[error("column {0} is full")]
    ColumnFull(usize),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("participant {0} is not in session {1}")]
    NotInSession(ParticipantId, SessionId),

    /// The request needs a privileged identity.
    #[error("operation not permitted")]
    NotPermitted,

    #[error("participant {0} is already connected")]
    AlreadyConnected(ParticipantId),

    #[error("participant {0} is not connected")]
    NotConnected(ParticipantId),

    /// The lobby actor has stopped.
    #[error("lobby is unavailable")]
    Unavailable,
}

impl MatchError {
    /// Short reason shown to the participant. Never contains ids.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AlreadyQueued(_) => "You are already in the queue",
            Self::AlreadyInSession(_) => "You are already in a game",
            Self::QueueFull { .. } => "The queue is full",
            Self::NotQueued(_) => "You are not in the queue",
            Self::TargetNotQueued(_) => "Participant is not in the queue",
            Self::NotPaired(_) => "You are not in a game",
            Self::NotYourTurn => "Not your turn",
            Self::InvalidColumn(_) => "Invalid column",
            Self::ColumnFull(_) => "Column is full",
            Self::SessionNotFound(_) => "Game not found",
            Self::NotInSession(..) => "You are not playing in this game",
            Self::NotPermitted => "Not permitted",
            Self::AlreadyConnected(_) => "Already connected elsewhere",
            Self::NotConnected(_) => "Not connected",
            Self::Unavailable => "Server is shutting down",
        }
    }
}

