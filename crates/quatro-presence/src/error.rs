//! Error types for the presence layer.

use quatro_protocol::ParticipantId;

/// Errors raised while admitting or tracking a connection.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The handshake token did not resolve to an identity.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No activity record exists for the participant.
    #[error("participant {0} is not connected")]
    NotFound(ParticipantId),

    /// The participant already holds a live connection. One connection
    /// per participant.
    #[error("participant {0} is already connected")]
    AlreadyConnected(ParticipantId),
}
