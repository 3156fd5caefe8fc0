//! Wire types: identities, events in both directions, and the envelope
//! that carries them.
//!
//! Events are internally tagged on an `event` field with snake_case names,
//! so a move looks like:
//!
//! ```json
//! { "event": "submit_move", "session_id": 4, "column": 3 }
//! ```

use std::fmt;

use quatro_engine::{Board, Difficulty, Token};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies a human participant. Serializes as a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// Identifies a live session (one game).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// Identifies a persisted match record. Assigned by the store, and
/// unrelated to the [`SessionId`] of the live game it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

/// One side of a session: a human participant or the synthetic bot.
///
/// JSON: `{"human": 42}` or `"bot"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    Human(ParticipantId),
    Bot,
}

impl Seat {
    /// The participant behind this seat, if it is human.
    pub fn participant(self) -> Option<ParticipantId> {
        match self {
            Self::Human(id) => Some(id),
            Self::Bot => None,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human(id) => id.fmt(f),
            Self::Bot => f.write_str("bot"),
        }
    }
}

/// Public face of a participant: what other players and admins see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub participant_id: ParticipantId,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Who is recorded as facing a participant in `session_started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opponent {
    pub seat: Seat,
    pub display_name: String,
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Session vocabulary
// ---------------------------------------------------------------------------

/// Whether a session pairs two humans or a human with the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    HumanPair,
    HumanVsBot,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// A drop completed four in a row.
    Win,
    /// The board filled with no winner.
    Draw,
    Resign,
    Disconnect,
    Inactivity,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Win => "win",
            Self::Draw => "draw",
            Self::Resign => "resign",
            Self::Disconnect => "disconnect",
            Self::Inactivity => "inactivity",
        })
    }
}

/// The most recent drop in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMove {
    pub seat: Seat,
    pub token: Token,
    pub row: usize,
    pub column: usize,
}

// ---------------------------------------------------------------------------
// Queue, leaderboard, and presence rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Paired,
}

/// One line of the waiting-line snapshot. `position` starts at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRow {
    pub position: usize,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub avatar: Option<String>,
    pub status: QueueStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub avatar: Option<String>,
    pub wins: u32,
    pub losses: u32,
    pub points: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Active,
    Inactive,
}

/// A connected participant as seen by the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRow {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub avatar: Option<String>,
    pub status: PresenceStatus,
    /// Unix milliseconds of the last inbound event.
    pub last_activity: u64,
}

/// Operational view assembled for privileged observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSnapshot {
    pub online_count: usize,
    pub inactive_count: usize,
    pub queue_size: usize,
    /// `None` when the store could not be reached.
    pub total_accounts: Option<u64>,
    pub online_users: Vec<PresenceRow>,
    pub queue: Vec<QueueRow>,
    pub roster: Vec<ParticipantProfile>,
    pub active_sessions: usize,
}

/// A finished match as listed by `match_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub session_id: SessionId,
    pub mode: SessionMode,
    /// First mover first.
    pub seats: [Seat; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    /// `None` on a draw.
    pub winner: Option<Seat>,
    pub reason: FinishReason,
    /// The board in its `/`-separated string form.
    pub final_board: String,
    pub move_count: usize,
    pub started_at: u64,
    pub finished_at: u64,
}

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Who an outbound event is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected participant.
    All,
    /// A single participant.
    Participant(ParticipantId),
    /// Everyone who joined the session's observer group.
    Session(SessionId),
    /// Connected privileged participants.
    Admins,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Everything a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// First frame on a connection. The token is resolved to an identity
    /// before any other event is accepted.
    Hello { token: String },

    JoinQueue,
    LeaveQueue,

    StartBotSession {
        #[serde(default)]
        difficulty: Difficulty,
    },

    /// `column` is signed so that negative input is reported as an
    /// invalid column instead of a decode failure.
    SubmitMove { session_id: SessionId, column: i64 },

    Resign { session_id: SessionId },

    /// Renews activity without doing anything else.
    Heartbeat,

    /// Asks for the current waiting line and roster.
    QueueState,

    /// Asks for recent finished matches, newest first. Without an id the
    /// sender's own history is listed; other ids need privilege.
    MatchHistory {
        #[serde(default)]
        participant_id: Option<ParticipantId>,
    },

    // Privileged
    ClearQueue,
    RemoveFromQueue { participant_id: ParticipantId },
    AdminSnapshot,
}

impl ClientEvent {
    /// The snake_case event name, used to label `request_result` replies.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::JoinQueue => "join_queue",
            Self::LeaveQueue => "leave_queue",
            Self::StartBotSession { .. } => "start_bot_session",
            Self::SubmitMove { .. } => "submit_move",
            Self::Resign { .. } => "resign",
            Self::Heartbeat => "heartbeat",
            Self::QueueState => "queue_state",
            Self::MatchHistory { .. } => "match_history",
            Self::ClearQueue => "clear_queue",
            Self::RemoveFromQueue { .. } => "remove_from_queue",
            Self::AdminSnapshot => "admin_snapshot",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Everything the server pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    HandshakeAck {
        participant_id: ParticipantId,
        display_name: String,
        is_privileged: bool,
        server_time: u64,
    },

    QueueSnapshotUpdated {
        queue: Vec<QueueRow>,
        queue_size: usize,
        max_size: usize,
    },

    PairedRosterUpdated { roster: Vec<ParticipantProfile> },

    SessionStarted {
        session_id: SessionId,
        mode: SessionMode,
        /// The token the recipient plays.
        you_are: Token,
        opponent: Opponent,
        board: Board,
        turn: Seat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
    },

    BoardUpdated {
        session_id: SessionId,
        board: Board,
        turn: Seat,
        last_move: LastMove,
        move_count: usize,
    },

    SessionFinished {
        session_id: SessionId,
        /// `None` on a draw.
        winner: Option<Seat>,
        draw: bool,
        reason: FinishReason,
        board: Board,
    },

    MoveRejected {
        session_id: SessionId,
        reason: String,
    },

    ParticipantMarkedInactive { participant_id: ParticipantId },

    LeaderboardUpdated { rows: Vec<LeaderboardRow> },

    MatchHistory {
        participant_id: ParticipantId,
        rows: Vec<HistoryRow>,
    },

    AdminSnapshot(AdminSnapshot),

    /// Reply to any request that has no richer answer.
    RequestResult {
        request: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Protocol-level failure, e.g. an undecodable frame.
    Error { message: String },
}

impl ServerEvent {
    /// A successful `request_result` for `request`.
    pub fn ok(request: &str) -> Self {
        Self::RequestResult {
            request: request.to_owned(),
            ok: true,
            message: None,
        }
    }

    /// A failed `request_result` carrying a human-readable reason.
    pub fn rejected(request: &str, reason: impl Into<String>) -> Self {
        Self::RequestResult {
            request: request.to_owned(),
            ok: false,
            message: Some(reason.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A framed event. `seq` is per connection and per direction; `timestamp`
/// is unix milliseconds at the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub seq: u64,
    pub timestamp: u64,
    pub event: T,
}

impl<T> Envelope<T> {
    pub fn new(seq: u64, timestamp: u64, event: T) -> Self {
        Self {
            seq,
            timestamp,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&ParticipantId(42)).unwrap(), "42");
        assert_eq!(ParticipantId(42).to_string(), "P-42");
        assert_eq!(SessionId(3).to_string(), "S-3");
    }

    #[test]
    fn test_seat_json_format() {
        let human = serde_json::to_value(Seat::Human(ParticipantId(5))).unwrap();
        assert_eq!(human, serde_json::json!({ "human": 5 }));
        assert_eq!(serde_json::to_value(Seat::Bot).unwrap(), "bot");
    }

    #[test]
    fn test_client_event_submit_move_json_format() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"submit_move","session_id":4,"column":-1}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SubmitMove {
                session_id: SessionId(4),
                column: -1,
            }
        );
    }

    #[test]
    fn test_client_event_start_bot_session_defaults_to_medium() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"start_bot_session"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::StartBotSession {
                difficulty: Difficulty::Medium
            }
        );

        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"start_bot_session","difficulty":"hard"}"#,
        )
        .unwrap();
        assert_eq!(event.name(), "start_bot_session");
        assert_eq!(
            event,
            ClientEvent::StartBotSession {
                difficulty: Difficulty::Hard
            }
        );
    }

    #[test]
    fn test_server_event_session_finished_draw_has_null_winner() {
        let event = ServerEvent::SessionFinished {
            session_id: SessionId(1),
            winner: None,
            draw: true,
            reason: FinishReason::Draw,
            board: Board::new(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "session_finished");
        assert!(json["winner"].is_null());
        assert_eq!(json["draw"], true);
        assert_eq!(json["reason"], "draw");
        assert_eq!(json["board"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn test_server_event_session_started_round_trip() {
        let mut board = Board::new();
        board.drop_token(3, Token::A).unwrap();
        let event = ServerEvent::SessionStarted {
            session_id: SessionId(9),
            mode: SessionMode::HumanVsBot,
            you_are: Token::A,
            opponent: Opponent {
                seat: Seat::Bot,
                display_name: "Bot".into(),
                avatar: None,
            },
            board,
            turn: Seat::Human(ParticipantId(1)),
            difficulty: Some(Difficulty::Easy),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_server_event_admin_snapshot_is_flattened() {
        let event = ServerEvent::AdminSnapshot(AdminSnapshot {
            online_count: 2,
            inactive_count: 1,
            queue_size: 0,
            total_accounts: Some(10),
            online_users: Vec::new(),
            queue: Vec::new(),
            roster: Vec::new(),
            active_sessions: 0,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "admin_snapshot");
        assert_eq!(json["online_count"], 2);
        assert_eq!(json["total_accounts"], 10);
    }

    #[test]
    fn test_request_result_helpers() {
        let json = serde_json::to_value(ServerEvent::ok("join_queue")).unwrap();
        assert_eq!(json["ok"], true);
        assert!(json.get("message").is_none());

        let json =
            serde_json::to_value(ServerEvent::rejected("join_queue", "Queue is full"))
                .unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["message"], "Queue is full");
    }

    #[test]
    fn test_client_event_match_history_id_optional() {
        let own: ClientEvent = serde_json::from_str(r#"{"event":"match_history"}"#).unwrap();
        assert_eq!(own, ClientEvent::MatchHistory { participant_id: None });
        assert_eq!(own.name(), "match_history");

        let other: ClientEvent =
            serde_json::from_str(r#"{"event":"match_history","participant_id":8}"#).unwrap();
        assert_eq!(
            other,
            ClientEvent::MatchHistory {
                participant_id: Some(ParticipantId(8))
            }
        );
    }

    #[test]
    fn test_finish_reason_display_matches_wire_name() {
        for reason in [
            FinishReason::Win,
            FinishReason::Draw,
            FinishReason::Resign,
            FinishReason::Disconnect,
            FinishReason::Inactivity,
        ] {
            let wire = serde_json::to_value(reason).unwrap();
            assert_eq!(wire, reason.to_string());
        }
    }
}
