//! Wire protocol for Quatro.
//!
//! - **Types**: identities ([`ParticipantId`], [`SessionId`]), the events
//!   each side may send ([`ClientEvent`], [`ServerEvent`]) and the
//!   [`Envelope`] that frames them.
//! - **Codec**: [`Codec`] and the default [`JsonCodec`].
//! - **Errors**: [`ProtocolError`].
//!
//! This crate knows nothing about sockets or game state. It only fixes
//! what goes over the wire.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope<ClientEvent>) → Lobby
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AdminSnapshot, ClientEvent, Envelope, FinishReason, HistoryRow, LastMove,
    LeaderboardRow, Opponent, ParticipantId, ParticipantProfile,
    PresenceRow, PresenceStatus, QueueRow, QueueStatus, Recipient, RecordId,
    Seat, ServerEvent, SessionId, SessionMode,
};
