//! Matchmaking, live sessions, and the lobby actor for Quatro.
//!
//! All mutable match state lives inside one Tokio task, the lobby, which
//! serializes every request, timer expiry, and persistence report.
//!
//! # Key types
//!
//! - [`spawn_lobby`] / [`LobbyHandle`]: start the actor and talk to it
//! - [`Matchmaker`]: FIFO queue plus the single paired roster
//! - [`Coordinator`]: active sessions, move validation, finalization
//! - [`Hub`]: routes server events to participant outboxes
//! - [`MatchStore`]: the persistence seam, with [`MemoryStore`] in-process
//! - [`LobbyConfig`]: queue size, timeouts, scoring, bot pacing

#![allow(async_fn_in_trait)]

mod config;
mod coordinator;
mod error;
mod hub;
mod lobby;
mod queue;
mod recorder;
mod store;

pub use config::LobbyConfig;
pub use coordinator::{
    BOT_NAME, Challenger, Coordinator, FinishedSession, MoveOutcome, Outcome, Session,
    SessionSide, SessionStatus,
};
pub use error::MatchError;
pub use hub::{Hub, Outbox};
pub use lobby::{LobbyHandle, LobbyInfo, reply_for, spawn_lobby};
pub use queue::{Matchmaker, Pairing, QueueEntry};
pub use store::{
    Account, MatchRecord, MatchRecordUpdate, MatchStatus, MatchStore, MemoryStore,
    NewMatchRecord, StatsDelta, StoreError,
};
