//! # Quatro
//!
//! Connect Four matchmaking and live-match server.
//!
//! Participants connect over WebSocket, identify with a `hello` frame,
//! then queue for a human opponent or start a game against the bot. One
//! lobby actor owns all match state; this crate wires it to the network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quatro::prelude::*;
//!
//! # async fn run() -> Result<(), QuatroError> {
//! let server = QuatroServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(DevTokenResolver, MemoryStore::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::QuatroError;
pub use server::{QuatroServer, QuatroServerBuilder};

pub mod prelude {
    pub use crate::{QuatroError, QuatroServer, QuatroServerBuilder, ServerConfig};
    pub use quatro_engine::{Board, Difficulty, Token};
    pub use quatro_match::{LobbyConfig, LobbyHandle, MatchError, MatchStore, MemoryStore};
    pub use quatro_presence::{DevTokenResolver, Identity, IdentityResolver, PresenceError};
    pub use quatro_protocol::{
        ClientEvent, Envelope, FinishReason, ParticipantId, Seat, ServerEvent, SessionId,
    };
}
