//! Identity and presence for Quatro.
//!
//! 1. **Identity**: turning a handshake token into a participant
//!    ([`IdentityResolver`], [`Identity`]).
//! 2. **Presence**: knowing who is connected and how recently they spoke
//!    ([`PresenceTracker`]), for the admin dashboard.
//!
//! ```text
//! Lobby (above)     ← reads identities, feeds presence into admin snapshots
//!     ↕
//! Presence (this)   ← who is connected, last seen, active or idle
//!     ↕
//! Protocol (below)  ← ParticipantId, PresenceRow
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod identity;
mod tracker;

pub use error::PresenceError;
pub use identity::{DevTokenResolver, Identity, IdentityResolver};
pub use tracker::{ActivityRecord, PresenceConfig, PresenceTracker, unix_millis};
