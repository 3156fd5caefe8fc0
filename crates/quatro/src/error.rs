//! Unified error type for the Quatro server.

use quatro_match::MatchError;
use quatro_presence::PresenceError;
use quatro_protocol::ProtocolError;
use quatro_transport::TransportError;

/// Top-level error that wraps every layer's error.
#[derive(Debug, thiserror::Error)]
pub enum QuatroError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Handshake token rejected.
    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error(transparent)]
    Match(#[from] MatchError),
}
