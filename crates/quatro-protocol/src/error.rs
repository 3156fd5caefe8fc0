//! Error types for the protocol layer.

/// Errors raised while turning events into frames and back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame was not valid JSON, or did not match any known event.
    ///
    /// Unknown `event` tags and missing fields both land here.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but is not acceptable at this point of the
    /// conversation, e.g. a game event before `hello`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
