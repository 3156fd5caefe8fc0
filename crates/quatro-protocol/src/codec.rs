//! Frame codecs.
//!
//! The server never touches `serde_json` directly: the connection handler
//! holds a [`Codec`] and asks it to turn inbound frames into
//! [`ClientEvent`](crate::ClientEvent)s and outbound
//! [`ServerEvent`](crate::ServerEvent)s into frames.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values into frame bytes and decodes them back.
///
/// `Send + Sync + 'static` so a single codec can be shared by every
/// connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Parses a frame into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] for malformed or unknown frames.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON frames. Browsers speak this natively, so it is the only codec
/// the server ships with.
///
/// ```rust
/// use quatro_protocol::{ClientEvent, Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame = br#"{"seq":1,"timestamp":0,"event":{"event":"join_queue"}}"#;
/// let envelope: Envelope<ClientEvent> = codec.decode(frame).unwrap();
/// assert_eq!(envelope.event, ClientEvent::JoinQueue);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientEvent, Envelope, ParticipantId};

    #[test]
    fn test_decode_unknown_event_is_decode_error() {
        let result: Result<ClientEvent, _> =
            JsonCodec.decode(br#"{"event":"fly_to_moon"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_missing_field_is_decode_error() {
        let result: Result<ClientEvent, _> =
            JsonCodec.decode(br#"{"event":"submit_move","column":3}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_truncated_frame_is_decode_error() {
        let result: Result<Envelope<ClientEvent>, _> =
            JsonCodec.decode(br#"{"seq":1,"timesta"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_envelope_shape() {
        let envelope = Envelope::new(
            7,
            1_700_000_000_000,
            ClientEvent::RemoveFromQueue {
                participant_id: ParticipantId(3),
            },
        );
        let bytes = JsonCodec.encode(&envelope).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["seq"], 7);
        assert_eq!(json["event"]["event"], "remove_from_queue");
        assert_eq!(json["event"]["participant_id"], 3);
    }
}
