//! Codecs for putting Parley events on the wire.
//!
//! Two encodings are supported:
//! - JSON, carried in WebSocket text frames (browsers, debugging)
//! - MessagePack with a 4-byte big-endian length prefix, carried in binary frames

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame arrived in an encoding the connection did not negotiate.
    #[error("Unexpected {0} frame")]
    UnexpectedEncoding(&'static str),
}

/// Encode an event to length-prefixed MessagePack.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded event (named fields)
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode<T: Serialize>(event: &T) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(event, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode an event into an existing buffer.
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode_into<T: Serialize>(event: &T, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = rmp_serde::to_vec_named(event)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(())
}

/// Decode an event from length-prefixed MessagePack.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    Ok(rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?)
}

/// Try to decode an event from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(event))` if a complete frame was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if buf.len() < total_size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);

    Ok(Some(rmp_serde::from_slice(&payload)?))
}

/// Encode an event as a JSON string.
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode_json<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode an event from a JSON string.
///
/// # Errors
///
/// Returns an error if the text is too large or is not a valid event.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

/// An encoded event, ready to be written to a WebSocket.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// A text frame (JSON).
    Text(String),
    /// A binary frame (length-prefixed MessagePack).
    Binary(Bytes),
}

impl Encoded {
    /// Size of the encoded frame in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Encoded::Text(text) => text.len(),
            Encoded::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the encoded frame is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wire format negotiated for a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    #[default]
    Json,
    MessagePack,
}

impl WireFormat {
    /// Parse a format name as given in the handshake (`json`, `msgpack`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(WireFormat::Json),
            "msgpack" | "messagepack" => Some(WireFormat::MessagePack),
            _ => None,
        }
    }

    /// Encode an event in this format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(self, event: &T) -> Result<Encoded, ProtocolError> {
        match self {
            WireFormat::Json => encode_json(event).map(Encoded::Text),
            WireFormat::MessagePack => encode(event).map(Encoded::Binary),
        }
    }

    /// Decode a text frame. Only valid for JSON connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection negotiated MessagePack or decoding fails.
    pub fn decode_text<T: DeserializeOwned>(self, text: &str) -> Result<T, ProtocolError> {
        match self {
            WireFormat::Json => decode_json(text),
            WireFormat::MessagePack => Err(ProtocolError::UnexpectedEncoding("text")),
        }
    }

    /// Decode a binary frame. Only valid for MessagePack connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection negotiated JSON or decoding fails.
    pub fn decode_binary<T: DeserializeOwned>(self, data: &[u8]) -> Result<T, ProtocolError> {
        match self {
            WireFormat::MessagePack => decode(data),
            WireFormat::Json => Err(ProtocolError::UnexpectedEncoding("binary")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{ClientEvent, ServerEvent};

    #[test]
    fn test_msgpack_client_events() {
        let events = vec![
            ClientEvent::join_rooms(["r1", "r2"]),
            ClientEvent::send_text("r1", "hello"),
            ClientEvent::TypingStart {
                room_id: "r1".into(),
            },
            ClientEvent::Ping {
                timestamp: Some(42),
            },
        ];

        for event in events {
            let encoded = encode(&event).unwrap();
            let decoded: ClientEvent = decode(&encoded).unwrap();
            assert_eq!(event, decoded);
        }
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&ClientEvent::join_rooms(["r1"])).unwrap();

        let partial = &encoded[..5];
        match decode::<ClientEvent>(partial) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let event = ClientEvent::send_text("r1", "x".repeat(MAX_FRAME_SIZE + 1));

        match encode(&event) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
        assert!(matches!(
            encode_json(&event),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_streaming_decode() {
        let first = ClientEvent::join_rooms(["r1"]);
        let second = ClientEvent::send_text("r1", "hi");

        let mut buf = BytesMut::new();
        encode_into(&first, &mut buf).unwrap();
        encode_into(&second, &mut buf).unwrap();

        let decoded1: ClientEvent = decode_from(&mut buf).unwrap().unwrap();
        let decoded2: ClientEvent = decode_from(&mut buf).unwrap().unwrap();

        assert_eq!(first, decoded1);
        assert_eq!(second, decoded2);
        assert!(buf.is_empty());
        assert!(decode_from::<ClientEvent>(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_wire_format_negotiation() {
        assert_eq!(WireFormat::parse("JSON"), Some(WireFormat::Json));
        assert_eq!(WireFormat::parse("msgpack"), Some(WireFormat::MessagePack));
        assert_eq!(WireFormat::parse("xml"), None);

        let pong = ServerEvent::pong(Some(7));
        assert!(matches!(
            WireFormat::Json.encode(&pong).unwrap(),
            Encoded::Text(_)
        ));
        assert!(matches!(
            WireFormat::MessagePack.encode(&pong).unwrap(),
            Encoded::Binary(_)
        ));
    }

    #[test]
    fn test_wire_format_rejects_mismatched_frames() {
        let text = encode_json(&ClientEvent::join_rooms(["r1"])).unwrap();
        assert!(matches!(
            WireFormat::MessagePack.decode_text::<ClientEvent>(&text),
            Err(ProtocolError::UnexpectedEncoding("text"))
        ));

        let decoded: ClientEvent = WireFormat::Json.decode_text(&text).unwrap();
        assert_eq!(decoded, ClientEvent::join_rooms(["r1"]));
    }
}
