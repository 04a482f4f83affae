//! Engine.IO v4 packet codec.
//!
//! Over the WebSocket transport every text frame carries exactly one Engine.IO
//! packet: a single type digit followed by the payload.
//!
//! Frame format:
//! ```text
//! +----------+------------------+
//! |  1 char  |  N bytes         |
//! |  (type)  |  (payload)       |
//! +----------+------------------+
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine.IO protocol revision spoken by the client
pub const ENGINE_IO_VERSION: &str = "4";

/// Maximum accepted frame size (16 MB)
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Payload of the `open` packet sent by the server right after the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// Time without a server ping after which the transport is considered dead.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// One Engine.IO packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    #[must_use]
    pub fn type_char(&self) -> char {
        match self {
            Self::Open(_) => '0',
            Self::Close => '1',
            Self::Ping(_) => '2',
            Self::Pong(_) => '3',
            Self::Message(_) => '4',
            Self::Upgrade => '5',
            Self::Noop => '6',
        }
    }

    /// Encode the packet into the text of a WebSocket frame.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Json` if the open handshake cannot be serialized.
    pub fn encode(&self) -> Result<String, CodecError> {
        let mut out = String::new();
        out.push(self.type_char());
        match self {
            Self::Open(handshake) => out.push_str(&serde_json::to_string(handshake)?),
            Self::Ping(data) | Self::Pong(data) | Self::Message(data) => out.push_str(data),
            Self::Close | Self::Upgrade | Self::Noop => {}
        }
        Ok(out)
    }

    /// Decode the text of a WebSocket frame.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or oversized frames, unknown packet types and
    /// malformed open handshakes.
    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(frame.len()));
        }

        let mut chars = frame.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let data = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(data)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(data.to_string())),
            '3' => Ok(Self::Pong(data.to_string())),
            '4' => Ok(Self::Message(data.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }
}

/// Errors that can occur while encoding or decoding packets
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown packet type: {0:?}")]
    UnknownPacketType(char),

    #[error("Invalid ack id: {0}")]
    InvalidAckId(String),

    #[error("Invalid payload for {0} packet")]
    InvalidPayload(&'static str),

    #[error("Binary packets are not supported")]
    BinaryUnsupported,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: &str = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    #[test]
    fn test_decode_open_handshake() {
        let packet = EnginePacket::decode(OPEN).unwrap();
        let EnginePacket::Open(handshake) = packet else {
            panic!("Expected open packet");
        };
        assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
        assert!(handshake.upgrades.is_empty());
        assert_eq!(handshake.max_payload, Some(1_000_000));
        assert_eq!(handshake.heartbeat_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_decode_simple_packets() {
        assert_eq!(EnginePacket::decode("1").unwrap(), EnginePacket::Close);
        assert_eq!(
            EnginePacket::decode("2").unwrap(),
            EnginePacket::Ping(String::new())
        );
        assert_eq!(
            EnginePacket::decode("3probe").unwrap(),
            EnginePacket::Pong("probe".to_string())
        );
        assert_eq!(EnginePacket::decode("6").unwrap(), EnginePacket::Noop);
    }

    #[test]
    fn test_decode_message_keeps_payload() {
        let packet = EnginePacket::decode(r#"42["hello",{"a":1}]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(r#"2["hello",{"a":1}]"#.to_string())
        );
    }

    #[test]
    fn test_encode_pong_and_message() {
        assert_eq!(EnginePacket::Pong(String::new()).encode().unwrap(), "3");
        assert_eq!(
            EnginePacket::Message("0".to_string()).encode().unwrap(),
            "40"
        );
        assert_eq!(EnginePacket::Close.encode().unwrap(), "1");
    }

    #[test]
    fn test_encode_open_is_decodable() {
        let handshake = OpenHandshake {
            sid: "abc".to_string(),
            upgrades: Vec::new(),
            ping_interval: 100,
            ping_timeout: 50,
            max_payload: None,
        };
        let frame = EnginePacket::Open(handshake.clone()).encode().unwrap();
        assert!(frame.starts_with("0{"));
        assert_eq!(
            EnginePacket::decode(&frame).unwrap(),
            EnginePacket::Open(handshake)
        );
    }

    #[test]
    fn test_decode_empty_frame() {
        assert!(matches!(EnginePacket::decode(""), Err(CodecError::Empty)));
    }

    #[test]
    fn test_decode_unknown_type() {
        assert!(matches!(
            EnginePacket::decode("9"),
            Err(CodecError::UnknownPacketType('9'))
        ));
    }

    #[test]
    fn test_decode_malformed_open() {
        assert!(matches!(
            EnginePacket::decode("0{not json"),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::MessageTooLarge(20_000_000);
        let msg = err.to_string();
        assert!(msg.contains("20000000"));
        assert!(msg.contains("too large"));

        assert_eq!(
            CodecError::BinaryUnsupported.to_string(),
            "Binary packets are not supported"
        );
    }
}
