//! Socket.IO v5 packet types.
//!
//! A Socket.IO packet travels inside an Engine.IO `message` packet and is
//! encoded as `<type>[<namespace>,][<ack id>][<json payload>]`.

use std::fmt::Write as _;

use serde_json::Value;

use crate::transport::CodecError;

/// Namespace used when the URL carries no path
pub const DEFAULT_NAMESPACE: &str = "/";

/// Socket.IO packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketType {
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    /// Parse the leading type digit of a packet.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::UnknownPacketType` for anything but `0`..`6`.
    pub fn from_char(c: char) -> Result<Self, CodecError> {
        match c {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError),
            '5' => Ok(Self::BinaryEvent),
            '6' => Ok(Self::BinaryAck),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Event => "EVENT",
            Self::Ack => "ACK",
            Self::ConnectError => "CONNECT_ERROR",
            Self::BinaryEvent => "BINARY_EVENT",
            Self::BinaryAck => "BINARY_ACK",
        }
    }
}

/// Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketType,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl Packet {
    #[must_use]
    pub fn connect(namespace: impl Into<String>, auth: Option<Value>) -> Self {
        Self {
            kind: PacketType::Connect,
            namespace: namespace.into(),
            id: None,
            data: auth,
        }
    }

    #[must_use]
    pub fn disconnect(namespace: impl Into<String>) -> Self {
        Self {
            kind: PacketType::Disconnect,
            namespace: namespace.into(),
            id: None,
            data: None,
        }
    }

    /// Build an event packet; `id` requests an acknowledgement.
    #[must_use]
    pub fn event(
        namespace: impl Into<String>,
        name: &str,
        args: Vec<Value>,
        id: Option<u64>,
    ) -> Self {
        let mut payload = Vec::with_capacity(args.len() + 1);
        payload.push(Value::String(name.to_string()));
        payload.extend(args);

        Self {
            kind: PacketType::Event,
            namespace: namespace.into(),
            id,
            data: Some(Value::Array(payload)),
        }
    }

    #[must_use]
    pub fn ack(namespace: impl Into<String>, id: u64, args: Vec<Value>) -> Self {
        Self {
            kind: PacketType::Ack,
            namespace: namespace.into(),
            id: Some(id),
            data: Some(Value::Array(args)),
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());

        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }

        if let Some(id) = self.id {
            let _ = write!(out, "{id}");
        }

        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }

        out
    }

    /// Decode a packet from the payload of an Engine.IO message.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown types, binary packets, malformed ack ids,
    /// invalid JSON and payloads that do not fit the packet type.
    pub fn decode(input: &str) -> Result<Self, CodecError> {
        let mut chars = input.chars();
        let kind = PacketType::from_char(chars.next().ok_or(CodecError::Empty)?)?;

        if matches!(kind, PacketType::BinaryEvent | PacketType::BinaryAck) {
            return Err(CodecError::BinaryUnsupported);
        }

        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            if let Some(end) = rest.find(',') {
                let namespace = &rest[..end];
                rest = &rest[end + 1..];
                namespace.to_string()
            } else {
                let namespace = rest.to_string();
                rest = "";
                namespace
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let id = if digits > 0 {
            let raw = &rest[..digits];
            Some(
                raw.parse::<u64>()
                    .map_err(|_| CodecError::InvalidAckId(raw.to_string()))?,
            )
        } else {
            None
        };
        rest = &rest[digits..];

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        let packet = Self {
            kind,
            namespace,
            id,
            data,
        };
        packet.validate()?;
        Ok(packet)
    }

    fn validate(&self) -> Result<(), CodecError> {
        let valid = match (self.kind, &self.data) {
            (PacketType::Connect, data) => {
                data.as_ref().is_none_or(Value::is_object)
            }
            (PacketType::Disconnect, data) => data.is_none(),
            (PacketType::ConnectError, data) => data
                .as_ref()
                .is_some_and(|d| d.is_object() || d.is_string()),
            (PacketType::Event, Some(Value::Array(items))) => {
                items.first().is_some_and(Value::is_string)
            }
            (PacketType::Ack, Some(Value::Array(_))) => self.id.is_some(),
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(CodecError::InvalidPayload(self.kind.name()))
        }
    }

    /// Split an event packet into its name and arguments.
    #[must_use]
    pub fn into_event(self) -> Option<(String, Vec<Value>)> {
        if self.kind != PacketType::Event {
            return None;
        }
        let Some(Value::Array(mut items)) = self.data else {
            return None;
        };
        if items.is_empty() {
            return None;
        }
        let Value::String(name) = items.remove(0) else {
            return None;
        };
        Some((name, items))
    }

    /// Arguments carried by an ack packet.
    #[must_use]
    pub fn into_args(self) -> Vec<Value> {
        match self.data {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        }
    }

    /// Session id granted by a CONNECT reply.
    #[must_use]
    pub fn sid(&self) -> Option<&str> {
        self.data.as_ref()?.get("sid")?.as_str()
    }

    /// Human-readable reason carried by a CONNECT_ERROR packet.
    #[must_use]
    pub fn error_message(&self) -> String {
        match &self.data {
            Some(Value::String(message)) => message.clone(),
            Some(data) => data
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| data.to_string(), str::to_string),
            None => "unknown error".to_string(),
        }
    }
}
