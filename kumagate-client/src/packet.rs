//! Engine.IO v4 / Socket.IO v4 text packet codec.
//!
//! Only the text encoding is supported; binary attachments are rejected.
//!
//! ```text
//! engine packet:  <type>[payload]
//!                  0 open  1 close  2 ping  3 pong  4 message  5 upgrade  6 noop
//!
//! socket packet:  <type>[<namespace>,][<ack id>][json]
//!                  0 connect  1 disconnect  2 event  3 ack  4 connect error
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::ClientError;

/// Parameters announced by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// An Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// A Socket.IO packet on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
    ConnectError(Value),
}

impl EnginePacket {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, ClientError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Protocol("empty engine packet".to_string()))?;
        let body = chars.as_str();

        match kind {
            '0' => serde_json::from_str(body)
                .map(EnginePacket::Open)
                .map_err(|e| ClientError::Protocol(format!("bad open packet: {}", e))),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body.to_string())),
            '3' => Ok(EnginePacket::Pong(body.to_string())),
            '4' => SocketPacket::decode(body).map(EnginePacket::Message),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ClientError::Protocol(format!(
                "unknown engine packet type '{}'",
                other
            ))),
        }
    }

    /// Encode into a text frame.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(h) => format!(
                "0{}",
                serde_json::json!({
                    "sid": h.sid,
                    "pingInterval": h.ping_interval,
                    "pingTimeout": h.ping_timeout,
                })
            ),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    /// Decode the payload of an Engine.IO message packet.
    pub fn decode(text: &str) -> Result<Self, ClientError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Protocol("empty socket packet".to_string()))?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(ClientError::Protocol(
                "binary socket packets are not supported".to_string(),
            ));
        }

        // Namespace, only present when not the default "/"
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(idx) => &rest[idx + 1..],
                None => "",
            };
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            Some(rest[..digits].parse::<u64>().map_err(|e| {
                ClientError::Protocol(format!("bad ack id: {}", e))
            })?)
        } else {
            None
        };
        let payload = &rest[digits..];

        let json = || -> Result<Value, ClientError> {
            serde_json::from_str(payload)
                .map_err(|e| ClientError::Protocol(format!("bad packet payload: {}", e)))
        };

        match kind {
            '0' if payload.is_empty() => Ok(SocketPacket::Connect(None)),
            '0' => Ok(SocketPacket::Connect(Some(json()?))),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let mut items = match json()? {
                    Value::Array(items) => items.into_iter(),
                    _ => return Err(ClientError::Protocol("event payload is not an array".into())),
                };
                let name = match items.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(ClientError::Protocol("event without a name".into())),
                };
                Ok(SocketPacket::Event {
                    id,
                    name,
                    args: items.collect(),
                })
            }
            '3' => {
                let id = id.ok_or_else(|| ClientError::Protocol("ack without an id".into()))?;
                let args = match json()? {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                Ok(SocketPacket::Ack { id, args })
            }
            '4' => Ok(SocketPacket::ConnectError(if payload.is_empty() {
                Value::Null
            } else {
                json()?
            })),
            other => Err(ClientError::Protocol(format!(
                "unknown socket packet type '{}'",
                other
            ))),
        }
    }

    /// Encode as the payload of an Engine.IO message packet.
    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { id, name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                let id = id.map(|id| id.to_string()).unwrap_or_default();
                format!("2{}{}", id, Value::Array(items))
            }
            SocketPacket::Ack { id, args } => format!("3{}{}", id, Value::Array(args.clone())),
            SocketPacket::ConnectError(data) => format!("4{}", data),
        }
    }
}
