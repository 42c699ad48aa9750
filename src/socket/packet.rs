//! Engine.IO v4 / Socket.IO v5 text frame codec
//!
//! Only the default namespace and text packets are supported. Binary
//! events and acks are recognised but not decoded.

use crate::error::SyncError;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Upper bound on how long a session waits for the next server frame,
/// whatever the server advertises.
pub const MAX_PING_WINDOW: Duration = Duration::from_secs(300);

/// Engine.IO OPEN payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenInfo {
    /// Silence allowed before the session is considered dead:
    /// `pingInterval + pingTimeout`, capped at [`MAX_PING_WINDOW`].
    pub fn ping_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
            .min(MAX_PING_WINDOW)
    }
}

#[derive(Debug, Deserialize)]
struct ConnectAck {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ConnectErrorBody {
    message: String,
}

/// One text frame on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// `0{...}` - server handshake
    Open(OpenInfo),
    /// `1`
    Close,
    /// `2`
    Ping,
    /// `3`
    Pong,
    /// `6`
    Noop,
    /// `40` from the client, `40{"sid":..}` from the server
    Connect { sid: Option<String> },
    /// `41`
    Disconnect,
    /// `42["name", payload?]`
    Event { name: String, payload: Option<Value> },
    /// `44{"message":..}`
    ConnectError { message: String },
    /// Acks, binary packets and upgrades; type digits kept for logging
    Unsupported(String),
}

impl Packet {
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Self::Event {
            name: name.into(),
            payload: Some(payload),
        }
    }

    /// Decode one inbound text frame.
    pub fn decode(frame: &str) -> Result<Self, SyncError> {
        let mut chars = frame.chars();
        let engine = chars
            .next()
            .ok_or_else(|| SyncError::Frame("empty frame".to_string()))?;
        let rest = chars.as_str();

        match engine {
            '0' => serde_json::from_str(rest)
                .map(Packet::Open)
                .map_err(|e| SyncError::Frame(format!("bad open payload: {e}"))),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => Self::decode_message(rest),
            '5' => Ok(Packet::Unsupported("5".to_string())),
            '6' => Ok(Packet::Noop),
            other => Err(SyncError::Frame(format!("unknown engine packet type '{other}'"))),
        }
    }

    fn decode_message(message: &str) -> Result<Self, SyncError> {
        let mut chars = message.chars();
        let kind = chars
            .next()
            .ok_or_else(|| SyncError::Frame("empty socket packet".to_string()))?;
        let body = strip_ack_id(strip_namespace(chars.as_str()));

        match kind {
            '0' => {
                if body.is_empty() {
                    return Ok(Packet::Connect { sid: None });
                }
                let ack: ConnectAck = serde_json::from_str(body)
                    .map_err(|e| SyncError::Frame(format!("bad connect payload: {e}")))?;
                Ok(Packet::Connect { sid: Some(ack.sid) })
            }
            '1' => Ok(Packet::Disconnect),
            '2' => Self::decode_event(body),
            '4' => {
                let message = serde_json::from_str::<ConnectErrorBody>(body)
                    .map(|b| b.message)
                    .unwrap_or_else(|_| body.to_string());
                Ok(Packet::ConnectError { message })
            }
            '3' | '5' | '6' => Ok(Packet::Unsupported(format!("4{kind}"))),
            other => Err(SyncError::Frame(format!("unknown socket packet type '{other}'"))),
        }
    }

    fn decode_event(body: &str) -> Result<Self, SyncError> {
        let args: Vec<Value> = serde_json::from_str(body)
            .map_err(|e| SyncError::Frame(format!("bad event payload: {e}")))?;
        let mut args = args.into_iter();

        let name = match args.next() {
            Some(Value::String(name)) => name,
            _ => return Err(SyncError::Frame("event without a name".to_string())),
        };

        Ok(Packet::Event {
            name,
            payload: args.next(),
        })
    }

    /// Encode for sending. Only client-originated packets are meaningful.
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(_) => "0".to_string(),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { .. } => "40".to_string(),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, payload } => {
                let args = match payload {
                    Some(payload) => {
                        Value::Array(vec![Value::String(name.clone()), payload.clone()])
                    }
                    None => Value::Array(vec![Value::String(name.clone())]),
                };
                format!("42{args}")
            }
            Packet::ConnectError { message } => {
                format!("44{}", serde_json::json!({ "message": message }))
            }
            Packet::Unsupported(kind) => kind.clone(),
        }
    }
}

/// `/admin,{...}` → `{...}`. The default namespace carries no prefix.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

/// `12["ev"]` → `["ev"]`
fn strip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}
