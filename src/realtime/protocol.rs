//! Socket.IO v4 framing over Engine.IO v4 WebSocket text frames
//!
//! Engine.IO prefixes every frame with a packet type digit:
//! `0` open, `1` close, `2` ping, `3` pong, `4` message, `6` noop.
//! A `4` message carries a Socket.IO packet, itself prefixed with a type
//! digit: `0` connect, `1` disconnect, `2` event, `3` ack, `4` connect error.
//! So an event on the default namespace reads `42["name",{...}]`.

use serde::Deserialize;
use serde_json::Value;

use super::RealtimeError;

/// Engine.IO pong, sent in reply to a server ping.
pub const PONG: &str = "3";

/// Socket.IO disconnect on the default namespace.
pub const DISCONNECT: &str = "41";

/// Handshake parameters from the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace connect acknowledged; payload carries the socket id.
    Connect(Value),
    Disconnect,
    Event {
        name: String,
        args: Vec<Value>,
        ack_id: Option<u64>,
    },
    Ack {
        ack_id: u64,
    },
    ConnectError(String),
}

/// Decode one WebSocket text frame.
pub fn decode(frame: &str) -> Result<Frame, RealtimeError> {
    let mut chars = frame.chars();
    let eio = chars
        .next()
        .ok_or_else(|| RealtimeError::Protocol("empty frame".into()))?;
    let rest = chars.as_str();

    match eio {
        '0' => {
            let info: OpenInfo = serde_json::from_str(rest)
                .map_err(|e| RealtimeError::Protocol(format!("bad open packet: {}", e)))?;
            Ok(Frame::Open(info))
        }
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_socketio(rest),
        '6' => Ok(Frame::Noop),
        other => Err(RealtimeError::Protocol(format!(
            "unknown engine.io packet type '{}'",
            other
        ))),
    }
}

/// Decode the Socket.IO packet inside an Engine.IO message.
fn decode_socketio(packet: &str) -> Result<Frame, RealtimeError> {
    let mut chars = packet.chars();
    let kind = chars
        .next()
        .ok_or_else(|| RealtimeError::Protocol("empty socket.io packet".into()))?;
    let mut rest = chars.as_str();

    // Optional namespace: "/chat,". Only the default namespace is used.
    if rest.starts_with('/') {
        rest = rest.find(',').map(|i| &rest[i + 1..]).unwrap_or("");
    }

    // Optional ack id: digits before the JSON body.
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        rest[..digits].parse().ok()
    } else {
        None
    };
    let body = &rest[digits..];

    let json = || -> Result<Value, RealtimeError> {
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body)
            .map_err(|e| RealtimeError::Protocol(format!("bad socket.io payload: {}", e)))
    };

    match kind {
        '0' => Ok(Frame::Connect(json()?)),
        '1' => Ok(Frame::Disconnect),
        '2' => {
            let mut args = match json()? {
                Value::Array(items) => items,
                other => {
                    return Err(RealtimeError::Protocol(format!(
                        "event payload is not an array: {}",
                        other
                    )))
                }
            };
            if args.is_empty() {
                return Err(RealtimeError::Protocol("event without a name".into()));
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(RealtimeError::Protocol(format!(
                        "event name is not a string: {}",
                        other
                    )))
                }
            };
            Ok(Frame::Event { name, args, ack_id })
        }
        '3' => ack_id
            .map(|ack_id| Frame::Ack { ack_id })
            .ok_or_else(|| RealtimeError::Protocol("ack without id".into())),
        '4' => {
            let payload = json()?;
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| payload.to_string());
            Ok(Frame::ConnectError(message))
        }
        '5' | '6' => Err(RealtimeError::Protocol(
            "binary socket.io packets are not supported".into(),
        )),
        other => Err(RealtimeError::Protocol(format!(
            "unknown socket.io packet type '{}'",
            other
        ))),
    }
}

/// Namespace connect carrying the auth payload.
pub fn encode_connect(auth: &Value) -> String {
    format!("40{}", auth)
}

/// Event emit on the default namespace.
pub fn encode_event(name: &str, payload: &Value) -> String {
    format!("42{}", Value::Array(vec![Value::String(name.to_string()), payload.clone()]))
}

/// WebSocket endpoint for a Socket.IO server base URL.
pub fn endpoint(base: &str) -> Result<String, RealtimeError> {
    let ws = base
        .trim_end_matches('/')
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    let url = url::Url::parse(&format!("{}/socket.io/?EIO=4&transport=websocket", ws))
        .map_err(|e| RealtimeError::Connect(format!("invalid socket URL {}: {}", base, e)))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url.to_string()),
        other => Err(RealtimeError::Connect(format!(
            "unsupported socket URL scheme '{}'",
            other
        ))),
    }
}
