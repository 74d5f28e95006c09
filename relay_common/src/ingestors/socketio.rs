//! # Socket.IO Text Codec
//!
//! The subset of Engine.IO v4 / Socket.IO v5 needed to consume server-pushed
//! events over a WebSocket transport. Binary attachments are not supported;
//! such packets decode but carry no data.
//!
//! Engine.IO frame: `<type digit><payload>` where `0` open, `1` close, `2` ping,
//! `3` pong, `4` message, `5` upgrade, `6` noop.
//! Socket.IO packet (inside an Engine.IO message):
//! `<type>[<attachments>-][<namespace>,][<ack id>][<json>]`.

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::TransportError;

/// Parameters announced by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(String),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    /// For an event packet, its name and first argument.
    pub fn event(&self) -> Option<(&str, Value)> {
        if self.kind != SocketPacketKind::Event {
            return None;
        }
        let items = self.data.as_ref()?.as_array()?;
        let name = items.first()?.as_str()?;
        Some((name, items.get(1).cloned().unwrap_or(Value::Null)))
    }
}

pub fn decode_engine(frame: &str) -> Result<EnginePacket, TransportError> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| TransportError::Protocol("empty Engine.IO frame".to_string()))?;
    let body = chars.as_str();

    Ok(match kind {
        '0' => EnginePacket::Open(serde_json::from_str(body).map_err(|e| {
            TransportError::Protocol(format!("bad open packet: {e}"))
        })?),
        '1' => EnginePacket::Close,
        '2' => EnginePacket::Ping,
        '3' => EnginePacket::Pong,
        '4' => EnginePacket::Message(body.to_string()),
        '5' => EnginePacket::Upgrade,
        '6' => EnginePacket::Noop,
        other => {
            return Err(TransportError::Protocol(format!(
                "unknown Engine.IO packet type '{other}'"
            )))
        }
    })
}

pub fn decode_socket(message: &str) -> Result<SocketPacket, TransportError> {
    let mut rest = message;
    let kind = match rest.chars().next() {
        Some('0') => SocketPacketKind::Connect,
        Some('1') => SocketPacketKind::Disconnect,
        Some('2') => SocketPacketKind::Event,
        Some('3') => SocketPacketKind::Ack,
        Some('4') => SocketPacketKind::ConnectError,
        Some('5') => SocketPacketKind::BinaryEvent,
        Some('6') => SocketPacketKind::BinaryAck,
        _ => {
            return Err(TransportError::Protocol(format!(
                "unknown Socket.IO packet: {message}"
            )))
        }
    };
    rest = &rest[1..];

    if matches!(
        kind,
        SocketPacketKind::BinaryEvent | SocketPacketKind::BinaryAck
    ) {
        if let Some(dash) = rest.find('-') {
            rest = &rest[dash + 1..];
        }
    }

    let mut namespace = "/".to_string();
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(comma) => {
                namespace = rest[..comma].to_string();
                rest = &rest[comma + 1..];
            }
            None => {
                namespace = rest.to_string();
                rest = "";
            }
        }
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        rest[..digits].parse().ok()
    } else {
        None
    };
    rest = &rest[digits..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str(rest)
                .map_err(|e| TransportError::Protocol(format!("bad packet payload: {e}")))?,
        )
    };

    Ok(SocketPacket {
        kind,
        namespace,
        ack_id,
        data,
    })
}

pub fn encode_pong() -> &'static str {
    "3"
}

/// Socket.IO connect request for `namespace`, wrapped in an Engine.IO message.
pub fn encode_connect(namespace: &str) -> String {
    if namespace.is_empty() || namespace == "/" {
        "40".to_string()
    } else {
        format!("40{namespace},")
    }
}

pub fn encode_disconnect(namespace: &str) -> String {
    if namespace.is_empty() || namespace == "/" {
        "41".to_string()
    } else {
        format!("41{namespace},")
    }
}

/// Maps a server base URL to its Engine.IO WebSocket endpoint.
pub fn websocket_endpoint(base: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(base)
        .map_err(|e| TransportError::Handshake(format!("invalid upstream URL '{base}': {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::Handshake(format!(
                "unsupported upstream scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::Handshake(format!("cannot use scheme {scheme}")))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}
