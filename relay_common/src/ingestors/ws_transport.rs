//! # Socket.IO WebSocket Transport
//!
//! Production [`Connector`] for the upstream push source: a Socket.IO server
//! reached over a plain WebSocket (no long-polling upgrade dance).
//! Location: relay_common/src/ingestors/ws_transport.rs

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

use crate::configs::UpstreamConfig;
use crate::error::TransportError;
use crate::ingestors::socketio::{
    decode_engine, decode_socket, encode_connect, encode_disconnect, encode_pong,
    websocket_endpoint, EnginePacket, SocketPacketKind,
};
use crate::ingestors::stream_client::{Connector, Session};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Used until the server announces its own ping parameters.
const DEFAULT_LIVENESS: Duration = Duration::from_secs(45);

pub struct SocketIoConnector {
    config: UpstreamConfig,
}

impl SocketIoConnector {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SocketIoConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, TransportError> {
        let endpoint = websocket_endpoint(&self.config.url)?;
        log::info!("Connecting to upstream Socket.IO server: {}", endpoint);

        let handshake = async {
            let (ws, _) = connect_async(endpoint.as_str())
                .await
                .map_err(|e| TransportError::WebSocket(e.to_string()))?;
            let mut session = SocketIoSession {
                ws,
                namespace: self.config.namespace.clone(),
                event_name: self.config.event_name.clone(),
                liveness: DEFAULT_LIVENESS,
                closed: false,
            };
            session.handshake().await?;
            Ok::<_, TransportError>(session)
        };

        let session = tokio::time::timeout(self.config.handshake_timeout(), handshake)
            .await
            .map_err(|_| {
                TransportError::Handshake(format!(
                    "no handshake within {}s",
                    self.config.handshake_timeout_secs
                ))
            })??;
        Ok(Box::new(session))
    }
}

pub struct SocketIoSession {
    ws: WsStream,
    namespace: String,
    event_name: String,
    /// Silence longer than this means the connection is dead.
    liveness: Duration,
    closed: bool,
}

impl SocketIoSession {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    /// Next Engine.IO text frame, answering pings and skipping non-text frames.
    async fn next_engine_packet(&mut self) -> Option<Result<EnginePacket, TransportError>> {
        loop {
            let frame = match tokio::time::timeout(self.liveness, self.ws.next()).await {
                Err(_) => return Some(Err(TransportError::Timeout(self.liveness))),
                Ok(None) => return None,
                Ok(Some(Err(e))) => return Some(Err(TransportError::WebSocket(e.to_string()))),
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(text) => match decode_engine(&text) {
                    Ok(EnginePacket::Ping) => {
                        log::trace!("Engine.IO ping");
                        if let Err(e) = self.send_text(encode_pong().to_string()).await {
                            return Some(Err(e));
                        }
                    }
                    Ok(packet) => return Some(Ok(packet)),
                    Err(e) => log::warn!("Ignoring undecodable frame '{}': {}", text.as_str(), e),
                },
                Message::Close(_) => return None,
                // Ping/pong frames are answered by tungstenite itself.
                _ => {}
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        match self.next_engine_packet().await {
            Some(Ok(EnginePacket::Open(info))) => {
                self.liveness = Duration::from_millis(info.ping_interval + info.ping_timeout);
                log::debug!(
                    "Engine.IO open: sid={}, liveness={}ms",
                    info.sid,
                    self.liveness.as_millis()
                );
            }
            Some(Ok(other)) => {
                return Err(TransportError::Handshake(format!(
                    "expected open packet, got {other:?}"
                )))
            }
            Some(Err(e)) => return Err(e),
            None => return Err(TransportError::Closed),
        }

        self.send_text(encode_connect(&self.namespace)).await?;

        loop {
            match self.next_engine_packet().await {
                Some(Ok(EnginePacket::Message(body))) => {
                    let packet = decode_socket(&body)?;
                    if packet.namespace != self.namespace {
                        continue;
                    }
                    match packet.kind {
                        SocketPacketKind::Connect => return Ok(()),
                        SocketPacketKind::ConnectError => {
                            return Err(TransportError::Handshake(format!(
                                "namespace {} refused: {}",
                                self.namespace,
                                packet.data.unwrap_or(Value::Null)
                            )))
                        }
                        _ => continue,
                    }
                }
                Some(Ok(EnginePacket::Close)) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Session for SocketIoSession {
    async fn next_event(&mut self) -> Option<Result<Value, TransportError>> {
        loop {
            match self.next_engine_packet().await? {
                Ok(EnginePacket::Message(body)) => {
                    let packet = match decode_socket(&body) {
                        Ok(packet) => packet,
                        Err(e) => {
                            log::warn!("Ignoring undecodable Socket.IO packet: {}", e);
                            continue;
                        }
                    };
                    if packet.namespace != self.namespace {
                        continue;
                    }
                    if packet.kind == SocketPacketKind::Disconnect {
                        log::info!("Server disconnected namespace {}", self.namespace);
                        return None;
                    }
                    match packet.event() {
                        Some((name, payload)) if name == self.event_name => {
                            return Some(Ok(payload))
                        }
                        Some((name, _)) => log::debug!("Ignoring upstream event '{}'", name),
                        None => {}
                    }
                }
                Ok(EnginePacket::Close) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.send_text(encode_disconnect(&self.namespace)).await;
        self.ws
            .close(None)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }
}
