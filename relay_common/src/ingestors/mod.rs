//! # Upstream Ingestors Module
//!
//! The "front door" for code-availability events entering the system. The
//! connection lifecycle (connect, drop detection, backoff, termination) lives in
//! `stream_client` and is transport-agnostic; the concrete Socket.IO-over-WebSocket
//! transport and its wire codec live beside it.
//!
//! ## Contained Modules:
//! - **`stream_client`**: the reconnecting client and the `Connector`/`Session`
//!   seams it drives.
//! - **`socketio`**: Engine.IO / Socket.IO text-packet codec.
//! - **`ws_transport`**: `tokio-tungstenite` implementation of the seams.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Engine.IO / Socket.IO packet codec.
pub mod socketio;
/// Reconnecting client state machine.
pub mod stream_client;
/// WebSocket transport for Socket.IO servers.
pub mod ws_transport;

// --- Public API Re-exports ---
pub use stream_client::{ClientDiagnostics, ConnectionState, Connector, Session, StreamClient};
pub use ws_transport::SocketIoConnector;
