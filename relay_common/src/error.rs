//! # Error Taxonomy
//!
//! Every failure the relay can observe maps onto one of these enums. None of
//! them is fatal to the hosting process: transport errors feed the reconnect
//! policy, store errors are logged, and malformed payloads are discarded.

use std::time::Duration;

use thiserror::Error;

/// Failures of the upstream transport (connect, handshake, read, write).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("No frame received for {0:?}")]
    Timeout(Duration),

    #[error("Stream closed by remote host")]
    Closed,

    #[error("Session task failed: {0}")]
    SessionTask(String),
}

/// Failures of the persisted subscriber list.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error occurred: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to persist subscriber file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Top-level error for relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Upstream transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Subscriber store error: {0}")]
    Store(#[from] StoreError),

    #[error("Stream client has been terminated")]
    Terminated,

    #[error("Connect attempt cancelled by disconnect")]
    Cancelled,

    #[error("Malformed upstream event: {0}")]
    MalformedEvent(String),

    #[error("Teardown of instance '{instance_id}' failed: {reason}")]
    Teardown { instance_id: String, reason: String },

    #[error("Code lookup failed: {0}")]
    Lookup(String),
}
