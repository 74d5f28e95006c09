//! # relay_common
//!
//! Relays "new code available" events from an upstream Socket.IO push source
//! to a set of subscribers: a reconnecting stream client, duplicate
//! suppression, paced fan-out and single-live-instance supervision, plus the
//! command and lookup collaborators around them.
//!
//! Modules are gated by cargo features named after their folders.

#[cfg(feature = "configs")]
pub mod configs;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod error;

#[cfg(feature = "ingestors")]
pub mod ingestors;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "ingestors")]
pub mod tracker;

#[cfg(feature = "retrieve")]
pub mod commands;

#[cfg(feature = "retrieve")]
pub use commands::CommandDesk;
#[cfg(feature = "core")]
pub use error::{RelayError, StoreError, TransportError};
#[cfg(feature = "ingestors")]
pub use tracker::CodeTracker;
