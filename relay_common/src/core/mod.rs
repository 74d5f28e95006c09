//! # Core Relay Module
//!
//! The heart of the code relay. Everything between "an upstream payload
//! arrived" and "every subscriber has been told" lives here, along with the
//! process-wide guarantee that only one relay instance is connected upstream.
//!
//! ## Core Components:
//!
//! - **`event`**: `CodeEvent` validation from raw payloads, the dedup key and
//!   the two outbound message parts.
//!
//! - **`dedup`**: a time-windowed suppression map keyed by `(game, code, expiry)`.
//!
//! - **`games`**: known game identifiers, display names, command aliases and
//!   expiry-timestamp handling.
//!
//! - **`registry`**: the durable subscriber set and its storage seam.
//!
//! - **`relay`**: ingest and paced fan-out tasks, with running counters.
//!
//! - **`supervisor`**: tears down stale instances before admitting a new one.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Time-windowed duplicate suppression.
pub mod dedup;
/// Validated code events and their outbound rendering.
pub mod event;
/// Game identifiers, display names and expiry handling.
pub mod games;
/// Durable subscriber set.
pub mod registry;
/// Ingest, dedup and paced delivery.
pub mod relay;
/// Single-live-instance enforcement.
#[cfg(feature = "ingestors")]
pub mod supervisor;

// --- Public API Re-exports ---
pub use dedup::DedupWindow;
pub use event::{CodeEvent, DedupKey, RawCodeEvent};
pub use games::Game;
pub use registry::{JsonFileStore, SubscriberRegistry, SubscriberStore};
pub use relay::{EventRelay, MessageSender, RelayHandle, RelayStats, RelayStatsSnapshot};
#[cfg(feature = "ingestors")]
pub use supervisor::InstanceSupervisor;
