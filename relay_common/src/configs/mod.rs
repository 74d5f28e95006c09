//! # Configuration Modules
//!
//! Aggregates the relay's configuration: upstream endpoint, reconnect policy,
//! dedup window and delivery pacing.

/// Relay timing and policy configuration, loadable from JSON.
pub mod relay_config;

pub use relay_config::{
    DedupPolicy, DeliveryPacing, ReconnectPolicy, RelayConfig, RelayConfigError, UpstreamConfig,
};
