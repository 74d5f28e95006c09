//! # Relay Configuration
//!
//! Timing and policy knobs for the upstream client, the dedup window and the
//! fan-out pacing. All values have production defaults, so an empty JSON
//! object (or no file at all) yields a working configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayConfigError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Where the upstream push source lives and what it emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamConfig {
    /// Base URL of the Socket.IO server (http/https/ws/wss).
    pub url: String,
    /// The single event type relayed to subscribers.
    pub event_name: String,
    /// Socket.IO namespace to join.
    pub namespace: String,
    /// Upper bound for the Engine.IO + Socket.IO handshake.
    pub handshake_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            event_name: "new_code".to_string(),
            namespace: "/".to_string(),
            handshake_timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// # Reconnect Policy
///
/// An unexpected drop waits `disconnect_delay`. A failed connect attempt waits
/// `failure_delay × factor^(n-1)` for the n-th consecutive failure, clamped to
/// `max_delay`. Every attempt first waits `settle_delay` after tearing down the
/// previous socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    pub disconnect_delay_ms: u64,
    pub failure_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    pub settle_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            disconnect_delay_ms: 5_000,
            failure_delay_ms: 10_000,
            max_delay_ms: 60_000,
            factor: 2.0,
            settle_delay_ms: 1_000,
        }
    }
}

impl ReconnectPolicy {
    pub fn disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.disconnect_delay_ms).min(self.max_delay())
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Delay to wait after `failures` consecutive failed connect attempts.
    ///
    /// `failures` is 1-based; zero is treated as one.
    pub fn delay_after_failures(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_ms = self.max_delay_ms as f64;
        let raw_ms = self.failure_delay_ms as f64 * self.factor.powi(exponent);

        if !raw_ms.is_finite() || raw_ms < 0.0 || raw_ms > max_ms {
            self.max_delay()
        } else {
            Duration::from_millis(raw_ms as u64)
        }
    }
}

/// How long an event identity suppresses repeats, and how long it is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupPolicy {
    pub window_secs: u64,
    pub retention_secs: u64,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            window_secs: 10,
            retention_secs: 3_600,
        }
    }
}

impl DedupPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Gaps inserted by the fan-out so the outbound channel is not rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryPacing {
    /// Between message part 1 and part 2 for the same subscriber.
    pub part_gap_ms: u64,
    /// After the last part of one subscriber, before the next subscriber.
    pub subscriber_gap_ms: u64,
}

impl Default for DeliveryPacing {
    fn default() -> Self {
        Self {
            part_gap_ms: 1_000,
            subscriber_gap_ms: 1_000,
        }
    }
}

impl DeliveryPacing {
    pub fn part_gap(&self) -> Duration {
        Duration::from_millis(self.part_gap_ms)
    }

    pub fn subscriber_gap(&self) -> Duration {
        Duration::from_millis(self.subscriber_gap_ms)
    }
}

/// The complete relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub upstream: UpstreamConfig,
    pub reconnect: ReconnectPolicy,
    pub dedup: DedupPolicy,
    pub pacing: DeliveryPacing,
}

impl RelayConfig {
    /// Loads a configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, RelayConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
