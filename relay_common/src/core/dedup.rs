//! # Dedup Window
//!
//! Remembers recently delivered event identities so an upstream redelivery
//! within the suppression window is dropped. Entries are forgotten after the
//! retention horizon; sweeping is driven by the caller, once per event.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::configs::DedupPolicy;
use crate::core::event::DedupKey;

pub struct DedupWindow {
    window: Duration,
    retention: Duration,
    /// Key -> instant of the last sighting that was allowed through.
    seen: HashMap<DedupKey, Instant>,
}

impl DedupWindow {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            window: policy.window(),
            retention: policy.retention(),
            seen: HashMap::new(),
        }
    }

    /// Returns `true` and records `now` when `key` is unseen or its last
    /// delivery is older than the window. Suppressed sightings leave the
    /// record untouched.
    pub fn should_deliver(&mut self, key: &DedupKey, now: Instant) -> bool {
        match self.seen.get(key) {
            Some(last) if now.saturating_duration_since(*last) <= self.window => false,
            _ => {
                self.seen.insert(key.clone(), now);
                true
            }
        }
    }

    /// Drops every entry older than the retention horizon.
    pub fn sweep(&mut self, now: Instant) {
        let retention = self.retention;
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) <= retention);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DedupPolicy::default())
    }
}
