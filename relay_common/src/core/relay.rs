//! # Event Relay
//!
//! Turns upstream payloads into subscriber messages and delivers them.
//!
//! ## Pipeline
//! 1.  **Ingest** (one task): validate the payload, apply the dedup window at
//!     arrival time, and queue accepted events in FIFO order. Ingest never
//!     waits on delivery, so new events keep being admitted while a previous
//!     fan-out is still pacing.
//! 2.  **Fan-out** (one task): for each queued event, snapshot the subscriber
//!     set and visit subscribers one after another, sending the announcement,
//!     pausing, sending the bare code, pausing again. A failed send is logged
//!     and counted; the pass continues with the next subscriber.
//!
//! Both tasks end once the upstream event channel closes and the queue drains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::configs::{DedupPolicy, DeliveryPacing};
use crate::core::dedup::DedupWindow;
use crate::core::event::CodeEvent;
use crate::core::registry::SubscriberRegistry;

/// Outbound channel to subscribers. Best effort: errors are reported back
/// and logged by the relay, never retried.
#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()>;
}

/// Running counters, readable while the relay is live.
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    malformed: AtomicU64,
    duplicates: AtomicU64,
    passes: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatsSnapshot {
    /// Payloads received from upstream.
    pub received: u64,
    /// Payloads discarded for missing required fields.
    pub malformed: u64,
    /// Events suppressed by the dedup window.
    pub duplicates: u64,
    /// Fan-out passes started (one per accepted event).
    pub passes: u64,
    /// Subscribers that received both message parts.
    pub deliveries: u64,
    /// Subscribers for which a send failed.
    pub delivery_failures: u64,
}

impl RelayStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Validation and dedup for inbound payloads. Owns the dedup window exclusively.
pub struct EventFilter {
    dedup: DedupWindow,
    stats: Arc<RelayStats>,
}

impl EventFilter {
    pub fn new(policy: DedupPolicy, stats: Arc<RelayStats>) -> Self {
        Self {
            dedup: DedupWindow::new(policy),
            stats,
        }
    }

    /// Returns the event if it should be delivered. Never fails: malformed
    /// and duplicate payloads are counted, logged and dropped.
    pub fn admit(&mut self, payload: Value, now: Instant) -> Option<CodeEvent> {
        RelayStats::bump(&self.stats.received);
        self.dedup.sweep(now);

        let event = match CodeEvent::from_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                RelayStats::bump(&self.stats.malformed);
                log::error!("Discarding upstream event: {}", e);
                return None;
            }
        };

        if !self.dedup.should_deliver(&event.dedup_key(), now) {
            RelayStats::bump(&self.stats.duplicates);
            log::debug!(
                "Suppressed duplicate event: {} - {}",
                event.game_id,
                event.code
            );
            return None;
        }

        log::info!("New code received: {} - {}", event.game_id, event.code);
        Some(event)
    }
}

/// Handle to a running relay.
pub struct RelayHandle {
    stats: Arc<RelayStats>,
    ingest: JoinHandle<()>,
    fanout: JoinHandle<()>,
}

impl RelayHandle {
    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counters that outlive this handle.
    pub fn stats_handle(&self) -> Arc<RelayStats> {
        self.stats.clone()
    }

    /// Waits until the event channel has closed and every queued event has
    /// been delivered.
    pub async fn join(self) -> RelayStatsSnapshot {
        if let Err(e) = self.ingest.await {
            log::error!("Relay ingest task failed: {}", e);
        }
        if let Err(e) = self.fanout.await {
            log::error!("Relay fan-out task failed: {}", e);
        }
        self.stats.snapshot()
    }

    /// Stops both tasks immediately, dropping queued deliveries.
    pub fn abort(&self) {
        self.ingest.abort();
        self.fanout.abort();
    }
}

pub struct EventRelay {
    registry: Arc<SubscriberRegistry>,
    sender: Arc<dyn MessageSender>,
    pacing: DeliveryPacing,
    stats: Arc<RelayStats>,
}

impl EventRelay {
    /// Starts the ingest and fan-out tasks over `events`.
    pub fn spawn(
        events: mpsc::UnboundedReceiver<Value>,
        registry: Arc<SubscriberRegistry>,
        sender: Arc<dyn MessageSender>,
        dedup: DedupPolicy,
        pacing: DeliveryPacing,
    ) -> RelayHandle {
        let stats = Arc::new(RelayStats::default());
        let filter = EventFilter::new(dedup, stats.clone());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let relay = EventRelay {
            registry,
            sender,
            pacing,
            stats: stats.clone(),
        };

        let ingest = tokio::spawn(ingest(events, filter, queue_tx));
        let fanout = tokio::spawn(async move { relay.run(queue_rx).await });

        RelayHandle {
            stats,
            ingest,
            fanout,
        }
    }

    async fn run(self, mut queue: mpsc::UnboundedReceiver<CodeEvent>) {
        while let Some(event) = queue.recv().await {
            self.fan_out(&event).await;
        }
        log::debug!("Relay fan-out finished");
    }

    /// One delivery pass over a snapshot of the subscriber set.
    pub async fn fan_out(&self, event: &CodeEvent) {
        RelayStats::bump(&self.stats.passes);
        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            log::info!("No subscribers; code {} not pushed", event.code);
            return;
        }

        let [announcement, code] = event.message_parts();
        for subscriber in &subscribers {
            match self.deliver(subscriber, &announcement, &code).await {
                Ok(()) => RelayStats::bump(&self.stats.deliveries),
                Err(e) => {
                    RelayStats::bump(&self.stats.delivery_failures);
                    log::error!("Failed to push code {} to {}: {}", event.code, subscriber, e);
                }
            }
            tokio::time::sleep(self.pacing.subscriber_gap()).await;
        }
        log::info!(
            "Pushed code {} to {} subscriber(s)",
            event.code,
            subscribers.len()
        );
    }

    /// Part 1, pause, part 2. Part 2 is skipped if part 1 failed.
    async fn deliver(&self, subscriber: &str, announcement: &str, code: &str) -> anyhow::Result<()> {
        self.sender.send(subscriber, announcement).await?;
        tokio::time::sleep(self.pacing.part_gap()).await;
        self.sender.send(subscriber, code).await
    }
}

async fn ingest(
    mut events: mpsc::UnboundedReceiver<Value>,
    mut filter: EventFilter,
    queue: mpsc::UnboundedSender<CodeEvent>,
) {
    while let Some(payload) = events.recv().await {
        if let Some(event) = filter.admit(payload, Instant::now()) {
            if queue.send(event).is_err() {
                log::warn!("Fan-out task is gone; stopping ingest");
                break;
            }
        }
    }
    log::debug!("Upstream event channel closed; relay ingest finished");
}
