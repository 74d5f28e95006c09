//! # Code Tracker
//!
//! One relay instance: a stream client wired to an event relay and admitted
//! through the process-wide supervisor. Hot reload is "start a new tracker";
//! the supervisor retires whatever was running before.

use std::sync::Arc;

use crate::configs::RelayConfig;
use crate::core::registry::SubscriberRegistry;
use crate::core::relay::{EventRelay, MessageSender, RelayHandle, RelayStats, RelayStatsSnapshot};
use crate::core::supervisor::InstanceSupervisor;
use crate::ingestors::stream_client::{ClientDiagnostics, ConnectionState, Connector, StreamClient};

pub struct CodeTracker {
    instance_id: String,
    client: StreamClient,
    relay: RelayHandle,
    supervisor: Arc<InstanceSupervisor>,
}

impl CodeTracker {
    /// Builds the instance, registers it (tearing down stale instances first)
    /// and starts connecting in the background.
    pub async fn start(
        instance_id: &str,
        config: &RelayConfig,
        connector: Arc<dyn Connector>,
        supervisor: Arc<InstanceSupervisor>,
        registry: Arc<SubscriberRegistry>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let client = StreamClient::new(config.reconnect.clone(), connector);
        let relay = EventRelay::spawn(
            client.events(),
            registry,
            sender,
            config.dedup,
            config.pacing,
        );

        supervisor.register(instance_id, client.clone()).await;

        let connecting = client.clone();
        tokio::spawn(async move {
            // Failures schedule their own retry; only termination surfaces here.
            if let Err(e) = connecting.connect().await {
                log::info!("Initial connect abandoned: {}", e);
            }
        });

        log::info!("Code tracker '{}' started", instance_id);
        Self {
            instance_id: instance_id.to_string(),
            client,
            relay,
            supervisor,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn diagnostics(&self) -> ClientDiagnostics {
        self.client.diagnostics()
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.relay.stats()
    }

    pub fn stats_handle(&self) -> Arc<RelayStats> {
        self.relay.stats_handle()
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }

    /// Terminates the client, leaves the supervisor and waits for queued
    /// deliveries to finish.
    pub async fn shutdown(self) -> RelayStatsSnapshot {
        if let Err(e) = self.client.terminate().await {
            log::warn!("Tracker '{}' shutdown: {}", self.instance_id, e);
        }
        self.supervisor.release(&self.instance_id, &self.client).await;
        let stats = self.relay.join().await;
        log::info!(
            "Code tracker '{}' stopped: {} received, {} delivered",
            self.instance_id,
            stats.received,
            stats.deliveries
        );
        stats
    }
}
