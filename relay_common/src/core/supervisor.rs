//! # Instance Supervisor
//!
//! Process-wide owner of the "one live upstream connection" guarantee. Hot
//! reloads create a new relay instance before the old one is released; the
//! supervisor tears every stale instance down before the new one is admitted.
//!
//! Construct one supervisor at process start and hand an `Arc` of it to every
//! instance. Registration is serialized by an async mutex held across the
//! teardown of stale instances, so overlapping registrations cannot both win.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::RelayError;
use crate::ingestors::stream_client::StreamClient;

/// Upper bound on how long a stale instance may take to shut down.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct InstanceSupervisor {
    instances: Mutex<HashMap<String, StreamClient>>,
    teardown_timeout: Duration,
}

impl Default for InstanceSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceSupervisor {
    pub fn new() -> Self {
        Self::with_teardown_timeout(TEARDOWN_TIMEOUT)
    }

    pub fn with_teardown_timeout(teardown_timeout: Duration) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            teardown_timeout,
        }
    }

    /// Admits `client` under `instance_id` after forcing every other
    /// registered client into `Terminated`. Teardown failures are logged and
    /// never reach the caller.
    pub async fn register(&self, instance_id: &str, client: StreamClient) {
        let mut instances = self.instances.lock().await;

        let stale: Vec<(String, StreamClient)> = instances
            .drain()
            .filter(|(_, existing)| !existing.same_as(&client))
            .collect();

        for (stale_id, stale_client) in stale {
            log::info!(
                "Tearing down stale instance '{}' before registering '{}'",
                stale_id,
                instance_id
            );
            if let Err(e) = self.teardown(&stale_id, &stale_client).await {
                log::warn!("{}", e);
            }
        }

        instances.insert(instance_id.to_string(), client);
        log::info!("Registered relay instance '{}'", instance_id);
    }

    async fn teardown(&self, instance_id: &str, client: &StreamClient) -> Result<(), RelayError> {
        match tokio::time::timeout(self.teardown_timeout, client.terminate()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RelayError::Teardown {
                instance_id: instance_id.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RelayError::Teardown {
                instance_id: instance_id.to_string(),
                reason: format!("did not stop within {:?}", self.teardown_timeout),
            }),
        }
    }

    /// Removes `instance_id`. Returns whether it was present; repeat calls are harmless.
    pub async fn unregister(&self, instance_id: &str) -> bool {
        let removed = self.instances.lock().await.remove(instance_id).is_some();
        if removed {
            log::info!("Unregistered relay instance '{}'", instance_id);
        }
        removed
    }

    /// Removes `instance_id` only while it still maps to `client`, so a
    /// retiring instance cannot evict a successor registered under the same id.
    pub async fn release(&self, instance_id: &str, client: &StreamClient) -> bool {
        let mut instances = self.instances.lock().await;
        match instances.get(instance_id) {
            Some(current) if current.same_as(client) => {
                instances.remove(instance_id);
                log::info!("Released relay instance '{}'", instance_id);
                true
            }
            _ => false,
        }
    }

    pub async fn instance_ids(&self) -> Vec<String> {
        self.instances.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.lock().await.is_empty()
    }
}
