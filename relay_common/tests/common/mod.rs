//! Shared fakes for the integration tests: an in-memory subscriber store, a
//! recording outbound sender and a scripted upstream connector.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_common::core::registry::{SubscriberRegistry, SubscriberStore};
use relay_common::core::relay::MessageSender;
use relay_common::ingestors::{Connector, Session};
use relay_common::{StoreError, TransportError};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Default)]
pub struct MemoryStore(Mutex<BTreeSet<String>>);

impl SubscriberStore for MemoryStore {
    fn load(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.0.lock().unwrap().clone())
    }

    fn save(&self, subscribers: &BTreeSet<String>) -> Result<(), StoreError> {
        *self.0.lock().unwrap() = subscribers.clone();
        Ok(())
    }
}

pub fn registry_with(subscribers: &[&str]) -> Arc<SubscriberRegistry> {
    let registry = SubscriberRegistry::new(Box::new(MemoryStore::default()));
    for s in subscribers {
        registry.subscribe(s);
    }
    Arc::new(registry)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub destination: String,
    pub message: String,
    pub at: Instant,
}

/// Records every send. Destinations listed in `failing` get an error instead.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Sent>>,
    failing: BTreeSet<String>,
}

impl RecordingSender {
    pub fn failing_for(destinations: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: destinations.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, destination: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.destination == destination)
            .map(|s| s.message)
            .collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()> {
        if self.failing.contains(destination) {
            anyhow::bail!("destination {destination} unreachable");
        }
        self.sent.lock().unwrap().push(Sent {
            destination: destination.to_string(),
            message: message.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}

pub fn code_payload(game: &str, code: &str) -> Value {
    json!({
        "game_name": game,
        "key": code,
        "reward": "gems",
        "time": "2099/01/01 00:00:00",
        "url": "http://x"
    })
}

/// Connector whose sessions relay whatever the test pushes into them.
#[derive(Default)]
pub struct ChannelConnector {
    feeds: Mutex<Vec<Option<mpsc::UnboundedSender<Value>>>>,
}

impl ChannelConnector {
    /// Pushes `payload` into the most recently opened session.
    pub fn push(&self, payload: Value) -> bool {
        match self.feeds.lock().unwrap().last() {
            Some(Some(feed)) => feed.send(payload).is_ok(),
            _ => false,
        }
    }

    /// Ends the most recent session as if the server went away.
    pub fn close_latest(&self) {
        if let Some(feed) = self.feeds.lock().unwrap().last_mut() {
            feed.take();
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }
}

struct ChannelSession(mpsc::UnboundedReceiver<Value>);

#[async_trait]
impl Session for ChannelSession {
    async fn next_event(&mut self) -> Option<Result<Value, TransportError>> {
        self.0.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close();
        Ok(())
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(Some(tx));
        Ok(Box::new(ChannelSession(rx)))
    }
}
