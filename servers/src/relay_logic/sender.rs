//! Outbound message senders. The chat platform itself sits behind a webhook;
//! without one configured, messages only go to the log.

use async_trait::async_trait;
use relay_common::core::relay::MessageSender;
use relay_common::retrieve::ky_http::ApiClient;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    destination: &'a str,
    message: &'a str,
}

/// POSTs `{destination, message}` to a fixed URL. Each message is posted at
/// most once; a failed post is reported, never retried.
pub struct WebhookSender {
    client: ApiClient,
}

impl WebhookSender {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: ApiClient::with_retries(url, None, 0)?,
        })
    }
}

#[async_trait]
impl MessageSender for WebhookSender {
    async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()> {
        // Empty path: post to the base URL itself.
        self.client
            .post_json("", &OutboundMessage { destination, message })
            .await
    }
}

pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()> {
        log::info!("[outbound -> {}] {}", destination, message);
        Ok(())
    }
}

pub fn build_sender(outbound_url: Option<&str>) -> anyhow::Result<Arc<dyn MessageSender>> {
    match outbound_url {
        Some(url) => {
            log::info!("Outbound messages go to webhook {}", url);
            Ok(Arc::new(WebhookSender::new(url)?))
        }
        None => {
            log::warn!("No outbound URL configured; messages will only be logged");
            Ok(Arc::new(LogSender))
        }
    }
}
