mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{code_payload, registry_with, ChannelConnector, RecordingSender};
use relay_common::configs::RelayConfig;
use relay_common::core::supervisor::InstanceSupervisor;
use relay_common::ingestors::ConnectionState;
use relay_common::CodeTracker;

async fn settle() {
    tokio::time::sleep(Duration::from_secs(3)).await;
}

#[tokio::test(start_paused = true)]
async fn second_instance_replaces_the_first() {
    let supervisor = Arc::new(InstanceSupervisor::new());
    let registry = registry_with(&["alice"]);
    let sender = Arc::new(RecordingSender::default());
    let config = RelayConfig::default();

    let first_upstream = Arc::new(ChannelConnector::default());
    let first = CodeTracker::start(
        "plugin",
        &config,
        first_upstream.clone(),
        supervisor.clone(),
        registry.clone(),
        sender.clone(),
    )
    .await;
    settle().await;
    assert_eq!(first.state(), ConnectionState::Connected);

    let second_upstream = Arc::new(ChannelConnector::default());
    let second = CodeTracker::start(
        "plugin-reloaded",
        &config,
        second_upstream.clone(),
        supervisor.clone(),
        registry.clone(),
        sender.clone(),
    )
    .await;
    assert_eq!(first.state(), ConnectionState::Terminated);
    settle().await;

    assert_eq!(second.state(), ConnectionState::Connected);
    assert_eq!(supervisor.instance_ids().await, vec!["plugin-reloaded".to_string()]);

    // The retired instance never comes back, even after its backoff would fire.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(first.state(), ConnectionState::Terminated);
    assert_eq!(first_upstream.sessions_opened(), 1);

    first.shutdown().await;
    assert_eq!(supervisor.len().await, 1);
    second.shutdown().await;
    assert!(supervisor.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn instance_retired_mid_settle_never_opens_upstream() {
    let supervisor = Arc::new(InstanceSupervisor::new());
    let registry = registry_with(&["alice"]);
    let sender = Arc::new(RecordingSender::default());
    let config = RelayConfig::default();

    let first_upstream = Arc::new(ChannelConnector::default());
    let first = CodeTracker::start(
        "plugin",
        &config,
        first_upstream.clone(),
        supervisor.clone(),
        registry.clone(),
        sender.clone(),
    )
    .await;
    // Still inside the first instance's settle delay.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second_upstream = Arc::new(ChannelConnector::default());
    let second = CodeTracker::start(
        "plugin-reloaded",
        &config,
        second_upstream.clone(),
        supervisor.clone(),
        registry.clone(),
        sender.clone(),
    )
    .await;
    assert_eq!(first.state(), ConnectionState::Terminated);
    settle().await;

    assert_eq!(first_upstream.sessions_opened(), 0);
    assert_eq!(second_upstream.sessions_opened(), 1);
    assert_eq!(second.state(), ConnectionState::Connected);

    first.shutdown().await;
    second.shutdown().await;
    assert!(supervisor.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn only_the_live_instance_relays_events() {
    let supervisor = Arc::new(InstanceSupervisor::new());
    let registry = registry_with(&["alice"]);
    let sender = Arc::new(RecordingSender::default());
    let config = RelayConfig::default();

    let first_upstream = Arc::new(ChannelConnector::default());
    let first = CodeTracker::start(
        "plugin",
        &config,
        first_upstream.clone(),
        supervisor.clone(),
        registry.clone(),
        sender.clone(),
    )
    .await;
    settle().await;

    let second_upstream = Arc::new(ChannelConnector::default());
    let second = CodeTracker::start(
        "plugin",
        &config,
        second_upstream.clone(),
        supervisor.clone(),
        registry.clone(),
        sender.clone(),
    )
    .await;
    settle().await;

    // The first session was closed on teardown.
    assert!(!first_upstream.push(code_payload("infinity", "STALE")));
    assert!(second_upstream.push(code_payload("infinity", "LIVE")));
    settle().await;

    let messages = sender.sent_to("alice");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], "LIVE");

    // Same instance id: shutting the old one down must not evict the new one.
    first.shutdown().await;
    assert_eq!(supervisor.instance_ids().await, vec!["plugin".to_string()]);
    let stats = second.shutdown().await;
    assert_eq!(stats.deliveries, 1);
}

#[tokio::test(start_paused = true)]
async fn upstream_drop_reconnects_after_five_seconds() {
    let supervisor = Arc::new(InstanceSupervisor::new());
    let upstream = Arc::new(ChannelConnector::default());
    let tracker = CodeTracker::start(
        "plugin",
        &RelayConfig::default(),
        upstream.clone(),
        supervisor,
        registry_with(&[]),
        Arc::new(RecordingSender::default()),
    )
    .await;
    settle().await;
    assert_eq!(upstream.sessions_opened(), 1);

    upstream.close_latest();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(tracker.state(), ConnectionState::Disconnected);
    assert_eq!(tracker.diagnostics().pending_reconnect, Some(Duration::from_secs(5)));

    // 5s reconnect delay plus the 1s settle delay.
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(tracker.state(), ConnectionState::Connected);
    assert_eq!(upstream.sessions_opened(), 2);
    tracker.shutdown().await;
}
