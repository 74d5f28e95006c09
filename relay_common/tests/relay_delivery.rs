mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{code_payload, registry_with, RecordingSender};
use relay_common::configs::{DedupPolicy, DeliveryPacing};
use relay_common::core::relay::{EventRelay, RelayHandle};
use relay_common::core::registry::SubscriberRegistry;
use serde_json::{json, Value};
use tokio::sync::mpsc;

fn spawn_relay(
    registry: Arc<SubscriberRegistry>,
    sender: Arc<RecordingSender>,
) -> (mpsc::UnboundedSender<Value>, RelayHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = EventRelay::spawn(
        rx,
        registry,
        sender,
        DedupPolicy::default(),
        DeliveryPacing::default(),
    );
    (tx, handle)
}

#[tokio::test(start_paused = true)]
async fn single_event_sends_announcement_then_bare_code() {
    let sender = Arc::new(RecordingSender::default());
    let (tx, relay) = spawn_relay(registry_with(&["alice", "bob"]), sender.clone());

    tx.send(code_payload("infinity", "ABC123")).unwrap();
    drop(tx);
    let stats = relay.join().await;

    for subscriber in ["alice", "bob"] {
        let messages = sender.sent_to(subscriber);
        assert_eq!(messages.len(), 2, "subscriber {subscriber}");
        assert!(messages[0].contains("无限暖暖"));
        assert!(messages[0].contains("ABC123"));
        assert_eq!(messages[1], "ABC123");
    }
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.deliveries, 2);
}

#[tokio::test(start_paused = true)]
async fn repeat_within_two_seconds_is_suppressed() {
    let sender = Arc::new(RecordingSender::default());
    let (tx, relay) = spawn_relay(registry_with(&["alice"]), sender.clone());

    tx.send(code_payload("infinity", "ABC123")).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    tx.send(code_payload("infinity", "ABC123")).unwrap();
    drop(tx);
    let stats = relay.join().await;

    assert_eq!(stats.passes, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(sender.sent_to("alice").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn repeat_after_window_is_delivered_again() {
    let sender = Arc::new(RecordingSender::default());
    let (tx, relay) = spawn_relay(registry_with(&["alice"]), sender.clone());

    tx.send(code_payload("shining", "XYZ")).unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    tx.send(code_payload("shining", "XYZ")).unwrap();
    drop(tx);
    let stats = relay.join().await;

    assert_eq!(stats.passes, 2);
    assert_eq!(stats.duplicates, 0);
    assert_eq!(sender.sent_to("alice").len(), 4);
}

#[tokio::test(start_paused = true)]
async fn missing_code_is_reported_and_not_delivered() {
    let sender = Arc::new(RecordingSender::default());
    let (tx, relay) = spawn_relay(registry_with(&["alice"]), sender.clone());

    tx.send(json!({"game_name": "infinity", "reward": "gems"})).unwrap();
    drop(tx);
    let stats = relay.join().await;

    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.passes, 0);
    assert!(sender.sent().is_empty());
}

fn assert_about_one_second(gap: Duration) {
    assert!(
        gap >= Duration::from_secs(1) && gap < Duration::from_millis(1_050),
        "gap was {gap:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn every_subscriber_visited_once_with_paced_parts() {
    let subscribers = ["s1", "s2", "s3", "s4"];
    let sender = Arc::new(RecordingSender::default());
    let (tx, relay) = spawn_relay(registry_with(&subscribers), sender.clone());

    tx.send(code_payload("deepspace", "LOVE")).unwrap();
    drop(tx);
    relay.join().await;

    let sent = sender.sent();
    assert_eq!(sent.len(), subscribers.len() * 2);
    for (i, pair) in sent.chunks(2).enumerate() {
        assert_eq!(pair[0].destination, pair[1].destination);
        assert_eq!(pair[1].message, "LOVE");
        assert!(pair[0].message.contains("恋与深空"));
        assert_about_one_second(pair[1].at - pair[0].at);
        if i > 0 {
            assert_about_one_second(pair[0].at - sent[2 * i - 1].at);
        }
    }
    let mut visited: Vec<_> = sent.iter().map(|s| s.destination.clone()).collect();
    visited.dedup();
    assert_eq!(visited, subscribers);
}

#[tokio::test(start_paused = true)]
async fn one_failing_subscriber_does_not_stop_the_pass() {
    let sender = Arc::new(RecordingSender::failing_for(&["broken"]));
    let (tx, relay) = spawn_relay(registry_with(&["alice", "broken", "carol"]), sender.clone());

    tx.send(code_payload("infinity", "ABC123")).unwrap();
    drop(tx);
    let stats = relay.join().await;

    assert_eq!(sender.sent_to("alice").len(), 2);
    assert_eq!(sender.sent_to("carol").len(), 2);
    assert_eq!(stats.deliveries, 2);
    assert_eq!(stats.delivery_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn ingest_keeps_up_while_fan_out_paces_in_order() {
    let sender = Arc::new(RecordingSender::default());
    let (tx, relay) = spawn_relay(registry_with(&["alice", "bob"]), sender.clone());

    tx.send(code_payload("infinity", "FIRST")).unwrap();
    tx.send(code_payload("infinity", "SECOND")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(relay.stats().received, 2);
    assert_eq!(relay.stats().duplicates, 0);

    drop(tx);
    relay.join().await;

    let codes: Vec<String> = sender
        .sent_to("alice")
        .into_iter()
        .filter(|m| !m.contains('\n'))
        .collect();
    assert_eq!(codes, vec!["FIRST", "SECOND"]);
    // Every FIRST message precedes every SECOND message.
    let sent = sender.sent();
    let last_first = sent.iter().rposition(|s| s.message.contains("FIRST"));
    let first_second = sent.iter().position(|s| s.message.contains("SECOND"));
    assert!(last_first < first_second);
}

#[tokio::test(start_paused = true)]
async fn subscribers_added_mid_pass_wait_for_the_next_event() {
    let registry = registry_with(&["alice", "bob"]);
    let sender = Arc::new(RecordingSender::default());
    let (tx, relay) = spawn_relay(registry.clone(), sender.clone());

    tx.send(code_payload("infinity", "ONE")).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    registry.subscribe("late");
    registry.unsubscribe("bob");
    tokio::time::sleep(Duration::from_secs(10)).await;
    tx.send(code_payload("infinity", "TWO")).unwrap();
    drop(tx);
    relay.join().await;

    let to_bob = sender.sent_to("bob");
    assert_eq!(to_bob.len(), 2);
    assert_eq!(to_bob[0], sender.sent_to("alice")[0]);
    assert_eq!(to_bob[1], "ONE");
    assert_eq!(sender.sent_to("late").len(), 2);
    assert_eq!(sender.sent_to("late")[1], "TWO");
}
