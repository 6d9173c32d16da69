use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use super::delivery::{report_close, watch_cancellation};
use super::{CloseReason, MemoryObserver, Message, MessageStream, QueueEvent, QueueObserver};
use crate::context::Context;
use crate::utils::error::BrokerError;

#[test]
fn test_message_encodes_wire_format() {
    let message = Message {
        id: "abc".to_string(),
        body: b"hello".to_vec(),
        timestamp: Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()),
        ..Message::default()
    }
    .with_metadata("source", "scraper");

    let value: serde_json::Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
    assert_eq!(value["ID"], "abc");
    assert_eq!(value["Body"], "aGVsbG8=");
    assert_eq!(value["Timestamp"], "2025-01-02T03:04:05Z");
    assert_eq!(value["Metadata"]["source"], "scraper");
}

#[test]
fn test_message_decodes_null_metadata() {
    let payload = r#"{"ID":"42","Body":"eyJjeWNsZSI6MX0=","Timestamp":"2025-06-01T12:00:00.5+02:00","Metadata":null}"#;
    let message = Message::decode(payload).unwrap();

    assert_eq!(message.id, "42");
    assert_eq!(message.body, br#"{"cycle":1}"#.to_vec());
    assert_eq!(
        message.timestamp.unwrap().to_rfc3339(),
        "2025-06-01T10:00:00.500+00:00"
    );
    assert!(message.metadata.is_empty());
}

#[test]
fn test_message_decode_tolerates_missing_fields() {
    let message = Message::decode(r#"{"ID":"only-id"}"#).unwrap();
    assert_eq!(message.id, "only-id");
    assert!(message.body.is_empty());
    assert!(message.timestamp.is_none());
}

#[test]
fn test_message_decode_rejects_garbage() {
    assert!(Message::decode("not json").is_err());
    assert!(Message::decode(r#"{"ID":"x","Body":"%%%"}"#).is_err());
    assert!(Message::decode(r#"{"ID":"x","Timestamp":"yesterday"}"#).is_err());
}

#[test]
fn test_fill_defaults_only_fills_missing_values() {
    let mut fresh = Message::new("payload");
    fresh.fill_defaults();
    assert_eq!(fresh.id.len(), 36);
    assert!(fresh.timestamp.is_some());

    let stamp = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
    let mut preset = Message {
        id: "keep-me".to_string(),
        timestamp: Some(stamp),
        ..Message::new("payload")
    };
    preset.fill_defaults();
    assert_eq!(preset.id, "keep-me");
    assert_eq!(preset.timestamp, Some(stamp));
}

#[test]
fn test_fill_defaults_generates_unique_ids() {
    let mut a = Message::new("a");
    let mut b = Message::new("b");
    a.fill_defaults();
    b.fill_defaults();
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn test_message_stream_yields_in_order_then_ends() {
    let (tx, rx) = mpsc::channel(4);
    let mut stream = MessageStream::new("orders", rx);
    assert_eq!(stream.topic(), "orders");

    tx.send(Message::new("1")).await.unwrap();
    tx.send(Message::new("2")).await.unwrap();
    tx.send(Message::new("3")).await.unwrap();
    drop(tx);

    assert_eq!(stream.try_recv().unwrap().body, b"1".to_vec());
    assert_eq!(stream.recv().await.unwrap().body, b"2".to_vec());
    assert_eq!(stream.next().await.unwrap().body, b"3".to_vec());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_watch_cancellation_sets_stop_flag() {
    let (ctx, handle) = Context::with_cancel();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let watcher = tokio::spawn(watch_cancellation(ctx, Arc::new(stop_tx)));

    handle.cancel();
    timeout(Duration::from_secs(1), stop_rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(*stop_rx.borrow());
    timeout(Duration::from_secs(1), watcher).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_watch_cancellation_exits_when_task_is_gone() {
    let (stop_tx, stop_rx) = watch::channel(false);
    let watcher = tokio::spawn(watch_cancellation(Context::background(), Arc::new(stop_tx)));

    drop(stop_rx);
    timeout(Duration::from_secs(1), watcher).await.unwrap().unwrap();
}

#[test]
fn test_memory_observer_records_events() {
    let observer = MemoryObserver::new();
    observer.observe(&QueueEvent::SubscriptionConfirmed {
        topic: "t".to_string(),
    });
    observer.observe(&QueueEvent::SubscriptionClosed {
        topic: "t".to_string(),
        reason: CloseReason::IdleTimeout,
    });

    assert_eq!(observer.events().len(), 2);
    assert_eq!(
        observer.count(|e| matches!(e, QueueEvent::SubscriptionClosed { .. })),
        1
    );
    assert_eq!(CloseReason::IdleTimeout.to_string(), "idle_timeout");
}

#[test]
fn test_report_close_records_only_failures() {
    let observer = MemoryObserver::new();
    report_close(&observer, "prices", Ok(()));
    report_close(&observer, "prices", Err(BrokerError::Closed));

    assert_eq!(
        observer.events(),
        vec![QueueEvent::CloseFailed {
            topic: "prices".to_string(),
            error: "connection closed by broker".to_string(),
        }]
    );
}
