//! NATS JetStream integration tests
//!
//! These tests require a running NATS server with JetStream enabled:
//!   nats-server -js
//!
//! Tests are skipped automatically if NATS is not available.

use a3s_eventstream::{
    ClientConfig, ConsumeExit, Event, EventStreamClient, NatsBroker, NatsConfig, PublishRequest,
    Result, RetryPolicy, StorageType, SubscribeRequest,
};
use std::time::Duration;
use tokio::sync::mpsc;

/// Try to connect to NATS. Returns None if server is unavailable.
async fn try_nats_broker(stream_suffix: &str) -> Option<(NatsBroker, String)> {
    let prefix = format!("test.{}", stream_suffix);
    let config = NatsConfig {
        url: "nats://127.0.0.1:4222".to_string(),
        stream_name: format!("TEST_EVENTSTREAM_{}", stream_suffix),
        subject_prefix: prefix.clone(),
        storage: StorageType::Memory,
        max_events: 10_000,
        max_age_secs: 60,
        connect_timeout_secs: 2,
        ..Default::default()
    };

    match NatsBroker::connect(config).await {
        Ok(broker) => Some((broker, prefix)),
        Err(_) => {
            eprintln!("NATS not available, skipping integration test");
            None
        }
    }
}

/// Helper to create a client backed by NATS, or skip the test
macro_rules! nats_client {
    ($suffix:expr) => {
        match try_nats_broker($suffix).await {
            Some((broker, prefix)) => EventStreamClient::new(
                prefix,
                broker,
                ClientConfig {
                    retry: RetryPolicy {
                        initial_interval_ms: 10,
                        ..Default::default()
                    },
                    max_wait_ms: 200,
                    ..Default::default()
                },
            ),
            None => return,
        }
    };
}

fn subscriber(topic: &str) -> (SubscribeRequest, mpsc::UnboundedReceiver<Result<Event>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let request = SubscribeRequest::new(topic, move |delivery: Result<Event>| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(delivery);
        }
    });
    (request, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Result<Event>>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("callback channel closed")
        .expect("expected an event")
}

#[tokio::test]
async fn test_nats_publish_and_receive() {
    let client = nats_client!("pub_recv");
    assert_eq!(client.broker_name(), "nats");

    let (request, mut rx) = subscriber("orders");
    let handle = client
        .register(request.with_group_id("billing"))
        .await
        .unwrap();

    let published = client
        .publish_sync(
            PublishRequest::new("orderCreated")
                .with_topic("orders")
                .with_namespace("shop")
                .with_payload(serde_json::json!({"orderId": 42})),
        )
        .await
        .unwrap();

    let received = next_event(&mut rx).await;
    assert_eq!(received, published);

    handle.cancel();
    assert!(matches!(handle.join().await.unwrap(), ConsumeExit::Cancelled));
}

#[tokio::test]
async fn test_nats_fan_out_to_multiple_topics() {
    let client = nats_client!("fan_out");

    let (orders, mut rx_orders) = subscriber("orders");
    let (audit, mut rx_audit) = subscriber("audit");
    let a = client.register(orders.with_group_id("fan")).await.unwrap();
    let b = client.register(audit.with_group_id("fan")).await.unwrap();

    let event = client
        .publish_sync(PublishRequest::new("orderCreated").with_topics(["orders", "audit"]))
        .await
        .unwrap();

    // Same event id on both subjects must not be deduplicated by the stream
    assert_eq!(next_event(&mut rx_orders).await.id, event.id);
    assert_eq!(next_event(&mut rx_audit).await.id, event.id);

    a.cancel();
    b.cancel();
    a.join().await.unwrap();
    b.join().await.unwrap();
}

#[tokio::test]
async fn test_nats_event_name_filter() {
    let client = nats_client!("filter");

    let (request, mut rx) = subscriber("orders");
    let handle = client
        .register(
            request
                .with_event_name("orderCreated")
                .with_group_id("created"),
        )
        .await
        .unwrap();

    client
        .publish_sync(PublishRequest::new("orderDeleted").with_topic("orders"))
        .await
        .unwrap();
    let created = client
        .publish_sync(PublishRequest::new("orderCreated").with_topic("orders"))
        .await
        .unwrap();

    assert_eq!(next_event(&mut rx).await.id, created.id);

    handle.cancel();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_nats_cancel_delivers_cancellation() {
    let client = nats_client!("cancel");

    let (request, mut rx) = subscriber("orders");
    let handle = client.register(request.with_group_id("cancel")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    assert!(matches!(handle.join().await.unwrap(), ConsumeExit::Cancelled));

    let delivery = rx.recv().await.unwrap();
    assert!(delivery.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_nats_delete_group() {
    let Some((broker, _)) = try_nats_broker("delete_group").await else {
        return;
    };
    let client = broker.client();

    let reader = client
        .open_reader(a3s_eventstream::ReaderConfig {
            topic: "test.delete_group.orders".to_string(),
            group_id: "temp".to_string(),
            start_offset: Default::default(),
            max_wait: Duration::from_millis(100),
            max_bytes: 1024,
            dial_timeout: None,
        })
        .await
        .unwrap();
    drop(reader);

    client
        .delete_group("temp", "test.delete_group.orders")
        .await
        .unwrap();
    assert!(client
        .delete_group("temp", "test.delete_group.orders")
        .await
        .is_err());
}
