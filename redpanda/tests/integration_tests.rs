//! Integration tests for [`RedpandaBroker`] against a real Kafka-compatible broker.
//!
//! These tests are marked as `#[ignore]` by default because they require
//! Docker and take a while to spin up Kafka.
//!
//! To run explicitly:
//! ```bash
//! cargo test -p helpdesk-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use helpdesk_core::broker::{BrokerTopology, DeliveryStream, MessageBroker};
use helpdesk_redpanda::RedpandaBroker;
use std::time::Duration;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    start_kafka_with_auto_create(true).await
}

async fn start_kafka_with_auto_create(auto_create: bool) -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", auto_create.to_string())
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");

    (kafka, format!("{host}:{port}"))
}

/// Publish until the topic exists and the broker accepts writes.
async fn publish_with_warmup(broker: &RedpandaBroker, topology: &BrokerTopology, payload: &[u8]) {
    for attempt in 1..=60 {
        if broker.publish(topology, payload).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Broker never accepted a publish");
    }
}

async fn next_payload(stream: &mut DeliveryStream, ack: bool) -> Vec<u8> {
    let delivery = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .expect("Timed out waiting for a delivery")
        .expect("Stream ended")
        .expect("Delivery failed");

    if ack {
        delivery.ack().await.expect("Ack failed");
    }
    delivery.payload().to_vec()
}

#[tokio::test]
#[ignore]
async fn test_published_message_reaches_the_queue() {
    let (_kafka, brokers) = start_kafka().await;
    let broker = RedpandaBroker::new(&brokers).expect("Failed to create broker");
    let topology = BrokerTopology::new("notification-it-1", "emailQueue-it-1", "emailQueue");

    publish_with_warmup(&broker, &topology, br#"{"subject":"Printer jam"}"#).await;

    let mut stream = broker.consume(&topology).await.expect("Failed to consume");
    let payload = next_payload(&mut stream, true).await;

    assert_eq!(payload, br#"{"subject":"Printer jam"}"#.to_vec());
}

#[tokio::test]
#[ignore]
async fn test_unacknowledged_message_is_delivered_again() {
    let (_kafka, brokers) = start_kafka().await;
    let broker = RedpandaBroker::new(&brokers).expect("Failed to create broker");
    let topology = BrokerTopology::new("notification-it-2", "emailQueue-it-2", "emailQueue");

    publish_with_warmup(&broker, &topology, b"first").await;

    {
        let mut stream = broker.consume(&topology).await.expect("Failed to consume");
        assert_eq!(next_payload(&mut stream, false).await, b"first".to_vec());
        // Dropped without ack: the worker "crashed".
    }

    // Let the first consumer leave the group.
    tokio::time::sleep(Duration::from_secs(7)).await;

    let mut stream = broker.consume(&topology).await.expect("Failed to resubscribe");
    assert_eq!(next_payload(&mut stream, true).await, b"first".to_vec());
}

#[tokio::test]
#[ignore]
async fn test_declared_topology_accepts_publishes_without_auto_creation() {
    let (_kafka, brokers) = start_kafka_with_auto_create(false).await;
    let broker = RedpandaBroker::new(&brokers).expect("Failed to create broker");
    let topology = BrokerTopology::new("notification-it-3", "emailQueue-it-3", "emailQueue");

    let mut declared = false;
    for _ in 0..60 {
        if broker.declare(&topology).await.is_ok() {
            declared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(declared, "Broker never accepted the topology");

    // Declaring again is a no-op.
    broker.declare(&topology).await.expect("Second declare failed");

    publish_with_warmup(&broker, &topology, b"declared").await;
    let mut stream = broker.consume(&topology).await.expect("Failed to consume");
    assert_eq!(next_payload(&mut stream, true).await, b"declared".to_vec());
}
