//! Redpanda message broker for the helpdesk notification pipeline.
//!
//! Implements [`MessageBroker`] from `helpdesk-core` on rdkafka, so it works
//! against Redpanda or any other Kafka-compatible cluster.
//!
//! # Mapping
//!
//! ```text
//! exchange     ──▶ topic
//! routing key  ──▶ message key (partitioning)
//! queue        ──▶ consumer group
//! binding      ──▶ the group's subscription to the topic
//! ack          ──▶ manual offset commit (offset + 1)
//! ```
//!
//! [`MessageBroker::declare`] creates the topic through the admin API, so
//! publishing never depends on topic auto-creation. Consumer groups come into
//! existence on first subscribe and need no declaration.
//!
//! # Delivery Semantics
//!
//! Auto-commit is disabled. A message's offset is committed only when the
//! consumer calls [`Delivery::ack`]. If the worker dies before acknowledging,
//! the group's committed offset still points at the message and the next
//! consumer of the queue receives it again.
//!
//! Commits are cumulative per partition: acknowledging a message also
//! acknowledges every earlier message of the same partition. The email worker
//! handles deliveries one at a time, in order, so this matches its needs.
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_core::broker::{BrokerTopology, MessageBroker};
//! use helpdesk_redpanda::RedpandaBroker;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = RedpandaBroker::new("localhost:9092")?;
//! let topology = BrokerTopology::default();
//!
//! broker.publish(&topology, br#"{"subject":"Printer jam"}"#).await?;
//!
//! let mut deliveries = broker.consume(&topology).await?;
//! while let Some(delivery) = deliveries.next().await {
//!     let delivery = delivery?;
//!     println!("{} bytes", delivery.payload().len());
//!     delivery.ack().await?;
//! }
//! # Ok(())
//! # }
//! ```

use helpdesk_core::broker::{
    Acknowledger, BrokerError, BrokerTopology, Delivery, DeliveryStream, MessageBroker,
};
use rdkafka::Offset;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Redpanda-backed [`MessageBroker`].
///
/// One producer is shared by every publish. Each call to
/// [`consume`](MessageBroker::consume) creates its own consumer in the
/// queue's consumer group; dropping the returned stream leaves the group.
///
/// # Example
///
/// ```no_run
/// use helpdesk_redpanda::RedpandaBroker;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = RedpandaBroker::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaBroker {
    /// Kafka producer for publishing messages
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Delivery buffer size per consumer
    buffer_size: usize,
    /// Auto offset reset policy for new consumer groups
    auto_offset_reset: String,
    /// Partitions of a declared topic
    partitions: i32,
    /// Replication factor of a declared topic
    replication_factor: i32,
}

impl RedpandaBroker {
    /// Broker with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, BrokerError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the broker.
    #[must_use]
    pub fn builder() -> RedpandaBrokerBuilder {
        RedpandaBrokerBuilder::default()
    }

    /// Bootstrap servers.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for a [`RedpandaBroker`].
#[derive(Default)]
pub struct RedpandaBrokerBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
    partitions: Option<i32>,
    replication_factor: Option<i32>,
}

impl RedpandaBrokerBuilder {
    /// Comma-separated broker addresses (e.g., "localhost:9092").
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all". A publish only resolves once every in-sync replica
    /// has the message.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deliveries buffered between the Kafka consumer and the caller.
    ///
    /// Default: 100. Zero is treated as 1.
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Where a consumer group without a committed offset starts reading.
    ///
    /// Default: "earliest", so messages published before the first worker
    /// started are still delivered.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Partitions of topics created by [`MessageBroker::declare`].
    ///
    /// Default: 1, which keeps the queue in publish order.
    #[must_use]
    pub const fn partitions(mut self, partitions: i32) -> Self {
        self.partitions = Some(partitions);
        self
    }

    /// Replication factor of topics created by [`MessageBroker::declare`].
    ///
    /// Default: 1. Use 3 on a production cluster.
    #[must_use]
    pub const fn replication_factor(mut self, replication_factor: i32) -> Self {
        self.replication_factor = Some(replication_factor);
        self
    }

    /// Build the [`RedpandaBroker`].
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionFailed`] if brokers are not set or the
    /// producer configuration is rejected.
    pub fn build(self) -> Result<RedpandaBroker, BrokerError> {
        let brokers = self
            .brokers
            .ok_or_else(|| BrokerError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| BrokerError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let buffer_size = self.buffer_size.unwrap_or(100).max(1);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks = acks,
            compression = compression,
            buffer_size = buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaBroker created"
        );

        Ok(RedpandaBroker {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            buffer_size,
            auto_offset_reset,
            partitions: self.partitions.unwrap_or(1).max(1),
            replication_factor: self.replication_factor.unwrap_or(1).max(1),
        })
    }
}

/// Commits one message's offset on the consumer that received it.
struct OffsetAcknowledger {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl Acknowledger for OffsetAcknowledger {
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let mut offsets = TopicPartitionList::new();
            offsets
                .add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))
                .map_err(|e| BrokerError::AckFailed(e.to_string()))?;

            self.consumer
                .commit(&offsets, CommitMode::Sync)
                .map_err(|e| BrokerError::AckFailed(e.to_string()))?;

            tracing::trace!(
                topic = %self.topic,
                partition = self.partition,
                offset = self.offset,
                "Offset committed"
            );
            Ok(())
        })
    }
}

impl MessageBroker for RedpandaBroker {
    fn declare(
        &self,
        topology: &BrokerTopology,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let topic = topology.exchange.clone();
        let queue = topology.queue.clone();

        Box::pin(async move {
            let declare_failed = |reason: String| BrokerError::DeclareFailed {
                exchange: topic.clone(),
                reason,
            };

            let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .create()
                .map_err(|e| declare_failed(format!("Failed to create admin client: {e}")))?;

            let new_topic = NewTopic::new(
                &topic,
                self.partitions,
                TopicReplication::Fixed(self.replication_factor),
            );
            let options = AdminOptions::new().operation_timeout(Some(self.timeout));

            let results = admin
                .create_topics(&[new_topic], &options)
                .await
                .map_err(|e| declare_failed(e.to_string()))?;

            for result in results {
                match result {
                    Ok(name) => tracing::info!(topic = %name, "Topic created"),
                    Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        tracing::debug!(topic = %name, "Topic already exists");
                    },
                    Err((_, code)) => return Err(declare_failed(code.to_string())),
                }
            }

            tracing::info!(topic = %topic, queue = %queue, "Topology declared");
            Ok(())
        })
    }

    fn publish(
        &self,
        topology: &BrokerTopology,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        // Clone data before moving into async block
        let topic = topology.exchange.clone();
        let key = topology.routing_key.clone();
        let payload = payload.to_vec();
        let timeout = self.timeout;

        Box::pin(async move {
            let record = FutureRecord::to(&topic).payload(&payload).key(&key);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        "Message published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(BrokerError::PublishFailed {
                        exchange: topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn consume(
        &self,
        topology: &BrokerTopology,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, BrokerError>> + Send + '_>> {
        let topic = topology.exchange.clone();
        let group = topology.queue.clone();
        let brokers = self.brokers.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            let consume_failed = |reason: String| BrokerError::ConsumeFailed {
                queue: group.clone(),
                reason,
            };

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| consume_failed(format!("Failed to create consumer: {e}")))?;

            consumer
                .subscribe(&[topic.as_str()])
                .map_err(|e| consume_failed(format!("Failed to subscribe: {e}")))?;

            tracing::info!(
                topic = %topic,
                queue = %group,
                buffer_size = buffer_size,
                "Consuming queue"
            );

            let consumer = Arc::new(consumer);
            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

            // The task owns the consumer's message stream. It stops, and the
            // consumer leaves the group, once the delivery stream is dropped.
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();
                loop {
                    let next = tokio::select! {
                        () = tx.closed() => break,
                        next = stream.next() => next,
                    };
                    let Some(message) = next else { break };

                    let item = match message {
                        Ok(message) => {
                            let acker = OffsetAcknowledger {
                                consumer: Arc::clone(&consumer),
                                topic: message.topic().to_string(),
                                partition: message.partition(),
                                offset: message.offset(),
                            };
                            let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                            // Kafka does not flag redeliveries.
                            Ok(Delivery::new(payload, false, Box::new(acker)))
                        },
                        Err(e) => Err(BrokerError::Transport(format!(
                            "Failed to receive message: {e}"
                        ))),
                    };

                    if tx.send(item).await.is_err() {
                        break;
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_broker_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaBroker>();
        assert_sync::<RedpandaBroker>();
    }

    #[test]
    fn declared_topics_have_at_least_one_partition_and_replica() {
        let broker = RedpandaBroker::builder()
            .brokers("localhost:9092")
            .partitions(0)
            .replication_factor(-1)
            .build()
            .unwrap();

        assert_eq!(broker.partitions, 1);
        assert_eq!(broker.replication_factor, 1);
    }

    #[test]
    fn build_requires_brokers() {
        let result = RedpandaBroker::builder().build();
        assert!(matches!(result, Err(BrokerError::ConnectionFailed(_))));
    }
}
