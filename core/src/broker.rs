//! Message broker abstraction for the notification pipeline.
//!
//! ```text
//! startup ──declare──▶ exchange + queue + binding
//!
//! dispatcher ──publish──▶ exchange ──routing key──▶ queue ──consume──▶ worker
//!                                                            ◀──ack────┘
//! ```
//!
//! A [`Delivery`] that is dropped without [`Delivery::ack`] stays owned by
//! the broker and is handed out again to the next consumer of the queue.
//! When the worker acknowledges decides whether the pipeline is
//! at-most-once (ack on dequeue) or at-least-once (ack after delivery).
//!
//! # Implementations
//!
//! - `InMemoryBroker` in `helpdesk-testing`
//! - `RedpandaBroker` in `helpdesk-redpanda`

pub use crate::error::BrokerError;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Where notification messages go.
///
/// One durable direct exchange, one durable queue bound with a fixed routing
/// key. Messages are JSON-encoded notifications.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BrokerTopology {
    /// Exchange (topic) messages are published to.
    pub exchange: String,
    /// Queue (consumer group) the worker reads from.
    pub queue: String,
    /// Routing key binding the queue to the exchange.
    pub routing_key: String,
}

impl BrokerTopology {
    /// Custom topology.
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
        }
    }
}

impl Default for BrokerTopology {
    fn default() -> Self {
        Self::new("notification", "emailQueue", "emailQueue")
    }
}

/// Acknowledges one delivery back to the broker.
pub trait Acknowledger: Send + Sync {
    /// Settle the delivery so it is never handed out again.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AckFailed`] if the broker did not accept it.
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}

/// One message handed to a consumer.
pub struct Delivery {
    payload: Vec<u8>,
    redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Wrap a received message.
    #[must_use]
    pub fn new(payload: Vec<u8>, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            payload,
            redelivered,
            acker,
        }
    }

    /// Message body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether this message was handed out before and not acknowledged.
    #[must_use]
    pub const fn is_redelivered(&self) -> bool {
        self.redelivered
    }

    /// Acknowledge the message.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AckFailed`] if the broker did not accept it.
    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries from one queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>;

/// Durable message broker.
///
/// Methods return boxed futures so the trait stays dyn-compatible; the
/// returned futures only borrow `self`, implementations copy whatever they
/// need from the other arguments before suspending.
pub trait MessageBroker: Send + Sync {
    /// Declare the durable exchange, the durable queue and their binding.
    ///
    /// Idempotent: declaring a topology that already exists succeeds.
    /// Called once at startup, before anything is published or consumed.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DeclareFailed`] if the broker refused the topology.
    fn declare(
        &self,
        topology: &BrokerTopology,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;

    /// Publish `payload` to the topology's exchange with its routing key.
    ///
    /// Resolves once the broker confirmed the message is durable.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::PublishFailed`] if the broker did not confirm.
    fn publish(
        &self,
        topology: &BrokerTopology,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;

    /// Start consuming the topology's queue.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConsumeFailed`] if the subscription fails.
    fn consume(
        &self,
        topology: &BrokerTopology,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, BrokerError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topology_matches_the_email_queue() {
        let topology = BrokerTopology::default();
        assert_eq!(topology.exchange, "notification");
        assert_eq!(topology.queue, "emailQueue");
        assert_eq!(topology.routing_key, "emailQueue");
    }
}
