//! In-memory message broker.
//!
//! Models a direct exchange bound to one queue per topology. Deliveries that
//! are not acknowledged stay with the broker; they are handed out again,
//! flagged as redelivered, when the queue is consumed anew or on
//! [`InMemoryBroker::recover`].

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use crate::INJECTED_FAILURE;
use helpdesk_core::broker::{
    Acknowledger, BrokerError, BrokerTopology, Delivery, DeliveryStream, MessageBroker,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Queue {
    ready: VecDeque<(u64, Vec<u8>, bool)>,
    unacked: BTreeMap<u64, Vec<u8>>,
}

impl Queue {
    fn requeue_unacked(&mut self) {
        let unacked = std::mem::take(&mut self.unacked);
        for (tag, payload) in unacked.into_iter().rev() {
            self.ready.push_front((tag, payload, true));
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, Queue>,
    declared: Vec<BrokerTopology>,
    published: Vec<(String, String, Vec<u8>)>,
    next_tag: u64,
    acked: usize,
}

/// In-memory [`MessageBroker`].
///
/// # Example
///
/// ```
/// use helpdesk_testing::InMemoryBroker;
/// use helpdesk_core::broker::{BrokerTopology, MessageBroker};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryBroker::new();
/// let topology = BrokerTopology::default();
/// broker.publish(&topology, b"{}").await?;
/// assert_eq!(broker.ready_count(&topology.queue), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
    publish_failing: Arc<AtomicBool>,
}

impl InMemoryBroker {
    /// Broker with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail.
    pub fn set_publish_failing(&self, failing: bool) {
        self.publish_failing.store(failing, Ordering::SeqCst);
    }

    /// Every message published, as `(exchange, routing_key, payload)`.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state.lock().unwrap().published.clone()
    }

    /// Topologies declared so far, each listed once.
    #[must_use]
    pub fn declared(&self) -> Vec<BrokerTopology> {
        self.state.lock().unwrap().declared.clone()
    }

    /// Messages waiting to be handed out.
    #[must_use]
    pub fn ready_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map_or(0, |q| q.ready.len())
    }

    /// Messages handed out and not yet acknowledged.
    #[must_use]
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    /// Acknowledgements received so far.
    #[must_use]
    pub fn acked_count(&self) -> usize {
        self.state.lock().unwrap().acked
    }

    /// Put every unacknowledged delivery of `queue` back at the head of the
    /// queue, as a broker does when a consumer's channel closes.
    pub fn recover(&self, queue: &str) {
        if let Some(q) = self.state.lock().unwrap().queues.get_mut(queue) {
            q.requeue_unacked();
        }
        self.notify.notify_waiters();
    }
}

struct InMemoryAcker {
    state: Arc<Mutex<BrokerState>>,
    queue: String,
    tag: u64,
}

impl Acknowledger for InMemoryAcker {
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let removed = state
                .queues
                .get_mut(&self.queue)
                .and_then(|q| q.unacked.remove(&self.tag));
            match removed {
                Some(_) => {
                    state.acked += 1;
                    Ok(())
                }
                None => Err(BrokerError::AckFailed(format!(
                    "unknown delivery tag {} on {}",
                    self.tag, self.queue
                ))),
            }
        })
    }
}

fn take_next(state: &Arc<Mutex<BrokerState>>, queue: &str) -> Option<Delivery> {
    let mut guard = state.lock().unwrap();
    let q = guard.queues.get_mut(queue)?;
    let (tag, payload, redelivered) = q.ready.pop_front()?;
    q.unacked.insert(tag, payload.clone());

    let acker = InMemoryAcker {
        state: Arc::clone(state),
        queue: queue.to_string(),
        tag,
    };
    Some(Delivery::new(payload, redelivered, Box::new(acker)))
}

impl MessageBroker for InMemoryBroker {
    fn declare(
        &self,
        topology: &BrokerTopology,
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let topology = topology.clone();

        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.queues.entry(topology.queue.clone()).or_default();
            if !state.declared.contains(&topology) {
                state.declared.push(topology);
            }
            Ok(())
        })
    }

    fn publish(
        &self,
        topology: &BrokerTopology,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        let topology = topology.clone();
        let payload = payload.to_vec();

        Box::pin(async move {
            if self.publish_failing.load(Ordering::SeqCst) {
                return Err(BrokerError::PublishFailed {
                    exchange: topology.exchange,
                    reason: INJECTED_FAILURE.to_string(),
                });
            }

            {
                let mut state = self.state.lock().unwrap();
                state.next_tag += 1;
                let tag = state.next_tag;
                state.published.push((
                    topology.exchange.clone(),
                    topology.routing_key.clone(),
                    payload.clone(),
                ));
                state
                    .queues
                    .entry(topology.queue.clone())
                    .or_default()
                    .ready
                    .push_back((tag, payload, false));
            }
            self.notify.notify_waiters();
            Ok(())
        })
    }

    fn consume(
        &self,
        topology: &BrokerTopology,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, BrokerError>> + Send + '_>> {
        let queue = topology.queue.clone();

        Box::pin(async move {
            // A new consumer session takes over whatever the previous one left unacked.
            self.state
                .lock()
                .unwrap()
                .queues
                .entry(queue.clone())
                .or_default()
                .requeue_unacked();

            // Ends once every handle on the broker is gone.
            let state = Arc::downgrade(&self.state);
            let notify = Arc::clone(&self.notify);

            let stream = async_stream::stream! {
                loop {
                    let notified = notify.notified();
                    let Some(state) = state.upgrade() else {
                        break;
                    };
                    if let Some(delivery) = take_next(&state, &queue) {
                        yield Ok(delivery);
                        continue;
                    }
                    drop(state);
                    notified.await;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn unacked_messages_come_back_flagged() {
        let broker = InMemoryBroker::new();
        let topology = BrokerTopology::default();
        broker.publish(&topology, b"one").await.unwrap();

        let mut stream = broker.consume(&topology).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload(), b"one");
        assert!(!first.is_redelivered());
        assert_eq!(broker.unacked_count(&topology.queue), 1);
        drop(first);
        drop(stream);

        let mut stream = broker.consume(&topology).await.unwrap();
        let again = stream.next().await.unwrap().unwrap();
        assert!(again.is_redelivered());
        again.ack().await.unwrap();

        assert_eq!(broker.unacked_count(&topology.queue), 0);
        assert_eq!(broker.acked_count(), 1);
    }

    #[tokio::test]
    async fn consumer_wakes_up_on_publish() {
        let broker = InMemoryBroker::new();
        let topology = BrokerTopology::default();
        let mut stream = broker.consume(&topology).await.unwrap();

        let publisher = broker.clone();
        let publish_topology = topology.clone();
        tokio::spawn(async move {
            publisher.publish(&publish_topology, b"late").await.unwrap();
        });

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), b"late");
    }

    #[tokio::test]
    async fn declaring_twice_is_harmless() {
        let broker = InMemoryBroker::new();
        let topology = BrokerTopology::default();

        broker.declare(&topology).await.unwrap();
        broker.publish(&topology, b"kept").await.unwrap();
        broker.declare(&topology).await.unwrap();

        assert_eq!(broker.declared(), vec![topology.clone()]);
        assert_eq!(broker.ready_count(&topology.queue), 1);
    }

    #[tokio::test]
    async fn stream_ends_when_the_broker_is_dropped() {
        let broker = InMemoryBroker::new();
        let topology = BrokerTopology::default();
        let mut stream = broker.consume(&topology).await.unwrap();

        drop(broker);

        assert!(stream.next().await.is_none());
    }
}
