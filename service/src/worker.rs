//! Email worker: drains the notification queue and sends the mail.
//!
//! ```text
//! broker ──Delivery──▶ decode ──▶ send (retry) ──▶ ack
//!                         │            │
//!                         └── failed ──┴──▶ dead letters ──▶ ack
//! ```
//!
//! One worker handles one delivery at a time. When a delivery is settled
//! depends on [`AckMode`]:
//!
//! - [`AckMode::AfterDelivery`] (default): the message is acknowledged only
//!   once the mail was sent or the message was parked in the dead-letter
//!   queue. A crash in between leaves it with the broker, which hands it out
//!   again. Duplicates are possible, silent loss is not.
//! - [`AckMode::BeforeDelivery`]: the message is acknowledged as soon as it
//!   is dequeued and sent once. A crash or a relay failure loses it.

use crate::retry::{Exhausted, RetryPolicy, retry_with_predicate};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use helpdesk_core::broker::{BrokerError, BrokerTopology, Delivery, MessageBroker};
use helpdesk_core::dead_letter::{DeadLetterSink, FailedDelivery};
use helpdesk_core::environment::Clock;
use helpdesk_core::error::{MailError, StoreError};
use helpdesk_core::mail::{Email, Mailer};
use helpdesk_core::types::Notification;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// When a delivery is acknowledged to the broker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AckMode {
    /// After the mail was sent or dead-lettered (at-least-once).
    #[default]
    AfterDelivery,
    /// On dequeue, before sending (at-most-once, failures are lost).
    BeforeDelivery,
}

impl AckMode {
    /// Configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AfterDelivery => "after_delivery",
            Self::BeforeDelivery => "before_delivery",
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized [`AckMode`] name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown ack mode {0:?} (expected after_delivery or before_delivery)")]
pub struct UnknownAckMode(pub String);

impl FromStr for AckMode {
    type Err = UnknownAckMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "after_delivery" => Ok(Self::AfterDelivery),
            "before_delivery" => Ok(Self::BeforeDelivery),
            _ => Err(UnknownAckMode(s.to_string())),
        }
    }
}

/// What happened to one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The mail was sent.
    Delivered,
    /// The mail was not sent and the message is gone (ack-before-delivery only).
    Failed,
    /// The message was parked in the dead-letter queue.
    DeadLettered,
}

impl Outcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

/// A delivery the worker could not settle. It stays with the broker.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Acknowledging failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The dead-letter write failed, so the message was not acknowledged.
    #[error("Could not dead-letter message: {0}")]
    DeadLetter(StoreError),
}

/// Long-running consumer of the notification queue.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use helpdesk::worker::EmailWorker;
/// # use helpdesk_core::broker::{BrokerTopology, MessageBroker};
/// # use helpdesk_core::dead_letter::DeadLetterSink;
/// # use helpdesk_core::environment::SystemClock;
/// # use helpdesk_core::mail::Mailer;
/// # async fn example<M: Mailer + 'static>(
/// #     broker: Arc<dyn MessageBroker>,
/// #     mailer: M,
/// #     dead_letters: Arc<dyn DeadLetterSink>,
/// # ) {
/// let (worker, shutdown) = EmailWorker::new(
///     broker,
///     BrokerTopology::default(),
///     mailer,
///     dead_letters,
///     Arc::new(SystemClock),
/// );
/// let handle = worker.spawn();
///
/// // Later:
/// let _ = shutdown.send(true);
/// let _ = handle.await;
/// # }
/// ```
pub struct EmailWorker<M> {
    broker: Arc<dyn MessageBroker>,
    topology: BrokerTopology,
    mailer: M,
    dead_letters: Arc<dyn DeadLetterSink>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    ack_mode: AckMode,
    resubscribe_delay: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<M: Mailer + 'static> EmailWorker<M> {
    /// Create a worker and the sender that stops it.
    ///
    /// Send `true` on the returned channel to stop the worker after the
    /// delivery in progress.
    #[must_use]
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        topology: BrokerTopology,
        mailer: M,
        dead_letters: Arc<dyn DeadLetterSink>,
        clock: Arc<dyn Clock>,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Self {
            broker,
            topology,
            mailer,
            dead_letters,
            clock,
            retry: RetryPolicy::default(),
            ack_mode: AckMode::default(),
            resubscribe_delay: Duration::from_secs(1),
            shutdown: shutdown_rx,
        };

        (worker, shutdown_tx)
    }

    /// Override the delivery retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Choose when deliveries are acknowledged.
    #[must_use]
    pub const fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    /// Pause between losing the subscription and subscribing again.
    #[must_use]
    pub const fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Run the worker on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consume until shutdown.
    ///
    /// A broken subscription, or a delivery that could not be settled, makes
    /// the worker subscribe again after the resubscribe delay.
    pub async fn run(mut self) {
        tracing::info!(
            queue = %self.topology.queue,
            ack_mode = %self.ack_mode,
            "Email worker started"
        );

        while !*self.shutdown.borrow() {
            let mut deliveries = match self.broker.consume(&self.topology).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(queue = %self.topology.queue, error = %e, "Subscription failed");
                    self.pause().await;
                    continue;
                }
            };

            loop {
                tokio::select! {
                    next = deliveries.next() => match next {
                        Some(Ok(delivery)) => {
                            if let Err(e) = self.process(delivery).await {
                                tracing::error!(
                                    queue = %self.topology.queue,
                                    error = %e,
                                    "Delivery left unsettled, resubscribing"
                                );
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(queue = %self.topology.queue, error = %e, "Delivery stream failed");
                            break;
                        }
                        None => {
                            tracing::warn!(queue = %self.topology.queue, "Delivery stream ended");
                            break;
                        }
                    },

                    _ = self.shutdown.changed() => {
                        if *self.shutdown.borrow() {
                            tracing::info!(queue = %self.topology.queue, "Shutdown signal received");
                            break;
                        }
                    }
                }
            }

            drop(deliveries);
            self.pause().await;
        }

        tracing::info!(queue = %self.topology.queue, "Email worker stopped");
    }

    // Sleep for the resubscribe delay unless shutdown comes first.
    async fn pause(&mut self) {
        if *self.shutdown.borrow() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(self.resubscribe_delay) => {}
            _ = self.shutdown.changed() => {}
        }
    }

    /// Handle one delivery.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the delivery could not be settled: the
    /// acknowledgement failed, or the dead-letter write failed. The message
    /// then stays with the broker.
    pub async fn process(&self, delivery: Delivery) -> Result<Outcome, WorkerError> {
        let outcome = match self.ack_mode {
            AckMode::AfterDelivery => self.deliver_then_ack(&delivery).await?,
            AckMode::BeforeDelivery => self.ack_then_deliver(&delivery).await?,
        };

        metrics::counter!("helpdesk_emails_total", "outcome" => outcome.label()).increment(1);
        Ok(outcome)
    }

    async fn deliver_then_ack(&self, delivery: &Delivery) -> Result<Outcome, WorkerError> {
        let email = match decode(delivery.payload()) {
            Ok(email) => email,
            Err(reason) => {
                tracing::error!(queue = %self.topology.queue, error = %reason, "Undecodable notification");
                let now = self.clock.now();
                self.park(delivery, reason.to_string(), 0, now).await?;
                delivery.ack().await?;
                return Ok(Outcome::DeadLettered);
            }
        };

        let mailer = &self.mailer;
        let clock = &self.clock;
        let first_failed_at = OnceLock::new();
        let first_failed = &first_failed_at;
        let message = &email;

        let sent = retry_with_predicate(
            &self.retry,
            move || async move {
                let result = mailer.send(message).await;
                if result.is_err() {
                    first_failed.get_or_init(|| clock.now());
                }
                result
            },
            MailError::is_retryable,
        )
        .await;

        let outcome = match sent {
            Ok(()) => {
                tracing::info!(to = %email.to, redelivered = delivery.is_redelivered(), "Notification email sent");
                Outcome::Delivered
            }
            Err(Exhausted { error, attempts }) => {
                tracing::error!(to = %email.to, attempts, error = %error, "Giving up on notification email");
                let first = first_failed_at
                    .get()
                    .copied()
                    .unwrap_or_else(|| self.clock.now());
                self.park(delivery, error.to_string(), attempts, first).await?;
                Outcome::DeadLettered
            }
        };

        delivery.ack().await?;
        Ok(outcome)
    }

    async fn ack_then_deliver(&self, delivery: &Delivery) -> Result<Outcome, WorkerError> {
        delivery.ack().await?;

        let email = match decode(delivery.payload()) {
            Ok(email) => email,
            Err(reason) => {
                tracing::error!(queue = %self.topology.queue, error = %reason, "Dropping undecodable notification");
                return Ok(Outcome::Failed);
            }
        };

        match self.mailer.send(&email).await {
            Ok(()) => {
                tracing::info!(to = %email.to, "Notification email sent");
                Ok(Outcome::Delivered)
            }
            Err(e) => {
                tracing::error!(to = %email.to, error = %e, "Notification email lost");
                Ok(Outcome::Failed)
            }
        }
    }

    async fn park(
        &self,
        delivery: &Delivery,
        error_message: String,
        retry_count: u32,
        first_failed_at: DateTime<Utc>,
    ) -> Result<(), WorkerError> {
        let entry = FailedDelivery {
            queue: self.topology.queue.clone(),
            payload: delivery.payload().to_vec(),
            error_message,
            retry_count,
            first_failed_at,
            last_failed_at: self.clock.now(),
        };

        let id = self
            .dead_letters
            .add_entry(entry)
            .await
            .map_err(WorkerError::DeadLetter)?;
        tracing::warn!(queue = %self.topology.queue, dead_letter_id = id, "Notification dead-lettered");
        Ok(())
    }
}

/// Turn a queued notification into the email sent to its recipient.
fn decode(payload: &[u8]) -> Result<Email, MailError> {
    let notification: Notification = serde_json::from_slice(payload)
        .map_err(|e| MailError::InvalidMessage(format!("undecodable notification: {e}")))?;

    Ok(Email {
        to: notification.email,
        subject: notification.subject,
        body: notification.message,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ack_mode_names() {
        assert_eq!("after_delivery".parse::<AckMode>().unwrap(), AckMode::AfterDelivery);
        assert_eq!(" Before_Delivery ".parse::<AckMode>().unwrap(), AckMode::BeforeDelivery);
        assert!("eventually".parse::<AckMode>().is_err());
        assert_eq!(AckMode::default().to_string(), "after_delivery");
    }

    #[test]
    fn decode_maps_notification_fields() {
        let payload = br#"{
            "ticket_id": 4,
            "user_id": 2,
            "email": "ops@helpdesk.test",
            "subject": "VPN down",
            "message": "Cannot connect",
            "status": "pending",
            "created_at": "2025-01-01T00:00:00Z"
        }"#;

        let email = decode(payload).unwrap();
        assert_eq!(email.to, "ops@helpdesk.test");
        assert_eq!(email.subject, "VPN down");
        assert_eq!(email.body, "Cannot connect");
    }

    #[test]
    fn garbage_is_a_permanent_failure() {
        let error = decode(b"not json").unwrap_err();
        assert!(!error.is_retryable());
    }
}
