//! Notification publication.
//!
//! ```text
//! CREATED ──publish──▶ PUBLISHED ──save──▶ PERSISTED
//! ```
//!
//! Publishing comes first: a notification row never exists for a message the
//! broker did not accept. The reverse gap (published, row not saved) is
//! tolerated and logged.

use crate::broker::{BrokerError, BrokerTopology, MessageBroker};
use crate::error::{Error, StoreError};
use crate::types::{Notification, NotificationId};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable notification rows.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Store a notification and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn save(&self, notification: &Notification) -> Result<NotificationId, StoreError>;
}

/// Outcome of a successful dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Stored row, `None` when the message is in flight without a local record.
    pub notification_id: Option<NotificationId>,
}

/// Publishes notification events.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Publish the event, then record it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] if the broker did not accept the
    /// message. Nothing is recorded in that case.
    async fn dispatch(&self, notification: Notification) -> Result<DispatchReceipt, Error>;
}

/// [`NotificationDispatcher`] over a [`MessageBroker`].
pub struct BrokerNotificationDispatcher {
    broker: Arc<dyn MessageBroker>,
    topology: BrokerTopology,
    notifications: Arc<dyn NotificationRepository>,
}

impl BrokerNotificationDispatcher {
    /// Dispatcher publishing to `topology`.
    #[must_use]
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        topology: BrokerTopology,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            broker,
            topology,
            notifications,
        }
    }

    /// Topology this dispatcher publishes to.
    #[must_use]
    pub const fn topology(&self) -> &BrokerTopology {
        &self.topology
    }
}

#[async_trait]
impl NotificationDispatcher for BrokerNotificationDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<DispatchReceipt, Error> {
        let payload = serde_json::to_vec(&notification)
            .map_err(|e| BrokerError::Serialization(e.to_string()))?;

        self.broker.publish(&self.topology, &payload).await?;
        metrics::counter!("helpdesk_notifications_published_total").increment(1);

        match self.notifications.save(&notification).await {
            Ok(id) => {
                tracing::debug!(
                    ticket_id = %notification.ticket_id,
                    notification_id = %id,
                    exchange = %self.topology.exchange,
                    "Notification published"
                );
                Ok(DispatchReceipt {
                    notification_id: Some(id),
                })
            }
            Err(e) => {
                tracing::warn!(
                    ticket_id = %notification.ticket_id,
                    error = %e,
                    "Notification published but not recorded"
                );
                metrics::counter!(
                    "helpdesk_consistency_gaps_total",
                    "step" => "notification_record"
                )
                .increment(1);
                Ok(DispatchReceipt {
                    notification_id: None,
                })
            }
        }
    }
}
