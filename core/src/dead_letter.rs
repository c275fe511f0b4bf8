//! Parking place for messages the worker gave up on.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A message that could not be processed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedDelivery {
    /// Queue the message came from.
    pub queue: String,
    /// Raw message body.
    pub payload: Vec<u8>,
    /// Last error seen.
    pub error_message: String,
    /// Delivery attempts made.
    pub retry_count: u32,
    /// When the first attempt failed.
    pub first_failed_at: DateTime<Utc>,
    /// When the worker gave up.
    pub last_failed_at: DateTime<Utc>,
}

/// Write side of the dead-letter queue.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Park a message and return the entry id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the entry could not be written.
    async fn add_entry(&self, entry: FailedDelivery) -> Result<i64, StoreError>;
}
