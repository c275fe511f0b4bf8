//! Dead-letter table for notification messages the email worker gave up on.
//!
//! Entries keep the raw message body so an operator can inspect it, fix the
//! cause (bad address, relay outage) and republish it by hand.

use crate::database_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helpdesk_core::dead_letter::{DeadLetterSink, FailedDelivery};
use helpdesk_core::error::{Entity, StoreError};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Status of a dead-lettered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DLQStatus {
    /// Waiting for someone to look at it
    Pending,
    /// Republished successfully
    Resolved,
    /// Dropped on purpose
    Discarded,
}

impl DLQStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(StoreError::Database(format!("Invalid DLQ status: {s}"))),
        }
    }
}

/// A row of `failed_notifications`.
#[derive(Debug, Clone)]
pub struct FailedNotification {
    /// Entry id.
    pub id: i64,
    /// What failed and how.
    pub delivery: FailedDelivery,
    /// Current status.
    pub status: DLQStatus,
    /// When the entry was resolved or discarded.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who resolved it.
    pub resolved_by: Option<String>,
    /// Free-form notes.
    pub resolution_notes: Option<String>,
}

/// `PostgreSQL` dead-letter queue.
///
/// # Example
///
/// ```no_run
/// use helpdesk_postgres::DeadLetterQueue;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
/// for entry in dlq.list_pending(50).await? {
///     dlq.mark_discarded(entry.id, "recipient left the company").await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

const COLUMNS: &str = "id, queue, payload, error_message, retry_count, first_failed_at, \
                       last_failed_at, status, resolved_at, resolved_by, resolution_notes";

impl DeadLetterQueue {
    /// Queue on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<FailedNotification>, StoreError> {
        self.list_by_status(DLQStatus::Pending, limit).await
    }

    /// Entries with `status`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list_by_status(
        &self,
        status: DLQStatus,
        limit: i64,
    ) -> Result<Vec<FailedNotification>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM failed_notifications \
             WHERE status = $1 \
             ORDER BY first_failed_at ASC \
             LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// One entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no such entry.
    pub async fn get_by_id(&self, id: i64) -> Result<FailedNotification, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM failed_notifications WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?
            .ok_or(StoreError::NotFound {
                entity: Entity::Notification,
                id,
            })?;

        Self::row_to_entry(&row)
    }

    /// Mark an entry resolved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        self.settle(id, DLQStatus::Resolved, Some(resolved_by), notes)
            .await?;
        tracing::info!(dlq_id = id, resolved_by = resolved_by, "Dead letter resolved");
        metrics::counter!("helpdesk_dead_letters_total", "action" => "resolved").increment(1);
        Ok(())
    }

    /// Mark an entry discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        self.settle(id, DLQStatus::Discarded, None, Some(reason))
            .await?;
        tracing::warn!(dlq_id = id, reason = reason, "Dead letter discarded");
        metrics::counter!("helpdesk_dead_letters_total", "action" => "discarded").increment(1);
        Ok(())
    }

    /// Number of pending entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_notifications WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;
        Ok(count)
    }

    async fn settle(
        &self,
        id: i64,
        status: DLQStatus,
        resolved_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE failed_notifications
            SET status = $1, resolved_at = NOW(), resolved_by = $2, resolution_notes = $3
            WHERE id = $4
            ",
        )
        .bind(status.as_str())
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: Entity::Notification,
                id,
            });
        }
        Ok(())
    }

    fn row_to_entry(row: &PgRow) -> Result<FailedNotification, StoreError> {
        let status: String = row.try_get("status").map_err(database_error)?;
        let retry_count: i32 = row.try_get("retry_count").map_err(database_error)?;

        let read = || -> Result<FailedNotification, sqlx::Error> {
            Ok(FailedNotification {
                id: row.try_get("id")?,
                delivery: FailedDelivery {
                    queue: row.try_get("queue")?,
                    payload: row.try_get("payload")?,
                    error_message: row.try_get("error_message")?,
                    retry_count: u32::try_from(retry_count).unwrap_or(0),
                    first_failed_at: row.try_get("first_failed_at")?,
                    last_failed_at: row.try_get("last_failed_at")?,
                },
                status: DLQStatus::Pending,
                resolved_at: row.try_get("resolved_at")?,
                resolved_by: row.try_get("resolved_by")?,
                resolution_notes: row.try_get("resolution_notes")?,
            })
        };

        let mut entry = read().map_err(database_error)?;
        entry.status = DLQStatus::parse(&status)?;
        Ok(entry)
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterQueue {
    async fn add_entry(&self, entry: FailedDelivery) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_notifications (
                queue, payload, error_message, retry_count, first_failed_at, last_failed_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(&entry.queue)
        .bind(&entry.payload)
        .bind(&entry.error_message)
        .bind(i32::try_from(entry.retry_count).unwrap_or(i32::MAX))
        .bind(entry.first_failed_at)
        .bind(entry.last_failed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error)?;

        tracing::warn!(
            dlq_id = id,
            queue = %entry.queue,
            error = %entry.error_message,
            retry_count = entry.retry_count,
            "Notification added to dead-letter queue"
        );
        metrics::counter!("helpdesk_dead_letters_total", "action" => "added").increment(1);

        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn dlq_status_roundtrip() {
        for status in &[DLQStatus::Pending, DLQStatus::Resolved, DLQStatus::Discarded] {
            let parsed = DLQStatus::parse(status.as_str()).expect("valid status should parse");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn dlq_status_invalid() {
        assert!(DLQStatus::parse("processing").is_err());
    }
}
