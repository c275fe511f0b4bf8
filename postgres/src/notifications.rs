//! `notifications` table.

use crate::database_error;
use async_trait::async_trait;
use helpdesk_core::error::StoreError;
use helpdesk_core::notification::NotificationRepository;
use helpdesk_core::types::{Notification, NotificationId};
use sqlx::PgPool;

/// `PostgreSQL` [`NotificationRepository`].
#[derive(Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    /// Repository on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn save(&self, notification: &Notification) -> Result<NotificationId, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO notifications (ticket_id, user_id, email, subject, message, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(notification.ticket_id.get())
        .bind(notification.user_id.get())
        .bind(&notification.email)
        .bind(&notification.subject)
        .bind(&notification.message)
        .bind(notification.status.as_str())
        .bind(notification.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(NotificationId::new(id))
    }
}
