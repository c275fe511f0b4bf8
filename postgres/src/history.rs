//! `ticket_history` ledger.

use crate::database_error;
use async_trait::async_trait;
use helpdesk_core::error::{Error, StoreError};
use helpdesk_core::history::HistoryRecorder;
use helpdesk_core::types::{
    HistoryId, NewHistoryEntry, Priority, TicketHistory, TicketId, TicketStatus, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// `PostgreSQL` [`HistoryRecorder`]. Insert and select only.
#[derive(Clone)]
pub struct PostgresHistoryRecorder {
    pool: PgPool,
}

impl PostgresHistoryRecorder {
    /// Ledger on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_history(row: &PgRow) -> Result<TicketHistory, StoreError> {
        let status: String = row.try_get("status").map_err(database_error)?;
        let priority: String = row.try_get("priority").map_err(database_error)?;

        Ok(TicketHistory {
            id: HistoryId::new(row.try_get("id").map_err(database_error)?),
            ticket_id: TicketId::new(row.try_get("ticket_id").map_err(database_error)?),
            user_id: UserId::new(row.try_get("user_id").map_err(database_error)?),
            status: TicketStatus::parse(&status),
            priority: Priority::parse(&priority),
            changed_at: row.try_get("changed_at").map_err(database_error)?,
        })
    }

    async fn select_where(&self, column: &str, value: Value<'_>) -> Result<Vec<TicketHistory>, Error> {
        let sql = format!(
            "SELECT id, ticket_id, user_id, status, priority, changed_at \
             FROM ticket_history \
             WHERE {column} = $1 \
             ORDER BY changed_at DESC, id DESC"
        );
        let query = sqlx::query(&sql);
        let query = match value {
            Value::Id(id) => query.bind(id),
            Value::Text(text) => query.bind(text),
        };

        let rows = query.fetch_all(&self.pool).await.map_err(database_error)?;
        Ok(rows
            .iter()
            .map(Self::row_to_history)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

enum Value<'a> {
    Id(i64),
    Text(&'a str),
}

#[async_trait]
impl HistoryRecorder for PostgresHistoryRecorder {
    async fn record(&self, entry: NewHistoryEntry) -> Result<TicketHistory, Error> {
        let row = sqlx::query(
            r"
            INSERT INTO ticket_history (ticket_id, user_id, status, priority, changed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, ticket_id, user_id, status, priority, changed_at
            ",
        )
        .bind(entry.ticket_id.get())
        .bind(entry.user_id.get())
        .bind(entry.status.as_str())
        .bind(entry.priority.as_str())
        .bind(entry.changed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(Self::row_to_history(&row)?)
    }

    async fn by_ticket(&self, ticket_id: TicketId) -> Result<Vec<TicketHistory>, Error> {
        self.select_where("ticket_id", Value::Id(ticket_id.get())).await
    }

    async fn by_status(&self, status: &TicketStatus) -> Result<Vec<TicketHistory>, Error> {
        self.select_where("status", Value::Text(status.as_str())).await
    }

    async fn by_priority(&self, priority: &Priority) -> Result<Vec<TicketHistory>, Error> {
        self.select_where("priority", Value::Text(priority.as_str())).await
    }

    async fn by_user(&self, user_id: UserId) -> Result<Vec<TicketHistory>, Error> {
        self.select_where("user_id", Value::Id(user_id.get())).await
    }
}
