//! `tickets` table.

use crate::database_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helpdesk_core::error::{Entity, StoreError};
use helpdesk_core::input::TicketFilter;
use helpdesk_core::store::TicketRepository;
use helpdesk_core::types::{NewTicket, Priority, Ticket, TicketChanges, TicketId, TicketStatus, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const TICKET_COLUMNS: &str = "id, title, description, status, priority, assigned_to, user_id, \
                              due_by, version, created_at, updated_at, deleted_at";

/// `PostgreSQL` [`TicketRepository`].
#[derive(Clone)]
pub struct PostgresTicketRepository {
    pool: PgPool,
}

impl PostgresTicketRepository {
    /// Repository on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_ticket(row: &PgRow) -> Result<Ticket, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let priority: String = row.try_get("priority")?;

        Ok(Ticket {
            id: TicketId::new(row.try_get("id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            status: TicketStatus::parse(&status),
            priority: Priority::parse(&priority),
            assigned_to: UserId::new(row.try_get("assigned_to")?),
            user_id: UserId::new(row.try_get("user_id")?),
            due_by: row.try_get("due_by")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn map_row(row: &PgRow) -> Result<Ticket, StoreError> {
        Self::row_to_ticket(row).map_err(database_error)
    }
}

#[async_trait]
impl TicketRepository for PostgresTicketRepository {
    async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let filter = filter.normalized();
        // LIMIT NULL is "no limit" in PostgreSQL.
        let limit = (filter.limit > 0).then_some(filter.limit);

        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE deleted_at IS NULL \
             ORDER BY id ASC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn find(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn insert(&self, ticket: NewTicket) -> Result<Ticket, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO tickets \
                (title, description, status, priority, assigned_to, user_id, due_by, \
                 version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, $8) \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(ticket.status.as_str())
        .bind(ticket.priority.as_str())
        .bind(ticket.assigned_to.get())
        .bind(ticket.user_id.get())
        .bind(ticket.due_by)
        .bind(ticket.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(database_error)?;

        let created = Self::map_row(&row)?;
        tracing::debug!(ticket_id = %created.id, "Ticket row inserted");
        Ok(created)
    }

    async fn update(&self, changes: TicketChanges) -> Result<Ticket, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE tickets \
             SET title = $2, description = $3, status = $4, priority = $5, \
                 assigned_to = $6, due_by = $7, updated_at = $8, version = version + 1 \
             WHERE id = $1 AND deleted_at IS NULL \
               AND ($9::BIGINT IS NULL OR version = $9) \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(changes.id.get())
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.status.as_str())
        .bind(changes.priority.as_str())
        .bind(changes.assigned_to.get())
        .bind(changes.due_by)
        .bind(changes.updated_at)
        .bind(changes.expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        if let Some(row) = row {
            return Self::map_row(&row);
        }

        // Nothing matched: either the ticket is gone or the version moved on.
        let live: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM tickets WHERE id = $1 AND deleted_at IS NULL")
                .bind(changes.id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

        match (live, changes.expected_version) {
            (Some(_), Some(expected)) => Err(StoreError::Conflict {
                ticket_id: changes.id,
                expected,
            }),
            _ => Err(StoreError::NotFound {
                entity: Entity::Ticket,
                id: changes.id.get(),
            }),
        }
    }

    async fn soft_delete(&self, id: TicketId, at: DateTime<Utc>) -> Result<Ticket, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE tickets SET deleted_at = $2 \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(id.get())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?
        .ok_or(StoreError::NotFound {
            entity: Entity::Ticket,
            id: id.get(),
        })?;

        Self::map_row(&row)
    }
}
