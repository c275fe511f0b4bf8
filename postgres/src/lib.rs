//! `PostgreSQL` storage for the helpdesk.
//!
//! Implements every durable-store trait of `helpdesk-core` on one shared
//! [`PgPool`]:
//!
//! - [`PostgresTicketRepository`]: tickets with soft delete and a version column
//! - [`PostgresHistoryRecorder`]: the append-only `ticket_history` ledger
//! - [`PostgresNotificationRepository`]: notification rows
//! - [`PostgresUserDirectory`], [`PostgresCommentRepository`],
//!   [`PostgresAttachmentRepository`]
//! - [`DeadLetterQueue`]: the `failed_notifications` table
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_postgres::{PostgresTicketRepository, connect, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/helpdesk", 10).await?;
//! migrate(&pool).await?;
//! let tickets = PostgresTicketRepository::new(pool);
//! # Ok(())
//! # }
//! ```

use helpdesk_core::error::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};

mod dead_letter_queue;
mod directory;
mod history;
mod notifications;
mod tickets;

pub use dead_letter_queue::{DLQStatus, DeadLetterQueue, FailedNotification};
pub use directory::{PostgresAttachmentRepository, PostgresCommentRepository, PostgresUserDirectory};
pub use history::PostgresHistoryRecorder;
pub use notifications::PostgresNotificationRepository;
pub use tickets::PostgresTicketRepository;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))
}

/// Apply the bundled migrations.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
}

pub(crate) fn database_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}
