//! Append-only audit ledger of ticket mutations.

use crate::error::{Error, IndexError};
use crate::types::{NewHistoryEntry, Priority, TicketHistory, TicketId, TicketStatus, UserId};
use async_trait::async_trait;
use std::sync::Arc;

/// The audit ledger.
///
/// Rows are never updated or deleted. Every query returns rows most recent
/// first (`changed_at` descending, then id descending).
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] if the row (or its mirror) could not be written.
    async fn record(&self, entry: NewHistoryEntry) -> Result<TicketHistory, Error>;

    /// Rows of one ticket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] if the ledger is unreachable.
    async fn by_ticket(&self, ticket_id: TicketId) -> Result<Vec<TicketHistory>, Error>;

    /// Rows that moved a ticket into `status`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] if the ledger is unreachable.
    async fn by_status(&self, status: &TicketStatus) -> Result<Vec<TicketHistory>, Error>;

    /// Rows that left a ticket at `priority`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] if the ledger is unreachable.
    async fn by_priority(&self, priority: &Priority) -> Result<Vec<TicketHistory>, Error>;

    /// Rows written on behalf of one user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] if the ledger is unreachable.
    async fn by_user(&self, user_id: UserId) -> Result<Vec<TicketHistory>, Error>;
}

/// Secondary search index mirroring ledger rows.
#[async_trait]
pub trait HistoryIndex: Send + Sync {
    /// Index one row under its id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the index rejects the document.
    async fn index(&self, entry: &TicketHistory) -> Result<(), IndexError>;
}

/// Ledger that mirrors every appended row into a search index.
///
/// Queries are served by the ledger. A row that reached the ledger but not
/// the index is reported as an error to the caller so the gap is never
/// silent.
pub struct IndexedHistoryRecorder {
    ledger: Arc<dyn HistoryRecorder>,
    index: Arc<dyn HistoryIndex>,
}

impl IndexedHistoryRecorder {
    /// Wrap a ledger with an index.
    #[must_use]
    pub fn new(ledger: Arc<dyn HistoryRecorder>, index: Arc<dyn HistoryIndex>) -> Self {
        Self { ledger, index }
    }
}

#[async_trait]
impl HistoryRecorder for IndexedHistoryRecorder {
    async fn record(&self, entry: NewHistoryEntry) -> Result<TicketHistory, Error> {
        let row = self.ledger.record(entry).await?;

        if let Err(e) = self.index.index(&row).await {
            tracing::error!(
                ticket_id = %row.ticket_id,
                history_id = %row.id,
                error = %e,
                "History row stored but not indexed"
            );
            return Err(e.into());
        }

        Ok(row)
    }

    async fn by_ticket(&self, ticket_id: TicketId) -> Result<Vec<TicketHistory>, Error> {
        self.ledger.by_ticket(ticket_id).await
    }

    async fn by_status(&self, status: &TicketStatus) -> Result<Vec<TicketHistory>, Error> {
        self.ledger.by_status(status).await
    }

    async fn by_priority(&self, priority: &Priority) -> Result<Vec<TicketHistory>, Error> {
        self.ledger.by_priority(priority).await
    }

    async fn by_user(&self, user_id: UserId) -> Result<Vec<TicketHistory>, Error> {
        self.ledger.by_user(user_id).await
    }
}

/// Sort rows most recent first.
pub fn most_recent_first(rows: &mut [TicketHistory]) {
    rows.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HistoryId;
    use chrono::{Duration, Utc};

    #[test]
    fn ordering_breaks_ties_by_id() {
        let now = Utc::now();
        let row = |id: i64, offset: i64| TicketHistory {
            id: HistoryId::new(id),
            ticket_id: TicketId::new(1),
            user_id: UserId::new(1),
            status: TicketStatus::Open,
            priority: Priority::High,
            changed_at: now + Duration::seconds(offset),
        };

        let mut rows = vec![row(1, 0), row(3, 10), row(2, 0)];
        most_recent_first(&mut rows);

        let ids: Vec<i64> = rows.iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
