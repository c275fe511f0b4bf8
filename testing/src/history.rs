//! In-memory audit ledger and search index.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use crate::INJECTED_FAILURE;
use async_trait::async_trait;
use helpdesk_core::error::{Component, Error, IndexError};
use helpdesk_core::history::{HistoryIndex, HistoryRecorder, most_recent_first};
use helpdesk_core::types::{
    HistoryId, NewHistoryEntry, Priority, TicketHistory, TicketId, TicketStatus, UserId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Vec-backed [`HistoryRecorder`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryRecorder {
    rows: Arc<Mutex<Vec<TicketHistory>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryHistoryRecorder {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `record` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All rows in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<TicketHistory> {
        self.rows.lock().unwrap().clone()
    }

    /// Number of rows for one ticket.
    #[must_use]
    pub fn count_for(&self, ticket_id: TicketId) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.ticket_id == ticket_id)
            .count()
    }

    fn select(&self, keep: impl Fn(&TicketHistory) -> bool) -> Vec<TicketHistory> {
        let mut rows: Vec<TicketHistory> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| keep(row))
            .cloned()
            .collect();
        most_recent_first(&mut rows);
        rows
    }
}

#[async_trait]
impl HistoryRecorder for InMemoryHistoryRecorder {
    async fn record(&self, entry: NewHistoryEntry) -> Result<TicketHistory, Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::transient(Component::Store, INJECTED_FAILURE));
        }
        let mut rows = self.rows.lock().unwrap();
        let id = i64::try_from(rows.len()).unwrap_or(i64::MAX) + 1;
        let row = TicketHistory {
            id: HistoryId::new(id),
            ticket_id: entry.ticket_id,
            user_id: entry.user_id,
            status: entry.status,
            priority: entry.priority,
            changed_at: entry.changed_at,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn by_ticket(&self, ticket_id: TicketId) -> Result<Vec<TicketHistory>, Error> {
        Ok(self.select(|row| row.ticket_id == ticket_id))
    }

    async fn by_status(&self, status: &TicketStatus) -> Result<Vec<TicketHistory>, Error> {
        Ok(self.select(|row| &row.status == status))
    }

    async fn by_priority(&self, priority: &Priority) -> Result<Vec<TicketHistory>, Error> {
        Ok(self.select(|row| &row.priority == priority))
    }

    async fn by_user(&self, user_id: UserId) -> Result<Vec<TicketHistory>, Error> {
        Ok(self.select(|row| row.user_id == user_id))
    }
}

/// Vec-backed [`HistoryIndex`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryIndex {
    documents: Arc<Mutex<Vec<TicketHistory>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryHistoryIndex {
    /// Empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `index` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Indexed documents.
    #[must_use]
    pub fn documents(&self) -> Vec<TicketHistory> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryIndex for InMemoryHistoryIndex {
    async fn index(&self, entry: &TicketHistory) -> Result<(), IndexError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IndexError(INJECTED_FAILURE.to_string()));
        }
        self.documents.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
