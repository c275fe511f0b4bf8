//! In-memory ticket repository and cache.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only lock poisoning panics

use crate::INJECTED_FAILURE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use helpdesk_core::cache::{LISTING_INDEX_KEY, TicketCache};
use helpdesk_core::environment::{Clock, SystemClock};
use helpdesk_core::error::{CacheError, Entity, StoreError};
use helpdesk_core::input::TicketFilter;
use helpdesk_core::store::TicketRepository;
use helpdesk_core::types::{NewTicket, Ticket, TicketChanges, TicketId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct TicketRows {
    rows: BTreeMap<i64, Ticket>,
    next_id: i64,
}

/// `BTreeMap`-backed [`TicketRepository`] with a call counter.
///
/// # Example
///
/// ```
/// use helpdesk_testing::InMemoryTicketRepository;
///
/// let repository = InMemoryTicketRepository::new();
/// assert_eq!(repository.calls(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketRepository {
    state: Arc<Mutex<TicketRows>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    commit_latency: Arc<Mutex<Duration>>,
}

impl InMemoryTicketRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of repository calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following call fail with [`StoreError::Database`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every insert's reply by `latency`, after the row is stored.
    pub fn set_commit_latency(&self, latency: Duration) {
        *self.commit_latency.lock().unwrap() = latency;
    }

    /// Raw row, including soft-deleted ones.
    #[must_use]
    pub fn row(&self, id: TicketId) -> Option<Ticket> {
        self.state.lock().unwrap().rows.get(&id.get()).cloned()
    }

    /// Number of rows, including soft-deleted ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    /// Whether no row was ever inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store_new(&self, ticket: NewTicket) -> Ticket {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = TicketId::new(state.next_id);

        let row = Ticket {
            id,
            title: ticket.title,
            description: ticket.description,
            status: ticket.status,
            priority: ticket.priority,
            assigned_to: ticket.assigned_to,
            user_id: ticket.user_id,
            due_by: Some(ticket.due_by),
            version: 1,
            created_at: ticket.created_at,
            updated_at: ticket.created_at,
            deleted_at: None,
        };
        state.rows.insert(id.get(), row.clone());
        row
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(INJECTED_FAILURE.to_string()));
        }
        Ok(())
    }
}

fn missing(id: TicketId) -> StoreError {
    StoreError::NotFound {
        entity: Entity::Ticket,
        id: id.get(),
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        self.enter()?;
        let filter = filter.normalized();
        let state = self.state.lock().unwrap();
        let live = state.rows.values().filter(|t| t.deleted_at.is_none());

        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let page: Vec<Ticket> = if filter.limit == 0 {
            live.cloned().collect()
        } else {
            let limit = usize::try_from(filter.limit).unwrap_or(0);
            live.skip(offset).take(limit).cloned().collect()
        };
        Ok(page)
    }

    async fn find(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        self.enter()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .get(&id.get())
            .filter(|t| t.deleted_at.is_none())
            .cloned())
    }

    async fn insert(&self, ticket: NewTicket) -> Result<Ticket, StoreError> {
        self.enter()?;
        let row = self.store_new(ticket);

        let latency = *self.commit_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(row)
    }

    async fn update(&self, changes: TicketChanges) -> Result<Ticket, StoreError> {
        self.enter()?;
        let mut state = self.state.lock().unwrap();
        let row = state
            .rows
            .get_mut(&changes.id.get())
            .filter(|t| t.deleted_at.is_none())
            .ok_or_else(|| missing(changes.id))?;

        if let Some(expected) = changes.expected_version {
            if expected != row.version {
                return Err(StoreError::Conflict {
                    ticket_id: changes.id,
                    expected,
                });
            }
        }

        row.title = changes.title;
        row.description = changes.description;
        row.status = changes.status;
        row.priority = changes.priority;
        row.assigned_to = changes.assigned_to;
        row.due_by = Some(changes.due_by);
        row.updated_at = changes.updated_at;
        row.version += 1;
        Ok(row.clone())
    }

    async fn soft_delete(&self, id: TicketId, at: DateTime<Utc>) -> Result<Ticket, StoreError> {
        self.enter()?;
        let mut state = self.state.lock().unwrap();
        let row = state
            .rows
            .get_mut(&id.get())
            .filter(|t| t.deleted_at.is_none())
            .ok_or_else(|| missing(id))?;

        row.deleted_at = Some(at);
        Ok(row.clone())
    }
}

#[derive(Debug, Default)]
struct CacheEntries {
    entries: HashMap<String, (Vec<u8>, DateTime<Utc>)>,
    listings: HashSet<String>,
}

/// `HashMap`-backed [`TicketCache`] with clock-driven expiry.
#[derive(Clone)]
pub struct InMemoryTicketCache {
    state: Arc<Mutex<CacheEntries>>,
    clock: Arc<dyn Clock>,
    failing: Arc<AtomicBool>,
}

impl Default for InMemoryTicketCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTicketCache {
    /// Cache on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Cache whose entries expire according to `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheEntries::default())),
            clock,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every following call fail with [`CacheError::Connection`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Whether a live entry exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .unwrap()
            .entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > now)
    }

    /// Raw bytes stored under `key`, ignoring expiry.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(key)
            .map(|(bytes, _)| bytes.clone())
    }

    /// Listing keys currently registered.
    #[must_use]
    pub fn listing_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().unwrap().listings.iter().cloned().collect();
        keys.sort();
        keys
    }

    fn enter(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Connection(INJECTED_FAILURE.to_string()));
        }
        Ok(())
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero())
    }
}

#[async_trait]
impl TicketCache for InMemoryTicketCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.enter()?;
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        match state.entries.get(key) {
            Some((bytes, expires_at)) if *expires_at > now => Ok(Some(bytes.clone())),
            Some(_) => {
                state.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.enter()?;
        let expires_at = self.expiry(ttl);
        self.state
            .lock()
            .unwrap()
            .entries
            .insert(key.to_string(), (value.to_vec(), expires_at));
        Ok(())
    }

    async fn put_listing(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.enter()?;
        let expires_at = self.expiry(ttl);
        let mut state = self.state.lock().unwrap();
        state
            .entries
            .insert(key.to_string(), (value.to_vec(), expires_at));
        state.listings.insert(key.to_string());
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.enter()?;
        self.state.lock().unwrap().entries.remove(key);
        Ok(())
    }

    async fn invalidate_listings(&self) -> Result<(), CacheError> {
        self.enter()?;
        let mut state = self.state.lock().unwrap();
        let keys: Vec<String> = state.listings.drain().collect();
        for key in keys {
            state.entries.remove(&key);
        }
        state.entries.remove(LISTING_INDEX_KEY);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ManualClock, test_clock};
    use helpdesk_core::types::{Priority, TicketStatus, UserId};

    fn new_ticket(title: &str) -> NewTicket {
        let now = test_clock().now();
        NewTicket {
            title: title.to_string(),
            description: "details".to_string(),
            status: TicketStatus::Open,
            priority: Priority::Low,
            assigned_to: UserId::new(2),
            user_id: UserId::new(1),
            due_by: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn pages_skip_deleted_rows() {
        let repository = InMemoryTicketRepository::new();
        for i in 0..5 {
            repository.insert(new_ticket(&format!("t{i}"))).await.unwrap();
        }
        repository
            .soft_delete(TicketId::new(2), test_clock().now())
            .await
            .unwrap();

        let page = repository.list(&TicketFilter::new(2, 2)).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![4, 5]);

        let all = repository.list(&TicketFilter::new(0, 0)).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(repository.row(TicketId::new(2)).unwrap().deleted_at.is_some());
    }

    #[tokio::test]
    async fn entries_expire_with_the_clock() {
        let clock = ManualClock::new(test_clock().now());
        let cache = InMemoryTicketCache::with_clock(Arc::new(clock.clone()));

        cache.put("ticket:1", b"x", Duration::from_secs(300)).await.unwrap();
        clock.advance(chrono::Duration::seconds(299));
        assert!(cache.get("ticket:1").await.unwrap().is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.get("ticket:1").await.unwrap().is_none());
    }
}
