//! Ticket persistence with a cache-aside read path.
//!
//! [`TicketRepository`] is the durable store. [`TicketStore`] is what the
//! rest of the system talks to. [`CachedTicketStore`] implements it over a
//! repository and a [`TicketCache`]:
//!
//! - reads check the cache first and populate it on a miss,
//! - writes go to the repository, then drop the affected cache entries,
//! - any cache failure is logged and treated as a miss.
//!
//! A cache outage therefore costs latency, never correctness. A stale entry
//! left behind by a failed invalidation lives at most one TTL.

use crate::cache::{DEFAULT_CACHE_TTL, TicketCache, listing_key, ticket_key};
use crate::error::{Entity, Error, StoreError};
use crate::input::TicketFilter;
use crate::types::{NewTicket, Ticket, TicketChanges, TicketId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Durable ticket rows.
///
/// Every read excludes soft-deleted rows.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// One page of live tickets ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError>;

    /// A live ticket by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn find(&self, id: TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Insert a ticket at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on driver failure.
    async fn insert(&self, ticket: NewTicket) -> Result<Ticket, StoreError>;

    /// Apply changes to a live ticket, bumping its version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the ticket is missing or deleted,
    /// [`StoreError::Conflict`] if `expected_version` is stale.
    async fn update(&self, changes: TicketChanges) -> Result<Ticket, StoreError>;

    /// Mark a live ticket deleted and return the deleted row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the ticket is missing or already deleted.
    async fn soft_delete(&self, id: TicketId, at: DateTime<Utc>) -> Result<Ticket, StoreError>;
}

/// Ticket access used by the lifecycle.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// One page of tickets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] if the store is unreachable.
    async fn find_all(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, Error>;

    /// A single live ticket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing or soft-deleted ticket.
    async fn find_by_id(&self, id: TicketId) -> Result<Ticket, Error>;

    /// Persist a new ticket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransientIo`] if the store is unreachable.
    async fn create(&self, ticket: NewTicket) -> Result<Ticket, Error>;

    /// Update a ticket and return the stored result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::Conflict`].
    async fn update(&self, changes: TicketChanges) -> Result<Ticket, Error>;

    /// Soft-delete a ticket and return the deleted row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing or already deleted ticket.
    async fn delete(&self, id: TicketId, at: DateTime<Utc>) -> Result<Ticket, Error>;
}

/// Cache-aside [`TicketStore`].
#[derive(Clone)]
pub struct CachedTicketStore {
    repository: Arc<dyn TicketRepository>,
    cache: Arc<dyn TicketCache>,
    ttl: Duration,
}

impl CachedTicketStore {
    /// Store with the default 5 minute TTL.
    #[must_use]
    pub fn new(repository: Arc<dyn TicketRepository>, cache: Arc<dyn TicketCache>) -> Self {
        Self {
            repository,
            cache,
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Override the entry TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    tracing::trace!(key = %key, "Ticket cache hit");
                    metrics::counter!("helpdesk_ticket_cache_total", "result" => "hit").increment(1);
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    metrics::counter!("helpdesk_ticket_cache_total", "result" => "error")
                        .increment(1);
                    None
                }
            },
            Ok(None) => {
                tracing::trace!(key = %key, "Ticket cache miss");
                metrics::counter!("helpdesk_ticket_cache_total", "result" => "miss").increment(1);
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ticket cache read failed, using store");
                metrics::counter!("helpdesk_ticket_cache_total", "result" => "error").increment(1);
                None
            }
        }
    }

    async fn populate<T: Serialize + Sync>(&self, key: &str, value: &T, listing: bool) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Could not encode cache entry");
                return;
            }
        };

        let written = if listing {
            self.cache.put_listing(key, &bytes, self.ttl).await
        } else {
            self.cache.put(key, &bytes, self.ttl).await
        };

        if let Err(e) = written {
            tracing::warn!(key = %key, error = %e, "Ticket cache write failed");
        }
    }

    async fn forget_ticket(&self, id: TicketId) {
        let key = ticket_key(id);
        if let Err(e) = self.cache.invalidate(&key).await {
            tracing::warn!(key = %key, error = %e, "Ticket cache invalidation failed");
        }
    }

    async fn forget_listings(&self) {
        if let Err(e) = self.cache.invalidate_listings().await {
            tracing::warn!(error = %e, "Listing cache invalidation failed");
        }
    }
}

#[async_trait]
impl TicketStore for CachedTicketStore {
    async fn find_all(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, Error> {
        let key = listing_key(filter);
        if let Some(tickets) = self.cached::<Vec<Ticket>>(&key).await {
            return Ok(tickets);
        }

        let tickets = self.repository.list(&filter.normalized()).await?;
        self.populate(&key, &tickets, true).await;
        Ok(tickets)
    }

    async fn find_by_id(&self, id: TicketId) -> Result<Ticket, Error> {
        let key = ticket_key(id);
        if let Some(ticket) = self.cached::<Ticket>(&key).await {
            return Ok(ticket);
        }

        let ticket = self.repository.find(id).await?.ok_or(Error::NotFound {
            entity: Entity::Ticket,
            id: id.get(),
        })?;
        self.populate(&key, &ticket, false).await;
        Ok(ticket)
    }

    async fn create(&self, ticket: NewTicket) -> Result<Ticket, Error> {
        let created = self.repository.insert(ticket).await?;
        self.forget_listings().await;
        Ok(created)
    }

    async fn update(&self, changes: TicketChanges) -> Result<Ticket, Error> {
        let id = changes.id;
        let updated = self.repository.update(changes).await?;
        self.forget_ticket(id).await;
        self.forget_listings().await;
        Ok(updated)
    }

    async fn delete(&self, id: TicketId, at: DateTime<Utc>) -> Result<Ticket, Error> {
        let deleted = self.repository.soft_delete(id, at).await?;
        self.forget_ticket(id).await;
        self.forget_listings().await;
        Ok(deleted)
    }
}
