//! Ticket cache capability and key layout.
//!
//! Keys:
//! - `ticket:{id}` holds one serialized [`Ticket`](crate::types::Ticket).
//! - `tickets:list:{limit}:{page}:{filterhash}` holds one serialized page.
//!
//! Listing keys are registered in the [`LISTING_INDEX_KEY`] set so that a
//! write can drop every cached page at once without knowing which filters
//! were used.

use crate::error::CacheError;
use crate::input::TicketFilter;
use crate::types::TicketId;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::time::Duration;

/// Time-to-live of every ticket cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Set holding every listing key currently written.
pub const LISTING_INDEX_KEY: &str = "tickets:list:keys";

/// Key of a single ticket.
#[must_use]
pub fn ticket_key(id: TicketId) -> String {
    format!("ticket:{id}")
}

/// Key of one listing page, derived from the whole normalized filter.
#[must_use]
pub fn listing_key(filter: &TicketFilter) -> String {
    let filter = filter.normalized();
    let canonical = format!("limit={};page={}", filter.limit, filter.page);
    let digest = Sha256::digest(canonical.as_bytes());

    let mut hash = String::with_capacity(16);
    for byte in &digest[..8] {
        let _ = write!(hash, "{byte:02x}");
    }

    format!("tickets:list:{}:{}:{hash}", filter.limit, filter.page)
}

/// Key/value cache with per-entry TTL.
///
/// Values are opaque bytes. Implementations must not interpret them.
#[async_trait]
pub trait TicketCache: Send + Sync {
    /// Read an entry. `Ok(None)` on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be reached.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write a single-ticket entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be reached.
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Write a listing entry and register its key in the listing index.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be reached.
    async fn put_listing(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Drop one entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be reached.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every registered listing entry and the index itself.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be reached.
    async fn invalidate_listings(&self) -> Result<(), CacheError>;
}
