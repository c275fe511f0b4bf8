//! Redis-backed ticket cache.
//!
//! Entries are plain `SET key value EX ttl` strings. Every listing key is
//! also added to the `tickets:list:keys` set, which
//! [`TicketCache::invalidate_listings`] reads to drop all cached pages in one
//! round trip.
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_redis::RedisTicketCache;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisTicketCache::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use helpdesk_core::cache::{LISTING_INDEX_KEY, TicketCache};
use helpdesk_core::error::CacheError;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::time::Duration;

/// [`TicketCache`] on a Redis connection manager.
///
/// Cloning is cheap; clones share the underlying connection.
#[derive(Clone)]
pub struct RedisTicketCache {
    conn_manager: ConnectionManager,
}

impl RedisTicketCache {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if Redis cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Connection(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self { conn_manager })
    }
}

fn cache_error(e: RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_timeout() || e.is_connection_dropped() {
        CacheError::Connection(e.to_string())
    } else {
        CacheError::Command(e.to_string())
    }
}

// Redis rejects `EX 0`.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl TicketCache for RedisTicketCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn_manager.clone();
        conn.get(key).await.map_err(cache_error)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl_seconds(ttl))
            .await
            .map_err(cache_error)?;
        Ok(())
    }

    async fn put_listing(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let seconds = ttl_seconds(ttl);

        // The index outlives every page it names by expiring with the newest one.
        let _: () = redis::pipe()
            .atomic()
            .set_ex(key, value, seconds)
            .ignore()
            .sadd(LISTING_INDEX_KEY, key)
            .ignore()
            .expire(LISTING_INDEX_KEY, i64::try_from(seconds).unwrap_or(i64::MAX))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;

        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await.map_err(cache_error)?;
        Ok(())
    }

    async fn invalidate_listings(&self) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let keys: Vec<String> = conn.smembers(LISTING_INDEX_KEY).await.map_err(cache_error)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if !keys.is_empty() {
            pipe.del(&keys).ignore();
        }
        pipe.del(LISTING_INDEX_KEY).ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(cache_error)?;

        tracing::debug!(pages = keys.len(), "Dropped cached ticket listings");
        Ok(())
    }
}
