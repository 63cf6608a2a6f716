//! Murmur caching layer
//!
//! Memoizes serialized values under versioned keys with a per-entry TTL:
//! - Unified key schema with versioning (see [`CacheKey`])
//! - Lazy expiry on read plus a periodic sweep for the in-memory backend
//! - SCAN-based prefix invalidation (no blocking KEYS) for Redis
//! - Metrics integration
//!
//! An entry is never returned once `now - stored_at > ttl`. The cache is an
//! optimisation only: an empty cache must still yield correct results.

mod error;
mod keys;
mod memory;
mod metrics;
mod redis_cache;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use memory::MemoryCache;
pub use metrics::CacheMetrics;
pub use redis_cache::RedisCache;

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default TTL values
pub mod ttl {
    use std::time::Duration;

    pub const FEED: Duration = Duration::from_secs(30);
}

/// Storage backend operations
///
/// Values are opaque strings; typed access goes through [`Cache`].
#[async_trait::async_trait]
pub trait CacheOperations: Send + Sync {
    /// Get a live value, `None` on miss or expiry
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value that expires after `ttl`
    async fn put_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Remove a single key
    async fn invalidate(&self, key: &str) -> CacheResult<()>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn invalidate_by_prefix(&self, prefix: &str) -> CacheResult<usize>;

    /// Label used in metrics and logs
    fn backend_name(&self) -> &'static str;
}

/// Typed cache handle shared across request handlers
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheOperations>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheOperations>) -> Self {
        Self { backend }
    }

    /// In-memory cache reading time from `clock`
    pub fn memory(clock: murmur_common::SharedClock) -> Self {
        Self::new(Arc::new(MemoryCache::new(clock)))
    }

    pub fn backend(&self) -> &Arc<dyn CacheOperations> {
        &self.backend
    }

    /// Get and deserialize a value
    ///
    /// An entry that no longer deserializes is treated as a miss and removed.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(data) = self.backend.get_raw(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<T>(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache deserialization failed");
                CacheMetrics::new(self.backend.backend_name()).record_error("deserialize");
                // Delete corrupted cache entry
                let _ = self.backend.invalidate(key).await;
                Ok(None)
            }
        }
    }

    /// Serialize and store a value
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let data = serde_json::to_string(value)?;
        self.backend.put_raw(key, data, ttl).await
    }

    /// Whether a live entry exists under `key`
    pub async fn contains(&self, key: &str) -> CacheResult<bool> {
        Ok(self.backend.get_raw(key).await?.is_some())
    }

    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.backend.invalidate(key).await
    }

    pub async fn invalidate_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let removed = self.backend.invalidate_by_prefix(prefix).await?;
        debug!(prefix = %prefix, removed, "Cache prefix invalidation");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_common::ManualClock;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Page {
        items: Vec<u32>,
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let cache = Cache::memory(ManualClock::starting_now().shared());
        let page = Page { items: vec![1, 2] };

        cache.put("v1:feed:global:-:2", &page, ttl::FEED).await.unwrap();

        let cached: Option<Page> = cache.get("v1:feed:global:-:2").await.unwrap();
        assert_eq!(cached, Some(page));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_miss_and_removed() {
        let cache = Cache::memory(ManualClock::starting_now().shared());
        cache
            .backend()
            .put_raw("k", "not json".to_string(), ttl::FEED)
            .await
            .unwrap();

        let cached: Option<Page> = cache.get("k").await.unwrap();
        assert!(cached.is_none());
        assert!(!cache.contains("k").await.unwrap());
    }
}
