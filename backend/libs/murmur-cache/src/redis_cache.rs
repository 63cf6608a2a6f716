//! Redis-backed cache

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{CacheError, CacheMetrics, CacheOperations, CacheResult};

/// Keys fetched per SCAN round trip
const SCAN_BATCH: usize = 100;

/// Cache stored in Redis, expiry enforced by the server
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    metrics: CacheMetrics,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            metrics: CacheMetrics::new("redis"),
        }
    }

    /// Open a managed connection to `url`
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    fn observe<T>(&self, op: &'static str, result: redis::RedisResult<T>) -> CacheResult<T> {
        result.map_err(|e| {
            warn!(op, error = %e, "Redis cache error");
            self.metrics.record_error(op);
            CacheError::Redis(e)
        })
    }
}

/// Escape glob metacharacters so a prefix matches literally in SCAN MATCH
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

/// TTL in milliseconds, at least one
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait::async_trait]
impl CacheOperations for RedisCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = self.observe("get", conn.get(key).await)?;
        match value {
            Some(v) => {
                debug!(key = %key, "Cache hit");
                self.metrics.record_hit();
                Ok(Some(v))
            }
            None => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    async fn put_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        // PX keeps sub-second precision
        let result = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await;
        self.observe("put", result)?;

        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache set");
        self.metrics.record_write();
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let removed: usize = self.observe("invalidate", conn.del(key).await)?;

        debug!(key = %key, "Cache delete");
        self.metrics.record_invalidation(removed);
        Ok(())
    }

    async fn invalidate_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut conn = self.conn.clone();
        let pattern = escape_glob(prefix);
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            // Use SCAN instead of KEYS to avoid blocking
            let scanned = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async::<_, (u64, Vec<String>)>(&mut conn)
                .await;
            let (next_cursor, keys) = self.observe("invalidate", scanned)?;

            if !keys.is_empty() {
                let mut pipe = Pipeline::new();
                for key in &keys {
                    pipe.del(key);
                }
                let deleted = pipe.query_async::<_, Vec<usize>>(&mut conn).await;
                total_deleted += self.observe("invalidate", deleted)?.iter().sum::<usize>();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(prefix = %prefix, deleted = total_deleted, "Cache scan delete");
        self.metrics.record_invalidation(total_deleted);
        Ok(total_deleted)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("v1:feed:global:"), "v1:feed:global:*");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]*");
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::from_secs(30)), 30_000);
        assert_eq!(ttl_millis(Duration::ZERO), 1);
    }
}
