//! In-process TTL cache

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use murmur_common::clock::to_chrono;
use murmur_common::SharedClock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{CacheMetrics, CacheOperations, CacheResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    stored_at: DateTime<Utc>,
    ttl: chrono::Duration,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.stored_at > self.ttl
    }
}

/// Concurrent map of entries, expired lazily on read and by [`MemoryCache::sweep`]
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    clock: SharedClock,
    metrics: CacheMetrics,
}

impl MemoryCache {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            metrics: CacheMetrics::new("memory"),
        }
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
            self.metrics.record_expired(removed);
        }
        removed
    }

    /// Sweep on a fixed interval until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl CacheOperations for MemoryCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let now = self.clock.now();

        // The read guard must be released before remove_if touches the same shard
        let live = match self.entries.get(key) {
            None => {
                self.metrics.record_miss();
                return Ok(None);
            }
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
        };

        match live {
            Some(value) => {
                debug!(key = %key, "Cache hit");
                self.metrics.record_hit();
                Ok(Some(value))
            }
            None => {
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.metrics.record_expired(1);
                }
                debug!(key = %key, "Cache entry expired");
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    async fn put_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let entry = Entry {
            value,
            stored_at: self.clock.now(),
            ttl: to_chrono(ttl),
        };
        self.entries.insert(key.to_string(), entry);
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache set");
        self.metrics.record_write();
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let removed = usize::from(self.entries.remove(key).is_some());
        debug!(key = %key, "Cache delete");
        self.metrics.record_invalidation(removed);
        Ok(())
    }

    async fn invalidate_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.metrics.record_invalidation(removed);
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
