//! Write-through invalidation
//!
//! The content service acknowledges each write by notifying the
//! aggregator, which purges every cached page the write can affect
//! instead of waiting for the TTL.
//!
//! Every applied write also advances a [`WriteEpoch`] shared with the
//! aggregator. A page whose aggregation spans an epoch change was built
//! from content that may predate the write, so it is never left cached.

use murmur_cache::{Cache, CacheKey};
use murmur_common::ServiceError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    PostCreated,
    CommentCreated,
    LikeChanged,
}

impl WriteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteKind::PostCreated => "post_created",
            WriteKind::CommentCreated => "comment_created",
            WriteKind::LikeChanged => "like_changed",
        }
    }
}

/// A write acknowledged by the content service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteEvent {
    pub kind: WriteKind,
    #[serde(default)]
    pub post_id: Option<String>,
    /// Author of the affected post (for comments and likes, the post's author)
    pub author_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationReport {
    pub removed: usize,
    pub prefixes: Vec<String>,
}

/// Number of writes applied by this process
#[derive(Debug, Clone, Default)]
pub struct WriteEpoch(Arc<AtomicU64>);

impl WriteEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct FeedInvalidator {
    cache: Cache,
    epoch: WriteEpoch,
}

impl FeedInvalidator {
    /// `epoch` must be the one the aggregator over `cache` checks; see
    /// `FeedAggregator::invalidator`
    pub fn new(cache: Cache, epoch: WriteEpoch) -> Self {
        Self { cache, epoch }
    }

    /// Cache prefixes a write makes stale: every shared page, and every
    /// page of the affected author's feed
    pub fn affected_prefixes(event: &WriteEvent) -> Vec<String> {
        vec![
            CacheKey::feed_prefix(),
            CacheKey::author_feed_prefix(&event.author_id),
        ]
    }

    pub async fn apply(&self, event: &WriteEvent) -> Result<InvalidationReport, ServiceError> {
        if event.author_id.trim().is_empty() {
            return Err(ServiceError::Validation("authorId is required".into()));
        }

        // Advance before purging so an aggregation racing the purge sees it
        let epoch = self.epoch.advance();
        let prefixes = Self::affected_prefixes(event);
        let mut removed = 0;
        for prefix in &prefixes {
            removed += self
                .cache
                .invalidate_by_prefix(prefix)
                .await
                .map_err(|e| ServiceError::ServiceUnavailable(format!("cache: {}", e)))?;
        }

        info!(
            kind = event.kind.as_str(),
            post_id = event.post_id.as_deref().unwrap_or("-"),
            author_id = %event.author_id,
            removed,
            epoch,
            "Feed cache invalidated after write"
        );
        Ok(InvalidationReport { removed, prefixes })
    }
}
