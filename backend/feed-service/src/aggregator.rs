//! Feed aggregation
//!
//! A page is served from the cache when a live entry exists. Otherwise the
//! content service supplies the posts and the identity service, in one
//! batched call, supplies author display names; the two are merged and the
//! result cached.
//!
//! Content is essential: its failure fails the request. Identity is not:
//! when it fails or its circuit is open every post is kept and marked
//! `authorUnknown`.
//!
//! Downstream calls run as spawned tasks bounded by their own deadlines,
//! so a caller that goes away does not cancel them and the breakers still
//! see the outcome. The cache write happens on the request path and is
//! lost with an abandoned request.
//!
//! A page is only left in the cache when no write was applied while it was
//! being built; see [`WriteEpoch`].

use murmur_cache::{ttl, Cache, CacheKey};
use murmur_common::ServiceError;
use resilience::{presets, CallError, CallKind, ResilientCall, Served};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clients::{ClientError, ContentSource, IdentitySource, PostQuery};
use crate::context::RequestContext;
use crate::invalidation::{FeedInvalidator, WriteEpoch};
use crate::metrics::record_aggregation;
use crate::models::{FeedItem, FeedPage, IdentityMap, Pagination, PostRecord};

pub const CONTENT_DEPENDENCY: &str = "content-service";
pub const IDENTITY_DEPENDENCY: &str = "identity-service";

type PostsResult = Result<(Vec<PostRecord>, Option<String>), CallError<ClientError>>;

pub struct FeedAggregator {
    content: Arc<dyn ContentSource>,
    identity: Arc<dyn IdentitySource>,
    cache: Cache,
    cache_ttl: Duration,
    content_policy: ResilientCall,
    identity_policy: ResilientCall,
    write_epoch: WriteEpoch,
}

impl FeedAggregator {
    pub fn new(
        content: Arc<dyn ContentSource>,
        identity: Arc<dyn IdentitySource>,
        cache: Cache,
    ) -> Self {
        Self {
            content,
            identity,
            cache,
            cache_ttl: ttl::FEED,
            content_policy: ResilientCall::new(
                CONTENT_DEPENDENCY,
                presets::content_service_config(),
            ),
            identity_policy: ResilientCall::new(
                IDENTITY_DEPENDENCY,
                presets::identity_service_config(),
            ),
            write_epoch: WriteEpoch::new(),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_policies(mut self, content: ResilientCall, identity: ResilientCall) -> Self {
        self.content_policy = content;
        self.identity_policy = identity;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Invalidator over this aggregator's cache, sharing its write epoch
    pub fn invalidator(&self) -> FeedInvalidator {
        FeedInvalidator::new(self.cache.clone(), self.write_epoch.clone())
    }

    pub fn content_policy(&self) -> &ResilientCall {
        &self.content_policy
    }

    pub fn identity_policy(&self) -> &ResilientCall {
        &self.identity_policy
    }

    /// The shared feed; content is global so the key ignores the caller
    pub async fn get_feed(
        &self,
        ctx: &RequestContext,
        page: &Pagination,
    ) -> Result<FeedPage, ServiceError> {
        let key = CacheKey::feed_page(page.cursor.as_deref(), page.limit);
        let query = PostQuery {
            author_id: None,
            cursor: page.cursor.clone(),
            limit: page.limit,
        };
        self.aggregate("global", ctx, &key, query).await
    }

    /// One author's posts
    pub async fn get_author_feed(
        &self,
        ctx: &RequestContext,
        author_id: &str,
        page: &Pagination,
    ) -> Result<FeedPage, ServiceError> {
        let author_id = author_id.trim();
        if author_id.is_empty() {
            return Err(ServiceError::Validation("authorId is required".into()));
        }
        let key = CacheKey::author_feed_page(author_id, page.cursor.as_deref(), page.limit);
        let query = PostQuery {
            author_id: Some(author_id.to_string()),
            cursor: page.cursor.clone(),
            limit: page.limit,
        };
        self.aggregate("author", ctx, &key, query).await
    }

    async fn aggregate(
        &self,
        feed: &'static str,
        ctx: &RequestContext,
        key: &str,
        query: PostQuery,
    ) -> Result<FeedPage, ServiceError> {
        let epoch = self.write_epoch.current();
        if let Some(page) = self.cached(key).await {
            debug!(key = %key, "Feed served from cache");
            record_aggregation(feed, "cache_hit");
            return Ok(page);
        }

        // The author is known up front, so both lookups can start together
        let early_identity = query
            .author_id
            .clone()
            .map(|author| self.spawn_identity(ctx, vec![author]));
        let content = self.spawn_content(ctx, query);

        let (posts, next_cursor) = match join(content).await? {
            Ok(parts) => parts,
            Err(err) => {
                record_aggregation(feed, "failed");
                return Err(content_error(err));
            }
        };

        let identities = match early_identity {
            Some(task) => join(task).await?,
            None => {
                let ids = distinct_authors(&posts);
                if ids.is_empty() {
                    Served::Primary(IdentityMap::new())
                } else {
                    join(self.spawn_identity(ctx, ids)).await?
                }
            }
        };

        let degraded = identities.is_fallback();
        let identities = identities.into_inner();
        let items: Vec<FeedItem> = posts
            .into_iter()
            .map(|post| {
                let identity = identities.get(&post.author_id);
                FeedItem::merge(post, identity)
            })
            .collect();

        let unknown = items.iter().filter(|i| i.author_unknown).count();
        if unknown > 0 {
            info!(
                key = %key,
                posts = items.len(),
                unknown_authors = unknown,
                degraded,
                "Feed assembled without some author identities"
            );
        }

        let page = FeedPage { items, next_cursor };
        self.store(key, &page, epoch).await;
        record_aggregation(feed, if degraded { "degraded" } else { "aggregated" });
        Ok(page)
    }

    /// Cache `page` unless a write was applied since `epoch` was read
    async fn store(&self, key: &str, page: &FeedPage, epoch: u64) {
        if self.write_epoch.current() != epoch {
            debug!(key = %key, "Write applied during aggregation; page not cached");
            return;
        }
        if let Err(e) = self.cache.put(key, page, self.cache_ttl).await {
            warn!(key = %key, error = %e, "Failed to cache feed page");
            return;
        }
        // A purge that ran between the check and the put missed this entry
        if self.write_epoch.current() != epoch {
            debug!(key = %key, "Write applied while caching; dropping page");
            if let Err(e) = self.cache.invalidate(key).await {
                warn!(key = %key, error = %e, "Failed to drop stale feed page");
            }
        }
    }

    /// Cache failures degrade to a miss
    async fn cached(&self, key: &str) -> Option<FeedPage> {
        match self.cache.get::<FeedPage>(key).await {
            Ok(page) => page,
            Err(e) => {
                warn!(key = %key, error = %e, "Feed cache unavailable; recomputing");
                None
            }
        }
    }

    fn spawn_content(&self, ctx: &RequestContext, query: PostQuery) -> JoinHandle<PostsResult> {
        let source = self.content.clone();
        let policy = self.content_policy.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            policy
                .call(CallKind::IdempotentRead, || source.fetch_posts(&ctx, &query))
                .await
        })
    }

    fn spawn_identity(&self, ctx: &RequestContext, ids: Vec<String>) -> JoinHandle<Served<IdentityMap>> {
        let source = self.identity.clone();
        let policy = self.identity_policy.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            policy
                .call_with_fallback(
                    CallKind::IdempotentRead,
                    || source.lookup(&ctx, &ids),
                    IdentityMap::new,
                )
                .await
        })
    }
}

async fn join<T>(task: JoinHandle<T>) -> Result<T, ServiceError> {
    task.await
        .map_err(|e| ServiceError::Internal(format!("aggregation task failed: {}", e)))
}

/// Distinct author ids in first-seen order
fn distinct_authors(posts: &[PostRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    posts
        .iter()
        .filter(|p| seen.insert(p.author_id.as_str()))
        .map(|p| p.author_id.clone())
        .collect()
}

fn content_error(err: CallError<ClientError>) -> ServiceError {
    match err {
        CallError::ShortCircuited { dependency } => {
            ServiceError::ServiceUnavailable(format!("{} circuit open", dependency))
        }
        CallError::Failed {
            dependency,
            error: ClientError::NoInstance(_) | ClientError::Registry(_),
        } => ServiceError::ServiceUnavailable(format!("no healthy instance of {}", dependency)),
        other => ServiceError::Upstream(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(id: &str, author: &str) -> PostRecord {
        PostRecord {
            post_id: id.into(),
            author_id: author.into(),
            content: format!("post {}", id),
            created_at: Utc::now(),
            comments: vec![],
            like_count: 0,
        }
    }

    #[test]
    fn test_distinct_authors_keeps_first_seen_order() {
        let posts = vec![post("1", "b"), post("2", "a"), post("3", "b")];
        assert_eq!(distinct_authors(&posts), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_content_error_mapping() {
        let open = CallError::<ClientError>::ShortCircuited {
            dependency: "content-service".into(),
        };
        assert!(matches!(content_error(open), ServiceError::ServiceUnavailable(_)));

        let none = CallError::Failed {
            dependency: "content-service".into(),
            error: ClientError::NoInstance("content-service".into()),
        };
        assert!(matches!(content_error(none), ServiceError::ServiceUnavailable(_)));

        let broken = CallError::Failed {
            dependency: "content-service".into(),
            error: ClientError::Status(500),
        };
        assert!(matches!(content_error(broken), ServiceError::Upstream(_)));

        let slow = CallError::<ClientError>::TimedOut {
            dependency: "content-service".into(),
            after: Duration::from_secs(2),
        };
        assert!(matches!(content_error(slow), ServiceError::Upstream(_)));
    }
}
