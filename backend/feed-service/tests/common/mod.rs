//! Shared fakes for feed-service tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use crypto_core::CorrelationId;
use feed_service::clients::{ClientError, ContentSource, IdentitySource, PostQuery};
use feed_service::models::{Identity, IdentityMap, PostRecord};
use feed_service::RequestContext;
use parking_lot::Mutex;
use resilience::{CircuitBreakerConfig, RetryConfig, ServiceConfig, TimeoutConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub fn ctx() -> RequestContext {
    RequestContext::new("user-1", CorrelationId::generate())
}

pub fn post(id: &str, author: &str) -> PostRecord {
    PostRecord {
        post_id: id.to_string(),
        author_id: author.to_string(),
        content: format!("content of {}", id),
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        comments: vec![],
        like_count: 1,
    }
}

/// Tight policy: no retries, small threshold
pub fn policy(threshold: u32) -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig::from_millis(200),
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: threshold,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        },
        retry: Some(RetryConfig::none()),
    }
}

#[derive(Default)]
pub struct FakeContent {
    pub posts: Mutex<Vec<PostRecord>>,
    pub next_cursor: Mutex<Option<String>>,
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
    pub queries: Mutex<Vec<PostQuery>>,
}

impl FakeContent {
    pub fn with_posts(posts: Vec<PostRecord>) -> Self {
        let fake = Self::default();
        *fake.posts.lock() = posts;
        fake
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContentSource for FakeContent {
    async fn fetch_posts(
        &self,
        _ctx: &RequestContext,
        query: &PostQuery,
    ) -> Result<(Vec<PostRecord>, Option<String>), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::Status(500));
        }
        let posts: Vec<PostRecord> = self
            .posts
            .lock()
            .iter()
            .filter(|p| query.author_id.as_ref().map_or(true, |a| &p.author_id == a))
            .cloned()
            .collect();
        Ok((posts, self.next_cursor.lock().clone()))
    }
}

#[derive(Default)]
pub struct FakeIdentity {
    pub names: HashMap<String, String>,
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl FakeIdentity {
    pub fn with_names(names: &[(&str, &str)]) -> Self {
        Self {
            names: names
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IdentitySource for FakeIdentity {
    async fn lookup(&self, _ctx: &RequestContext, ids: &[String]) -> Result<IdentityMap, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().push(ids.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".into()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.names.get(id).map(|name| {
                    (
                        id.clone(),
                        Identity {
                            display_name: name.clone(),
                        },
                    )
                })
            })
            .collect())
    }
}

/// Wraps a fake: each call takes the inner answer, signals `entered`, then
/// parks until `release` fires. The answer is fixed before parking, so
/// writes made while a call is parked are not visible to it.
pub struct Gated<T> {
    pub inner: T,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl<T> Gated<T> {
    pub fn new(inner: T, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            inner,
            entered,
            release,
        }
    }

    async fn park(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[async_trait::async_trait]
impl ContentSource for Gated<FakeContent> {
    async fn fetch_posts(
        &self,
        ctx: &RequestContext,
        query: &PostQuery,
    ) -> Result<(Vec<PostRecord>, Option<String>), ClientError> {
        let answer = self.inner.fetch_posts(ctx, query).await;
        self.park().await;
        answer
    }
}

#[async_trait::async_trait]
impl IdentitySource for Gated<FakeIdentity> {
    async fn lookup(&self, ctx: &RequestContext, ids: &[String]) -> Result<IdentityMap, ClientError> {
        let answer = self.inner.lookup(ctx, ids).await;
        self.park().await;
        answer
    }
}
