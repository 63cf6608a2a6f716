mod common;

use common::{ctx, policy, post, FakeContent, FakeIdentity, Gated};
use feed_service::invalidation::{WriteEvent, WriteKind};
use feed_service::{FeedAggregator, Pagination};
use murmur_cache::Cache;
use murmur_common::{system_clock, ManualClock, ServiceError};
use resilience::{CircuitState, ResilientCall};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

struct Harness {
    aggregator: FeedAggregator,
    content: Arc<FakeContent>,
    identity: Arc<FakeIdentity>,
    clock: ManualClock,
}

fn harness(content: FakeContent, identity: FakeIdentity) -> Harness {
    let clock = ManualClock::starting_now();
    let content = Arc::new(content);
    let identity = Arc::new(identity);
    let aggregator = FeedAggregator::new(
        content.clone(),
        identity.clone(),
        Cache::memory(clock.shared()),
    )
    .with_cache_ttl(Duration::from_secs(30))
    .with_policies(
        ResilientCall::with_clock("content-service", policy(3), clock.shared()),
        ResilientCall::with_clock("identity-service", policy(3), clock.shared()),
    );
    Harness {
        aggregator,
        content,
        identity,
        clock,
    }
}

fn first_page() -> Pagination {
    Pagination::new(None, Some(10))
}

fn standard() -> Harness {
    harness(
        FakeContent::with_posts(vec![
            post("p1", "alice"),
            post("p2", "bob"),
            post("p3", "alice"),
            post("p4", "carol"),
        ]),
        FakeIdentity::with_names(&[("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")]),
    )
}

#[tokio::test]
async fn test_merges_display_names_with_one_batched_lookup() {
    let h = standard();

    let page = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();

    assert_eq!(page.items.len(), 4);
    assert_eq!(page.items[0].author_display_name.as_deref(), Some("Alice"));
    assert_eq!(page.items[1].author_display_name.as_deref(), Some("Bob"));
    assert!(page.items.iter().all(|i| !i.author_unknown));

    // One identity call covering each distinct author once
    assert_eq!(h.identity.calls(), 1);
    assert_eq!(
        h.identity.batches.lock()[0],
        vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
    );
}

#[tokio::test]
async fn test_second_request_within_ttl_is_identical_and_makes_no_calls() {
    let h = standard();

    let first = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    let second = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();

    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(h.content.calls(), 1);
    assert_eq!(h.identity.calls(), 1);
}

#[tokio::test]
async fn test_cache_ttl_timeline() {
    let h = standard();

    // t=0 populates
    h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    assert_eq!(h.content.calls(), 1);

    // t=10 cached
    h.clock.advance(Duration::from_secs(10));
    h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    assert_eq!(h.content.calls(), 1);
    assert_eq!(h.identity.calls(), 1);

    // t=31 recomputed
    h.clock.advance(Duration::from_secs(21));
    h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    assert_eq!(h.content.calls(), 2);
    assert_eq!(h.identity.calls(), 2);
}

#[tokio::test]
async fn test_identity_outage_keeps_every_post() {
    let h = standard();
    h.identity.failing.store(true, Ordering::SeqCst);

    let page = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();

    assert_eq!(page.items.len(), 4);
    assert!(page
        .items
        .iter()
        .all(|i| i.author_unknown && i.author_display_name.is_none()));
    assert_eq!(page.items[0].content, "content of p1");
}

#[tokio::test]
async fn test_unmatched_author_is_marked_unknown() {
    let h = harness(
        FakeContent::with_posts(vec![post("p1", "alice"), post("p2", "ghost")]),
        FakeIdentity::with_names(&[("alice", "Alice")]),
    );

    let page = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();

    assert!(!page.items[0].author_unknown);
    assert!(page.items[1].author_unknown);
    assert_eq!(page.items[1].author_display_name, None);
}

#[tokio::test]
async fn test_identity_circuit_opens_and_stops_calling() {
    let h = standard();
    h.identity.failing.store(true, Ordering::SeqCst);

    // Distinct pages so each request misses the cache
    for limit in 1..=3 {
        h.aggregator
            .get_feed(&ctx(), &Pagination::new(None, Some(limit)))
            .await
            .unwrap();
    }
    assert_eq!(h.aggregator.identity_policy().state(), CircuitState::Open);
    assert_eq!(h.identity.calls(), 3);

    let page = h
        .aggregator
        .get_feed(&ctx(), &Pagination::new(None, Some(4)))
        .await
        .unwrap();
    assert_eq!(h.identity.calls(), 3, "open circuit must not call identity");
    assert!(page.items.iter().all(|i| i.author_unknown));
    // Content circuit is independent
    assert_eq!(h.aggregator.content_policy().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_content_failure_is_upstream_error_then_unavailable_when_open() {
    let h = standard();
    h.content.failing.store(true, Ordering::SeqCst);

    for _ in 0..3 {
        let err = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)), "{err:?}");
    }
    assert_eq!(h.identity.calls(), 0);

    let err = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap_err();
    assert!(matches!(err, ServiceError::ServiceUnavailable(_)));
    assert_eq!(h.content.calls(), 3);

    // After cooldown a single trial closes the circuit again
    h.content.failing.store(false, Ordering::SeqCst);
    h.clock.advance(Duration::from_secs(30));
    let page = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    assert_eq!(page.items.len(), 4);
    assert_eq!(h.aggregator.content_policy().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_failed_aggregation_is_not_cached() {
    let h = standard();
    h.content.failing.store(true, Ordering::SeqCst);
    assert!(h.aggregator.get_feed(&ctx(), &first_page()).await.is_err());

    h.content.failing.store(false, Ordering::SeqCst);
    assert_eq!(
        h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap().items.len(),
        4
    );
    assert_eq!(h.content.calls(), 2);
}

#[tokio::test]
async fn test_empty_page_skips_identity() {
    let h = harness(FakeContent::default(), FakeIdentity::default());

    let page = h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();

    assert!(page.items.is_empty());
    assert_eq!(h.identity.calls(), 0);
}

#[tokio::test]
async fn test_pagination_passes_cursor_and_returns_next() {
    let h = standard();
    *h.content.next_cursor.lock() = Some("c-2".to_string());

    let page = h
        .aggregator
        .get_feed(&ctx(), &Pagination::new(Some("c-1".into()), Some(4)))
        .await
        .unwrap();

    assert_eq!(page.next_cursor.as_deref(), Some("c-2"));
    let query = h.content.queries.lock()[0].clone();
    assert_eq!(query.cursor.as_deref(), Some("c-1"));
    assert_eq!(query.limit, 4);
    assert_eq!(query.author_id, None);
}

#[tokio::test]
async fn test_author_feed_filters_and_is_cached_separately() {
    let h = standard();

    let page = h
        .aggregator
        .get_author_feed(&ctx(), "alice", &first_page())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.items.iter().all(|i| i.author_id == "alice"));
    assert_eq!(h.identity.batches.lock()[0], vec!["alice".to_string()]);

    h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    assert_eq!(h.content.calls(), 2);

    let err = h
        .aggregator
        .get_author_feed(&ctx(), " ", &first_page())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_write_invalidation_forces_recompute() {
    let h = standard();
    let invalidator = h.aggregator.invalidator();

    h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    h.aggregator
        .get_author_feed(&ctx(), "bob", &first_page())
        .await
        .unwrap();
    h.aggregator
        .get_author_feed(&ctx(), "carol", &first_page())
        .await
        .unwrap();
    assert_eq!(h.content.calls(), 3);

    let report = invalidator
        .apply(&WriteEvent {
            kind: WriteKind::PostCreated,
            post_id: Some("p5".into()),
            author_id: "bob".into(),
        })
        .await
        .unwrap();
    assert_eq!(report.removed, 2);

    h.aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    h.aggregator
        .get_author_feed(&ctx(), "bob", &first_page())
        .await
        .unwrap();
    h.aggregator
        .get_author_feed(&ctx(), "carol", &first_page())
        .await
        .unwrap();
    // Global and bob recomputed; carol still cached
    assert_eq!(h.content.calls(), 5);
}

#[tokio::test]
async fn test_page_built_across_a_write_is_not_cached() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let content = Arc::new(Gated::new(
        FakeContent::with_posts(vec![post("p1", "alice")]),
        entered.clone(),
        release.clone(),
    ));
    let identity = Arc::new(FakeIdentity::with_names(&[("alice", "Alice")]));
    let aggregator = Arc::new(FeedAggregator::new(
        content.clone(),
        identity,
        Cache::memory(system_clock()),
    ));

    // First aggregation reads the page, then parks before merging
    let in_flight = tokio::spawn({
        let aggregator = aggregator.clone();
        async move { aggregator.get_feed(&ctx(), &first_page()).await }
    });
    entered.notified().await;

    content.inner.posts.lock().push(post("p2", "alice"));
    aggregator
        .invalidator()
        .apply(&WriteEvent {
            kind: WriteKind::PostCreated,
            post_id: Some("p2".into()),
            author_id: "alice".into(),
        })
        .await
        .unwrap();
    release.notify_one();

    let before_write = in_flight.await.unwrap().unwrap();
    assert_eq!(before_write.items.len(), 1);

    release.notify_one();
    let after_write = aggregator.get_feed(&ctx(), &first_page()).await.unwrap();
    assert_eq!(after_write.items.len(), 2);
    assert_eq!(content.inner.calls(), 2);
}

#[tokio::test]
async fn test_author_feed_runs_content_and_identity_concurrently() {
    let content_entered = Arc::new(Notify::new());
    let identity_entered = Arc::new(Notify::new());
    let identity_release = Arc::new(Notify::new());

    // Content cannot return until identity has started
    let content = Arc::new(Gated::new(
        FakeContent::with_posts(vec![post("p1", "alice"), post("p2", "bob"), post("p3", "alice")]),
        content_entered.clone(),
        identity_entered.clone(),
    ));
    let identity = Arc::new(Gated::new(
        FakeIdentity::with_names(&[("alice", "Alice")]),
        identity_entered.clone(),
        identity_release.clone(),
    ));
    let aggregator = Arc::new(FeedAggregator::new(
        content.clone(),
        identity.clone(),
        Cache::memory(system_clock()),
    ));

    let request = tokio::spawn({
        let aggregator = aggregator.clone();
        async move { aggregator.get_author_feed(&ctx(), "alice", &first_page()).await }
    });

    // Let content come back first; identity is still parked
    content_entered.notified().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!request.is_finished());
    identity_release.notify_one();

    let page = tokio::time::timeout(Duration::from_secs(5), request)
        .await
        .expect("author feed did not complete")
        .unwrap()
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page
        .items
        .iter()
        .all(|i| i.author_display_name.as_deref() == Some("Alice") && !i.author_unknown));
    assert_eq!(content.inner.calls(), 1);
    assert_eq!(identity.inner.calls(), 1);
}
