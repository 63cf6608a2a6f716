use murmur_cache::{Cache, CacheKey, MemoryCache};
use murmur_common::ManualClock;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_feed_page_lifecycle_with_thirty_second_ttl() {
    let clock = ManualClock::starting_now();
    let cache = Cache::memory(clock.shared());
    let key = CacheKey::feed_page(None, 20);
    let ttl = Duration::from_secs(30);

    // t=0 populates
    cache.put(&key, &vec!["p1", "p2"], ttl).await.unwrap();

    // t=10 served from cache
    clock.advance(Duration::from_secs(10));
    let cached: Option<Vec<String>> = cache.get(&key).await.unwrap();
    assert_eq!(cached, Some(vec!["p1".to_string(), "p2".to_string()]));

    // t=31 gone
    clock.advance(Duration::from_secs(21));
    let cached: Option<Vec<String>> = cache.get(&key).await.unwrap();
    assert!(cached.is_none());
}

#[tokio::test]
async fn test_background_sweeper_evicts_expired_entries() {
    let clock = ManualClock::starting_now();
    let memory = Arc::new(MemoryCache::new(clock.shared()));
    let handle = memory.spawn_sweeper(Duration::from_millis(10));
    let cache = Cache::new(memory.clone());

    cache
        .put("v1:feed:global:-:5", &1u8, Duration::from_secs(1))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(2));

    let mut swept = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if memory.is_empty() {
            swept = true;
            break;
        }
    }
    assert!(swept, "sweeper should remove the expired entry");
    handle.abort();
}

#[tokio::test]
async fn test_write_invalidation_purges_every_feed_page() {
    let cache = Cache::memory(ManualClock::starting_now().shared());
    let ttl = Duration::from_secs(30);
    for cursor in [None, Some("a"), Some("b")] {
        cache
            .put(&CacheKey::feed_page(cursor, 10), &"page", ttl)
            .await
            .unwrap();
    }
    cache
        .put(&CacheKey::author_feed_page("7", None, 10), &"mine", ttl)
        .await
        .unwrap();

    let removed = cache
        .invalidate_by_prefix(&CacheKey::feed_prefix())
        .await
        .unwrap();

    assert_eq!(removed, 3);
    assert!(cache
        .contains(&CacheKey::author_feed_page("7", None, 10))
        .await
        .unwrap());
}
