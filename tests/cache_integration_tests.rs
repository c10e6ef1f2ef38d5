//! Integration Tests for the Cache API
//!
//! Exercises the public surface end to end: eviction, TTL expiry (lazy and
//! swept), clearing, closing and concurrent access.

use std::sync::Arc;
use std::time::Duration;

use mini_cache::{Cache, CacheBuilder, CacheConfig, CacheError, MissReason, PolicyKind, TimeUnit};
use tokio::time;
use tokio_test::{assert_err, assert_ok};

const LONG: Duration = Duration::from_secs(300);

// == Helper Functions ==

/// Builds a cache whose sweeper stays out of the way, so misses are decided
/// by lazy expiry alone.
fn create_cache<V>(policy: PolicyKind, capacity: usize) -> Cache<&'static str, V>
where
    V: Clone + Send + 'static,
{
    CacheBuilder::new()
        .policy(policy)
        .capacity(capacity)
        .sweep_interval(Duration::from_secs(3600))
        .build()
        .unwrap()
}

async fn assert_miss<V: std::fmt::Debug + Clone + Send + 'static>(
    cache: &Cache<&'static str, V>,
    key: &'static str,
    reason: MissReason,
) {
    let err = assert_err!(cache.get(&key).await);
    assert_eq!(err, CacheError::NotFound { reason }, "key {}", key);
}

// == Eviction Tests ==

#[tokio::test]
async fn test_lru_evicts_least_recently_used() {
    let cache = create_cache(PolicyKind::Lru, 2);

    assert_ok!(cache.put("a", 1, LONG).await);
    assert_ok!(cache.put("b", 2, LONG).await);
    assert_eq!(cache.get(&"a").await, Ok(1));
    assert_ok!(cache.put("c", 3, LONG).await);

    assert_miss(&cache, "b", MissReason::Absent).await;
    assert_eq!(cache.get(&"a").await, Ok(1));
    assert_eq!(cache.get(&"c").await, Ok(3));
    cache.close().await;
}

#[tokio::test]
async fn test_lfu_evicts_least_frequently_used() {
    let cache = create_cache(PolicyKind::Lfu, 2);

    assert_ok!(cache.put("x", 10, LONG).await);
    assert_ok!(cache.put("y", 20, LONG).await);
    assert_eq!(cache.get(&"x").await, Ok(10));
    assert_eq!(cache.get(&"x").await, Ok(10));
    assert_ok!(cache.put("z", 30, LONG).await);

    assert_miss(&cache, "y", MissReason::Absent).await;
    assert_eq!(cache.get(&"x").await, Ok(10));
    assert_eq!(cache.get(&"z").await, Ok(30));
    cache.close().await;
}

#[tokio::test]
async fn test_capacity_bound_holds() {
    for policy in [PolicyKind::Lru, PolicyKind::Lfu] {
        let cache: Cache<u32, u32> = Cache::new(policy, 10).unwrap();
        for key in 0..100 {
            assert_ok!(cache.put(key, key, LONG).await);
            assert!(cache.size() <= 10);
        }
        assert_eq!(cache.size(), 10);
        cache.close().await;
    }
}

// == TTL Tests ==

#[tokio::test(start_paused = true)]
async fn test_lazy_expiry() {
    for policy in [PolicyKind::Lru, PolicyKind::Lfu] {
        let cache = create_cache(policy, 10);
        assert_ok!(cache.put("k", "v", Duration::from_secs(1)).await);

        time::advance(Duration::from_millis(1001)).await;

        assert_miss(&cache, "k", MissReason::Expired).await;
        assert!(!cache.contains_key(&"k"));
        assert_miss(&cache, "k", MissReason::Absent).await;
        cache.close().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_contains_key_does_not_check_expiry() {
    let cache = create_cache(PolicyKind::Lru, 10);
    assert_ok!(cache.put_with_unit("k", "v", 500, TimeUnit::Milliseconds).await);

    time::advance(Duration::from_millis(600)).await;

    assert!(cache.contains_key(&"k"));
    assert_eq!(cache.size(), 1);
    cache.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_proactive_sweep_without_reads() {
    for policy in [PolicyKind::Lru, PolicyKind::Lfu] {
        let cache: Cache<u32, u32> = Cache::new(policy, 100).unwrap();
        for key in 0..20 {
            assert_ok!(cache.put(key, key, Duration::from_secs(1)).await);
        }
        assert_eq!(cache.size(), 20);

        // Paused clock: sleeping lets the sweeper tick
        for _ in 0..3 {
            time::sleep(Duration::from_secs(1)).await;
        }

        assert_eq!(cache.size(), 0, "{} cache should be empty after a sweep", policy);
        cache.close().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_update_does_not_refresh_ttl() {
    for policy in [PolicyKind::Lru, PolicyKind::Lfu] {
        let cache = create_cache(policy, 10);
        assert_ok!(cache.put("k", 1, Duration::from_secs(2)).await);

        time::advance(Duration::from_millis(1500)).await;
        assert_ok!(cache.put("k", 2, Duration::from_secs(60)).await);
        assert_eq!(cache.get(&"k").await, Ok(2));

        time::advance(Duration::from_millis(600)).await;
        assert_miss(&cache, "k", MissReason::Expired).await;
        cache.close().await;
    }
}

// == Clear / Close Tests ==

#[tokio::test]
async fn test_clear_is_idempotent() {
    let cache = create_cache(PolicyKind::Lfu, 10);
    assert_ok!(cache.put("a", 1, LONG).await);
    assert_ok!(cache.put("b", 2, LONG).await);

    assert_ok!(cache.clear().await);
    assert_eq!(cache.size(), 0);
    assert_ok!(cache.clear().await);
    assert_eq!(cache.size(), 0);
    assert_ok!(cache.check_invariants().await);

    assert_ok!(cache.put("c", 3, LONG).await);
    assert_eq!(cache.get(&"c").await, Ok(3));
    cache.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent_and_fails_fast() {
    let cache = create_cache(PolicyKind::Lru, 10);
    assert_ok!(cache.put("a", 1, LONG).await);

    cache.close().await;
    cache.close().await;

    assert!(cache.is_closed());
    assert_eq!(cache.get(&"a").await, Err(CacheError::Closed));
    assert_eq!(cache.put("a", 2, LONG).await, Err(CacheError::Closed));
    assert_eq!(cache.remove(&"a").await, Err(CacheError::Closed));
    assert_eq!(cache.size(), 0);
}

#[tokio::test]
async fn test_invalid_configuration() {
    let result = Cache::<u32, u32>::from_config(&CacheConfig {
        capacity: 0,
        ..CacheConfig::default()
    });
    assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));

    assert!(matches!(
        "mru".parse::<PolicyKind>(),
        Err(CacheError::InvalidConfiguration(_))
    ));
}

// == Concurrency Tests ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_keep_structure_consistent() {
    for policy in [PolicyKind::Lru, PolicyKind::Lfu] {
        let cache: Arc<Cache<u32, u32>> = Arc::new(Cache::new(policy, 16).unwrap());

        let mut handles = Vec::new();
        for worker in 0..8u32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..200u32 {
                    let key = (worker * 7 + i) % 40;
                    match i % 4 {
                        0 | 1 => cache.put(key, i, LONG).await.unwrap(),
                        2 => {
                            let _ = cache.get(&key).await;
                        }
                        _ => {
                            cache.remove(&key).await.unwrap();
                        }
                    }
                    assert!(cache.size() <= 16);
                }
            }));
        }
        for handle in handles {
            handle.await.expect("worker panicked");
        }

        assert_ok!(cache.check_invariants().await);
        assert!(cache.size() <= 16);
        cache.close().await;
    }
}
