//! Cache-aside read path tests

use std::sync::atomic::Ordering;
use std::sync::Arc;
use surge::memory::{MemoryCache, MemoryStorage};
use surge::prelude::*;

struct Fixture {
    storage: Arc<MemoryStorage>,
    cache: Arc<MemoryCache>,
    store_breaker: Arc<CircuitBreaker>,
    cache_breaker: Arc<CircuitBreaker>,
    reader: CacheAside,
}

fn fixture() -> Fixture {
    let storage = Arc::new(MemoryStorage::new());
    let cache = Arc::new(MemoryCache::new());
    let registry = BreakerRegistry::default();
    let store_breaker = registry.register(
        "postgres",
        CircuitBreakerConfig::default().with_failure_threshold(2),
    );
    let cache_breaker = registry.register(
        "redis",
        CircuitBreakerConfig::default()
            .with_failure_threshold(2)
            .with_open_duration_ms(60_000),
    );
    let reader = CacheAside::new(
        storage.clone(),
        cache.clone(),
        store_breaker.clone(),
        cache_breaker.clone(),
        CacheConfig::default().with_ttl_secs(30),
    );
    Fixture {
        storage,
        cache,
        store_breaker,
        cache_breaker,
        reader,
    }
}

async fn seed(storage: &MemoryStorage) -> UserRecord {
    storage
        .bulk_insert(vec![NewUser::new("Grace", "grace@example.com")])
        .await
        .unwrap()
        .remove(0)
}

#[tokio::test]
async fn test_miss_populates_then_hits() {
    let f = fixture();
    let grace = seed(&f.storage).await;
    let key = f.reader.key(grace.id);

    assert_eq!(f.cache.peek(&key), None);
    assert_eq!(f.reader.get_user(grace.id).await.unwrap(), Some(grace.clone()));
    assert!(f.cache.peek(&key).is_some());

    // Served from cache even with the store down.
    f.storage.set_unavailable(true);
    assert_eq!(f.reader.get_user(grace.id).await.unwrap(), Some(grace));
    assert_eq!(f.store_breaker.state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_missing_user_is_not_cached() {
    let f = fixture();

    assert_eq!(f.reader.get_user(UserId(404)).await.unwrap(), None);
    assert_eq!(f.cache.stats().sets.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_cache_outage_degrades_to_store_reads() {
    let f = fixture();
    let grace = seed(&f.storage).await;
    f.cache.set_unavailable(true);

    for _ in 0..5 {
        assert_eq!(f.reader.get_user(grace.id).await.unwrap(), Some(grace.clone()));
    }

    // get + set failures opened the cache circuit; later reads skip the cache.
    assert_eq!(f.cache_breaker.state(), BreakerState::Open);
    let gets = f.cache.stats().gets.load(Ordering::Relaxed);
    f.reader.get_user(grace.id).await.unwrap();
    assert_eq!(f.cache.stats().gets.load(Ordering::Relaxed), gets);
}

#[tokio::test]
async fn test_store_outage_fails_fast_after_threshold() {
    let f = fixture();
    f.storage.set_unavailable(true);

    for _ in 0..2 {
        let err = f.reader.get_user(UserId(1)).await.unwrap_err();
        assert!(matches!(err, SurgeError::Storage(_)));
    }
    let err = f.reader.get_user(UserId(1)).await.unwrap_err();
    assert_eq!(
        err,
        SurgeError::CircuitOpen {
            dependency: "postgres".to_string()
        }
    );
}

#[tokio::test]
async fn test_undecodable_entry_is_replaced() {
    let f = fixture();
    let grace = seed(&f.storage).await;
    let key = f.reader.key(grace.id);
    f.cache.set(&key, "not json".to_string(), 30).await.unwrap();

    assert_eq!(f.reader.get_user(grace.id).await.unwrap(), Some(grace.clone()));
    let cached: UserRecord = serde_json::from_str(&f.cache.peek(&key).unwrap()).unwrap();
    assert_eq!(cached, grace);
}

#[tokio::test]
async fn test_invalidate_after_update() {
    let f = fixture();
    let grace = seed(&f.storage).await;
    f.reader.get_user(grace.id).await.unwrap();

    f.storage
        .update(grace.id, UserPatch::email("hopper@example.com"))
        .await
        .unwrap();
    f.reader.invalidate(grace.id).await.unwrap();

    let fresh = f.reader.get_user(grace.id).await.unwrap().unwrap();
    assert_eq!(fresh.email, "hopper@example.com");
}
