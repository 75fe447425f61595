//! Failure modes: store outages, lock contention bounds, loader errors and
//! the caching kill switch.

use std::sync::Arc;
use std::time::Duration;

use cacher_test_utils::assertions;
use cacher_test_utils::fixtures::{self, test_config, Product, TestCache};
use cacher_test_utils::{CacheItem, CachedValue, FakeSource, SourceError};
use cacher_storage::ReadSource;

// ============================================================================
// STORE OUTAGES
// ============================================================================

#[tokio::test]
async fn test_data_store_outage_fails_closed() {
    let cache = TestCache::new();
    let key = cache.namespace().object_by_id("product", 1);
    let source = FakeSource::new();
    source.insert(key.clone(), fixtures::product(1));
    cache.data.set_offline(true);

    assertions::assert_transport_failure(&cache.manager.get_or_lock(&key).await);
    let err = cache
        .read_through()
        .fetch(&key, || source.load(&key))
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Cache(ref e) if e.is_transport_failure()));
    // The source of truth is shielded while the cache is down.
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_lock_store_outage_fails_closed() {
    let cache = TestCache::new();
    cache.locks.set_offline(true);
    let key = cache.namespace().key("anything");
    assertions::assert_transport_failure(&cache.manager.get_or_lock(&key).await);

    // Hits do not touch the lock store.
    cache
        .manager
        .store_without_blocking(CacheItem::new(&key, "v"))
        .await
        .unwrap();
    assertions::assert_hit_bytes(&cache.manager.get_or_lock(&key).await.unwrap(), b"v");
}

#[tokio::test]
async fn test_write_back_failure_does_not_fail_read() {
    let cache = TestCache::new();
    let key = cache.namespace().object_by_id("product", 2);
    let source = FakeSource::new();
    source.insert(key.clone(), fixtures::product(2));

    let rt = cache.read_through();
    let data = &cache.data;
    let (source_ref, key_ref) = (&source, &key);
    let read = rt
        .fetch(&key, move || async move {
            // Outage starts after the lookup, before write-back.
            data.set_offline(true);
            source_ref.load(key_ref).await
        })
        .await
        .unwrap();
    assert_eq!(read.into_value(), Some(fixtures::product(2)));
    cache.data.set_offline(false);
    assert!(cache.data.is_empty().await);
    assert!(cache.locks.is_empty().await);
}

// ============================================================================
// LOCK CONTENTION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_waiter_gives_up_after_wait_bound() {
    let cache = TestCache::with_config(test_config().with_lock_wait_time(Duration::from_millis(300)));
    let key = cache.namespace().key("slow");
    let holder = cache.manager.get_or_lock(&key).await.unwrap();
    assertions::assert_populate_held(&holder);

    let started = tokio::time::Instant::now();
    assertions::assert_lock_failure(&cache.manager.get_or_lock(&key).await);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(300));
    assert!(waited < Duration::from_millis(400));
    assert_eq!(cache.manager.stats().lock_timeouts, 1);
    drop(holder);
}

#[tokio::test(start_paused = true)]
async fn test_crashed_holder_lease_elapses() {
    let cache = TestCache::with_config(
        test_config()
            .with_lock_lease(Duration::from_millis(250))
            .with_lock_wait_time(Duration::from_secs(2)),
    );
    let key = cache.namespace().key("orphan");
    let holder = cache.manager.get_or_lock(&key).await.unwrap();
    // Simulate a crash: the guard is never released.
    std::mem::forget(holder);

    let lookup = cache.manager.get_or_lock(&key).await.unwrap();
    assertions::assert_populate_held(&lookup);
}

#[tokio::test]
async fn test_loader_error_releases_lock_for_next_caller() {
    let cache = TestCache::new();
    let key = cache.namespace().object_by_id("product", 3);
    let source: FakeSource<Product> = FakeSource::new();
    source.insert(key.clone(), fixtures::product(3));
    source.set_failing(true);

    let rt = cache.read_through();
    let err = rt.fetch(&key, || source.load(&key)).await.unwrap_err();
    assert!(matches!(err, SourceError::Unavailable));
    assert!(cache.locks.is_empty().await);
    assert!(cache.data.is_empty().await);

    source.set_failing(false);
    let read = rt.fetch(&key, || source.load(&key)).await.unwrap();
    assert_eq!(read.source(), ReadSource::Source);
    assert_eq!(source.calls(), 2);
}

// ============================================================================
// CACHING DISABLED
// ============================================================================

#[tokio::test]
async fn test_disabled_caching_always_reads_source() {
    let cache = TestCache::with_config(test_config().with_caching_disabled(true));
    let key = cache.namespace().object_by_id("product", 4);
    let source = Arc::new(FakeSource::new());
    source.insert(key.clone(), fixtures::product(4));

    let rt = cache.read_through();
    for _ in 0..3 {
        let read = rt.fetch(&key, || source.load(&key)).await.unwrap();
        assert_eq!(read.source(), ReadSource::Bypass);
    }
    assert_eq!(source.calls(), 3);
    assert!(cache.data.is_empty().await);
    assert!(cache.locks.is_empty().await);

    // Counters and invalidation keep working.
    assert_eq!(
        cache
            .manager
            .increase_cached_value_by_one(&cache.namespace().counter("login", "u"))
            .await
            .unwrap(),
        1
    );
    assert_eq!(cache.manager.delete_by_keys(&[key]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_tombstone_get_is_ok() {
    let cache = TestCache::new();
    let key = cache.namespace().key("nil");
    cache.manager.store_nil(&key).await.unwrap();
    assert_eq!(cache.manager.get(&key).await.unwrap(), CachedValue::Tombstone);
}
