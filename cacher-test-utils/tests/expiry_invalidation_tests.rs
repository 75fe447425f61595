//! Expiry, invalidation and counter behaviour of the manager.

use std::time::Duration;

use cacher_storage::safe_release;
use cacher_test_utils::assertions;
use cacher_test_utils::fixtures::TestCache;
use cacher_test_utils::{CacheItem, CachedValue, KeyTtl, QueryFingerprint};

#[tokio::test(start_paused = true)]
async fn test_custom_ttl_item_expires() {
    let cache = TestCache::new();
    let key = cache.namespace().key("short-lived");
    cache
        .manager
        .store_without_blocking(CacheItem::with_ttl(&key, "v", Duration::from_secs(10)))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(9)).await;
    assert_eq!(
        cache.manager.get(&key).await.unwrap(),
        CachedValue::Data(b"v".to_vec())
    );
    tokio::time::advance(Duration::from_secs(1)).await;
    assertions::assert_key_not_found(&cache.manager.get(&key).await);
}

#[tokio::test(start_paused = true)]
async fn test_default_ttl_applies() {
    let cache = TestCache::new();
    let key = cache.namespace().key("default");
    cache
        .manager
        .store_without_blocking(CacheItem::new(&key, "v"))
        .await
        .unwrap();
    assert_eq!(
        cache.manager.get_ttl(&key).await.unwrap(),
        KeyTtl::Expiring(cache.manager.config().default_ttl)
    );
}

#[tokio::test]
async fn test_delete_by_keys_removes_all() {
    let cache = TestCache::new();
    let k1 = cache.namespace().object_by_id("user", 1);
    let k2 = cache.namespace().object_by_index("user", "email", "a@x.io");
    cache
        .manager
        .store_multi_without_blocking(&[CacheItem::new(&k1, "{}"), CacheItem::new(&k2, "1")])
        .await
        .unwrap();

    cache
        .manager
        .delete_by_keys(&[k1.clone(), k2.clone()])
        .await
        .unwrap();
    assertions::assert_key_not_found(&cache.manager.get(&k1).await);
    assertions::assert_key_not_found(&cache.manager.get(&k2).await);
}

#[tokio::test]
async fn test_bucket_members_are_independent_and_deleted_together() {
    let cache = TestCache::new();
    let bucket = cache
        .namespace()
        .bucket("user", &QueryFingerprint::new().with("role", "admin"));
    cache
        .manager
        .store_hash_members(
            &bucket,
            &[
                ("ids".to_string(), b"[1,2,3]".to_vec()),
                ("count".to_string(), b"3".to_vec()),
            ],
        )
        .await
        .unwrap();

    let ids = cache
        .manager
        .get_hash_member_or_lock(&bucket, "ids")
        .await
        .unwrap();
    assertions::assert_hit_bytes(&ids, b"[1,2,3]");
    let count = cache
        .manager
        .get_hash_member_or_lock(&bucket, "count")
        .await
        .unwrap();
    assertions::assert_hit_bytes(&count, b"3");

    cache.manager.delete_by_keys(&[bucket.clone()]).await.unwrap();
    for member in ["ids", "count"] {
        let lookup = cache
            .manager
            .get_hash_member_or_lock(&bucket, member)
            .await
            .unwrap();
        assertions::assert_populate_held(&lookup);
        safe_release(lookup.into_guard()).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_counter_window() {
    let cache = TestCache::new();
    let key = cache.namespace().counter("reset-password", "a@x.io");
    let window = Duration::from_secs(300);
    for _ in 0..3 {
        cache.manager.increase_cached_value_by_one(&key).await.unwrap();
        cache.manager.expire(&key, window).await.unwrap();
    }
    assert!(cache.manager.get_ttl(&key).await.unwrap().is_expiring());
    assert!(cache.manager.get_counter(&key).await.unwrap() >= 3);

    tokio::time::advance(window).await;
    assert_eq!(cache.manager.get_ttl(&key).await.unwrap(), KeyTtl::Missing);
    assertions::assert_key_not_found(&cache.manager.get(&key).await);
}

#[tokio::test]
async fn test_safe_release_of_nothing_changes_nothing() {
    let cache = TestCache::new();
    safe_release(None).await;
    assert!(cache.data.is_empty().await);
    assert!(cache.locks.is_empty().await);
}
