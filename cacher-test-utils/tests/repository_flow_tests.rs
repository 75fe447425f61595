//! Repository-style flows against the cache engine.
//!
//! These mirror how data-access code uses the engine: objects cached by id
//! and by secondary index, paged list results in hash buckets, sessions
//! cached under sibling token keys, and invalidation after writes.

use std::time::Duration;

use cacher_storage::{
    find_multi_response, find_typed, safe_release, store_multi_response, store_nil_logged,
    BestEffort,
};
use cacher_test_utils::assertions;
use cacher_test_utils::fixtures::{self, Product, Session, TestCache};
use cacher_test_utils::{CacheItem, KeyTtl, MultiResponse, QueryFingerprint, TypedLookup};
use chrono::Utc;

// ============================================================================
// OBJECTS BY ID AND BY INDEX
// ============================================================================

/// Cache-aside lookup by id, the way a repository would write it by hand.
async fn find_product(cache: &TestCache, db: &[Product], id: u64) -> Option<Product> {
    let key = cache.namespace().object_by_id("product", id);
    match find_typed::<Product>(&cache.manager, &key).await.unwrap() {
        TypedLookup::Found(product) => Some(product),
        TypedLookup::Absent => None,
        TypedLookup::Populate(guard) => {
            let found = db.iter().find(|p| p.id == id).cloned();
            match &found {
                Some(product) => cache
                    .manager
                    .store_without_blocking(CacheItem::json(&key, product).unwrap())
                    .await
                    .or_log("store", &key),
                None => store_nil_logged(&cache.manager, &key).await,
            }
            safe_release(Some(guard)).await;
            found
        }
    }
}

#[tokio::test]
async fn test_find_by_id_populates_then_hits() {
    let cache = TestCache::new();
    let db = vec![fixtures::product(1), fixtures::product(2)];

    assert_eq!(find_product(&cache, &db, 1).await, Some(fixtures::product(1)));
    let stats = cache.manager.stats();
    assert_eq!((stats.hits, stats.misses), (0, 1));

    // Served from cache even after the "database" forgets it.
    assert_eq!(find_product(&cache, &[], 1).await, Some(fixtures::product(1)));
    assert_eq!(cache.manager.stats().hits, 1);
    assert!(cache.locks.is_empty().await);
}

#[tokio::test]
async fn test_missing_record_is_tombstoned() {
    let cache = TestCache::new();
    assert_eq!(find_product(&cache, &[], 99).await, None);

    let key = cache.namespace().object_by_id("product", 99);
    let lookup = cache.manager.get_or_lock(&key).await.unwrap();
    assertions::assert_tombstone_hit(&lookup);

    // Tombstone survives the record appearing until invalidated.
    let db = vec![fixtures::product(99)];
    assert_eq!(find_product(&cache, &db, 99).await, None);
    cache.manager.delete_by_keys(&[key]).await.unwrap();
    assert_eq!(find_product(&cache, &db, 99).await, Some(fixtures::product(99)));
}

#[tokio::test]
async fn test_index_key_points_at_id() {
    let cache = TestCache::new();
    let product = fixtures::product(5);
    let id_key = cache.namespace().object_by_id("product", product.id);
    let sku_key = cache
        .namespace()
        .object_by_index("product", "sku", &product.sku);

    cache
        .manager
        .store_multi_without_blocking(&[
            CacheItem::json(&id_key, &product).unwrap(),
            CacheItem::new(&sku_key, product.id.to_string()),
        ])
        .await
        .unwrap();

    let id: u64 = cacher_storage::find_without_lock(&cache.manager, &sku_key)
        .await
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(id, 5);
    assert_eq!(find_product(&cache, &[], id).await, Some(product));
}

// ============================================================================
// LIST RESULTS IN HASH BUCKETS
// ============================================================================

#[tokio::test]
async fn test_paged_list_in_bucket() {
    let cache = TestCache::new();
    let filter = QueryFingerprint::new().with("query", "lamp");
    let bucket = cache.namespace().bucket("product", &filter);
    let page1 = QueryFingerprint::new().with("page", 1).with("size", 2).to_string();
    let page2 = QueryFingerprint::new().with("page", 2).with("size", 2).to_string();

    let guard = find_multi_response(&cache.manager, &bucket, &page1)
        .await
        .unwrap()
        .into_guard()
        .expect("first read populates");
    store_multi_response(
        &cache.manager,
        &bucket,
        &page1,
        &MultiResponse::new(vec![1, 2], 3),
    )
    .await
    .unwrap();
    safe_release(Some(guard)).await;

    store_multi_response(&cache.manager, &bucket, &page2, &MultiResponse::new(vec![3], 3))
        .await
        .unwrap();

    let cached = find_multi_response(&cache.manager, &bucket, &page1)
        .await
        .unwrap()
        .into_found()
        .unwrap();
    assert_eq!(cached, MultiResponse::new(vec![1, 2], 3));

    // A write to any product invalidates every page at once.
    assert_eq!(cache.manager.delete_by_keys(&[bucket.clone()]).await.unwrap(), 1);
    let lookup = find_multi_response(&cache.manager, &bucket, &page2)
        .await
        .unwrap();
    assert!(matches!(lookup, TypedLookup::Populate(_)));
}

#[tokio::test]
async fn test_bucket_member_tombstone() {
    let cache = TestCache::new();
    let bucket = cache.namespace().bucket("product", &QueryFingerprint::new());
    cache
        .manager
        .store_hash_member(&bucket, "page:9", Vec::new())
        .await
        .unwrap();
    let lookup = find_multi_response(&cache.manager, &bucket, "page:9")
        .await
        .unwrap();
    assert!(matches!(lookup, TypedLookup::Absent));
}

// ============================================================================
// SESSIONS UNDER SIBLING TOKEN KEYS
// ============================================================================

fn session_keys(cache: &TestCache, session: &Session) -> (String, String) {
    (
        cache.namespace().token("access", &session.access_token),
        cache.namespace().token("refresh", &session.refresh_token),
    )
}

#[tokio::test(start_paused = true)]
async fn test_session_cached_until_token_expiry() {
    let cache = TestCache::new();
    let session = fixtures::session(1);
    let (access, refresh) = session_keys(&cache, &session);
    let access_expiry = Utc::now() + chrono::Duration::seconds(300);

    cache
        .manager
        .store_multi_without_blocking(&[
            CacheItem::json(&access, &session)
                .unwrap()
                .expire_at(access_expiry),
            CacheItem::json(&refresh, &session)
                .unwrap()
                .expire_after(Duration::from_secs(3600)),
        ])
        .await
        .unwrap();

    let ttl = cache.manager.get_ttl(&access).await.unwrap();
    let remaining = ttl.remaining().unwrap();
    assert!(remaining > Duration::from_secs(290) && remaining <= Duration::from_secs(300));

    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(cache.manager.get_ttl(&access).await.unwrap(), KeyTtl::Missing);
    let still = match find_typed::<Session>(&cache.manager, &refresh).await.unwrap() {
        TypedLookup::Found(s) => s,
        other => panic!("refresh key should still be cached: {:?}", other),
    };
    assert_eq!(still, session);
}

#[tokio::test]
async fn test_logout_invalidates_both_tokens() {
    let cache = TestCache::new();
    let session = fixtures::session(2);
    let (access, refresh) = session_keys(&cache, &session);
    cache
        .manager
        .store_multi_without_blocking(&[
            CacheItem::json(&access, &session).unwrap(),
            CacheItem::json(&refresh, &session).unwrap(),
        ])
        .await
        .unwrap();

    let removed = cache
        .manager
        .delete_by_keys(&[access.clone(), refresh.clone()])
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assertions::assert_key_not_found(&cache.manager.get(&access).await);
    assertions::assert_key_not_found(&cache.manager.get(&refresh).await);
}

#[tokio::test]
async fn test_expired_token_is_not_cached() {
    let cache = TestCache::new();
    let session = fixtures::session(3);
    let (access, _) = session_keys(&cache, &session);
    cache
        .manager
        .store_without_blocking(
            CacheItem::json(&access, &session)
                .unwrap()
                .expire_at(Utc::now() - chrono::Duration::seconds(1)),
        )
        .await
        .unwrap();
    assert!(cache.data.is_empty().await);
}
