//! Cacher Storage - Cache Engine and Store Backends
//!
//! The cache manager, its Redis and in-memory backends, typed retrieval
//! helpers, the read-through wrapper and the attempt limiter.

pub mod cache;

pub use cache::{
    find_hash_member_typed, find_multi_response, find_typed, find_without_lock, safe_release,
    store_multi_response, store_nil_logged, AttemptLimiter, Backoff, BestEffort, CacheItem,
    CacheManager, CacheRead, CacheStats, CachedValue, ExpiringWrite, InMemoryStore, KeyTtl,
    KvTransport, LockCoordinator, LockGuard, Lookup, MultiResponse, ReadSource, ReadThroughCache,
    RedisLockCoordinator, RedisPools, RedisStoreError, RedisTransport, TypedLookup,
};

// ============================================================================
// PROPERTY TESTS
// ============================================================================
