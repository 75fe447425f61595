//! Cacher Test Utilities
//!
//! Centralized test infrastructure for the cacher workspace:
//! - Proptest generators for keys, payloads, items and configs
//! - A counting fake source of truth
//! - Test fixtures wiring a manager to in-memory stores
//! - Custom assertions for cacher-specific outcomes

// Re-export core types for convenience
pub use cacher_core::{
    CacheConfig, CacheError, CacherError, CacherResult, ConfigError, KeyNamespace, LockError,
    LockoutPolicy, QueryFingerprint, TransportError,
};
pub use cacher_storage::{
    CacheItem, CacheManager, CachedValue, InMemoryStore, KeyTtl, Lookup, MultiResponse,
    ReadThroughCache, TypedLookup,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// FAKE SOURCE OF TRUTH
// ============================================================================

/// Errors raised by [`FakeSource`] and by code that combines it with the cache.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cache: {0}")]
    Cache(#[from] CacherError),

    #[error("source of truth unavailable")]
    Unavailable,
}

/// In-memory stand-in for a database, counting how often it is consulted.
#[derive(Debug)]
pub struct FakeSource<T> {
    records: Mutex<HashMap<String, T>>,
    calls: AtomicUsize,
    latency: Duration,
    failing: AtomicBool,
}

impl<T: Clone> Default for FakeSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FakeSource<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
            failing: AtomicBool::new(false),
        }
    }

    /// Every load sleeps this long first (on the tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert(&self, key: impl Into<String>, value: T) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many loads have been issued.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn load(&self, key: &str) -> Result<Option<T>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable);
        }
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cacher types.

    use super::*;
    use proptest::prelude::*;

    /// A key segment without separators.
    pub fn arb_key_segment() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,12}"
    }

    /// A raw key suffix that may contain characters the namespace rewrites.
    pub fn arb_raw_key() -> impl Strategy<Value = String> {
        "[a-z0-9:=&_-]{1,40}"
    }

    /// Non-empty payload bytes.
    pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 1..256)
    }

    /// A positive TTL between one second and one hour.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..=3600).prop_map(Duration::from_secs)
    }

    pub fn arb_cache_item() -> impl Strategy<Value = CacheItem> {
        (
            arb_key_segment(),
            arb_payload(),
            proptest::option::of(arb_ttl()),
        )
            .prop_map(|(key, value, ttl)| CacheItem { key, value, ttl })
    }

    /// A config that passes validation.
    pub fn arb_valid_config() -> impl Strategy<Value = CacheConfig> {
        (
            arb_key_segment(),
            prop_oneof![
                Just("development"),
                Just("staging"),
                Just("production"),
                Just("test")
            ],
            arb_ttl(),
            100u64..10_000,
            100u64..10_000,
            any::<bool>(),
        )
            .prop_map(|(prefix, env, ttl, lease_ms, wait_ms, disabled)| {
                CacheConfig::new()
                    .with_key_prefix(prefix)
                    .with_environment(env)
                    .with_default_ttl(ttl)
                    .with_lock_lease(Duration::from_millis(lease_ms))
                    .with_lock_wait_time(Duration::from_millis(wait_ms))
                    .with_caching_disabled(disabled)
            })
    }

    /// An ordered set of query parameters.
    pub fn arb_fingerprint() -> impl Strategy<Value = QueryFingerprint> {
        proptest::collection::vec((arb_key_segment(), arb_key_segment()), 0..4).prop_map(
            |pairs| {
                pairs
                    .into_iter()
                    .fold(QueryFingerprint::new(), |fp, (name, value)| fp.with(name, value))
            },
        )
    }

    pub fn arb_multi_response() -> impl Strategy<Value = MultiResponse> {
        (proptest::collection::vec(any::<u64>(), 0..20), any::<u64>())
            .prop_map(|(ids, count)| MultiResponse::new(ids, count))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde::{Deserialize, Serialize};

    /// Config with short lock timings so contention tests finish quickly.
    pub fn test_config() -> CacheConfig {
        CacheConfig::new()
            .with_key_prefix("cacher")
            .with_environment("test")
            .with_default_ttl(Duration::from_secs(900))
            .with_lock_lease(Duration::from_secs(2))
            .with_lock_wait_time(Duration::from_secs(1))
            .with_lock_retry_delays(Duration::from_millis(5), Duration::from_millis(40))
    }

    /// A manager wired to separate in-memory data and lock stores.
    pub struct TestCache {
        pub manager: CacheManager,
        pub data: Arc<InMemoryStore>,
        pub locks: Arc<InMemoryStore>,
    }

    impl TestCache {
        pub fn new() -> Self {
            Self::with_config(test_config())
        }

        pub fn with_config(config: CacheConfig) -> Self {
            let data = Arc::new(InMemoryStore::new());
            let locks = Arc::new(InMemoryStore::new());
            let manager = match CacheManager::new(data.clone(), locks.clone(), config) {
                Ok(manager) => manager,
                Err(error) => panic!("test config rejected: {}", error),
            };
            Self {
                manager,
                data,
                locks,
            }
        }

        pub fn read_through(&self) -> ReadThroughCache {
            ReadThroughCache::new(self.manager.clone())
        }

        pub fn namespace(&self) -> &KeyNamespace {
            self.manager.namespace()
        }
    }

    impl Default for TestCache {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Sample record cached by id and by index.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Product {
        pub id: u64,
        pub sku: String,
        pub name: String,
    }

    pub fn product(id: u64) -> Product {
        Product {
            id,
            sku: format!("SKU-{:05}", id),
            name: format!("product {}", id),
        }
    }

    /// Sample session cached under both its access and refresh tokens.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Session {
        pub user_id: u64,
        pub access_token: String,
        pub refresh_token: String,
    }

    pub fn session(user_id: u64) -> Session {
        Session {
            user_id,
            access_token: format!("at-{}", uuid::Uuid::now_v7().simple()),
            refresh_token: format!("rt-{}", uuid::Uuid::now_v7().simple()),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for cacher-specific validation.

    use super::*;

    /// Assert that a CacherResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CacherResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a CacherResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &CacherResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_key_not_found<T: std::fmt::Debug>(result: &CacherResult<T>) {
        match result {
            Err(CacherError::Cache(CacheError::KeyNotFound { .. })) => {}
            other => panic!("Expected KeyNotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_lock_failure<T: std::fmt::Debug>(result: &CacherResult<T>) {
        match result {
            Err(CacherError::Lock(LockError::AcquireFailed { .. })) => {}
            other => panic!("Expected lock acquisition failure, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_transport_failure<T: std::fmt::Debug>(result: &CacherResult<T>) {
        match result {
            Err(CacherError::Transport(_)) => {}
            other => panic!("Expected Transport error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CacherResult<T>) {
        match result {
            Err(CacherError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert a lookup hit with exactly these bytes.
    #[track_caller]
    pub fn assert_hit_bytes(lookup: &Lookup, expected: &[u8]) {
        match lookup {
            Lookup::Hit(CachedValue::Data(bytes)) => assert_eq!(bytes.as_slice(), expected),
            other => panic!("Expected hit with data, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_tombstone_hit(lookup: &Lookup) {
        match lookup {
            Lookup::Hit(CachedValue::Tombstone) => {}
            other => panic!("Expected tombstone hit, got: {:?}", other),
        }
    }

    /// Assert the caller was handed the population lock.
    #[track_caller]
    pub fn assert_populate_held(lookup: &Lookup) {
        match lookup {
            Lookup::Populate(guard) => assert!(guard.is_held(), "guard holds no lock"),
            other => panic!("Expected Populate, got: {:?}", other),
        }
    }

    /// Assert a key is under the namespace and free of rewritten characters.
    #[track_caller]
    pub fn assert_namespaced(key: &str, namespace: &KeyNamespace) {
        let prefix = format!("{}_{}_", namespace.prefix(), namespace.environment());
        assert!(key.starts_with(&prefix), "{} is not under {}", key, prefix);
        let suffix = &key[prefix.len()..];
        assert!(
            !suffix.contains('=') && !suffix.contains('&'),
            "{} contains unsanitized characters",
            key
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
