//! Cache manager: the façade the rest of an application talks to.
//!
//! # Lookup protocol
//!
//! ```text
//! read ── hit ──────────────────────────────────────────→ Hit
//!   │
//!   miss
//!   ↓
//! try lock ── acquired ── re-read ── hit ── release ────→ Hit
//!   │                        └── miss ───────────────────→ Populate(guard)
//!   taken
//!   ↓
//! sleep (jittered backoff) ── lock gone? ── re-read ── hit → Hit
//!   │                                         └── miss ── try lock again
//!   waited ≥ lock_wait_time ──────────────────────────────→ Err(Lock)
//! ```
//!
//! Reads fail closed: any transport error during a lookup is returned to the
//! caller rather than treated as a miss, so an unreachable store never turns
//! into a thundering herd against the source of truth.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cacher_core::{
    lock_name_for_key, lock_name_for_member, CacheConfig, CacheError, CacherError, CacherResult,
    KeyNamespace, LockError, RedisSettings,
};
use tokio::time::Instant;

use super::backoff::Backoff;
use super::guard::LockGuard;
use super::item::{CacheItem, CachedValue};
use super::redis_backend::RedisPools;
use super::traits::{CacheStats, ExpiringWrite, KeyTtl, KvTransport, LockCoordinator};

/// Outcome of a lock-protected lookup.
#[derive(Debug)]
pub enum Lookup {
    /// The key (or hash member) is cached; possibly as a tombstone.
    Hit(CachedValue),
    /// Nothing is cached and the caller now holds the population lock.
    Populate(LockGuard),
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_value(self) -> Option<CachedValue> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Populate(_) => None,
        }
    }

    pub fn into_guard(self) -> Option<LockGuard> {
        match self {
            Lookup::Hit(_) => None,
            Lookup::Populate(guard) => Some(guard),
        }
    }
}

/// Extension for write-path results whose failure must not fail the caller.
pub trait BestEffort {
    /// Log a failure at warn level and discard it.
    fn or_log(self, operation: &str, key: &str);
}

impl<T> BestEffort for CacherResult<T> {
    fn or_log(self, operation: &str, key: &str) {
        if let Err(error) = self {
            tracing::warn!(operation, key, %error, "cache write failed; continuing without cache");
        }
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    hits: AtomicU64,
    tombstone_hits: AtomicU64,
    misses: AtomicU64,
    lock_contentions: AtomicU64,
    lock_timeouts: AtomicU64,
}

impl StatsCounters {
    fn record_read(&self, value: Option<&CachedValue>) {
        let counter = match value {
            Some(CachedValue::Data(_)) => &self.hits,
            Some(CachedValue::Tombstone) => &self.tombstone_hits,
            None => &self.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            tombstone_hits: self.tombstone_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            lock_contentions: self.lock_contentions.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Address<'a> {
    Key(&'a str),
    Member { bucket: &'a str, member: &'a str },
}

impl Address<'_> {
    fn lock_name(&self) -> String {
        match self {
            Address::Key(key) => lock_name_for_key(key),
            Address::Member { bucket, member } => lock_name_for_member(bucket, member),
        }
    }

    fn label(&self) -> String {
        match self {
            Address::Key(key) => (*key).to_string(),
            Address::Member { bucket, member } => format!("{}[{}]", bucket, member),
        }
    }
}

/// Stampede-safe read-through cache manager.
///
/// Cheap to clone; clones share the transport, the lock coordinator and
/// the statistics counters.
#[derive(Clone)]
pub struct CacheManager {
    transport: Arc<dyn KvTransport>,
    locks: Arc<dyn LockCoordinator>,
    config: CacheConfig,
    namespace: KeyNamespace,
    stats: Arc<StatsCounters>,
}

impl CacheManager {
    /// Create a manager over an explicit transport and lock coordinator.
    pub fn new(
        transport: Arc<dyn KvTransport>,
        locks: Arc<dyn LockCoordinator>,
        config: CacheConfig,
    ) -> CacherResult<Self> {
        config.validate()?;
        let namespace = KeyNamespace::from_config(&config);
        Ok(Self {
            transport,
            locks,
            config,
            namespace,
            stats: Arc::new(StatsCounters::default()),
        })
    }

    /// Create a manager over an already-built pair of Redis pools.
    pub fn with_pools(pools: &RedisPools, config: CacheConfig) -> CacherResult<Self> {
        Self::new(
            Arc::new(pools.transport()),
            Arc::new(pools.coordinator()),
            config,
        )
    }

    /// Build both Redis pools and a manager over them.
    pub fn connect(settings: &RedisSettings, config: CacheConfig) -> CacherResult<Self> {
        let pools = RedisPools::connect(settings)?;
        Self::with_pools(&pools, config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    /// Namespaced key for a raw suffix.
    pub fn key(&self, raw: &str) -> String {
        self.namespace.key(raw)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Probe both the data and the lock store.
    pub async fn ping(&self) -> CacherResult<()> {
        self.transport.ping().await?;
        self.locks.ping().await
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Plain read. A missing key is [`CacheError::KeyNotFound`]; a tombstone
    /// is returned as [`CachedValue::Tombstone`].
    pub async fn get(&self, key: &str) -> CacherResult<CachedValue> {
        if self.config.disable_caching {
            return Err(CacherError::key_not_found(key));
        }
        let value = self.transport.get(key).await?;
        self.stats.record_read(value.as_ref());
        value.ok_or_else(|| CacherError::key_not_found(key))
    }

    /// Read `key`, or take the population lock if it is not cached.
    pub async fn get_or_lock(&self, key: &str) -> CacherResult<Lookup> {
        self.lookup(Address::Key(key)).await
    }

    /// Read one member of a hash bucket, or take the member's population lock.
    pub async fn get_hash_member_or_lock(&self, bucket: &str, member: &str) -> CacherResult<Lookup> {
        self.lookup(Address::Member { bucket, member }).await
    }

    /// Integer counter value; a missing key reads as zero.
    pub async fn get_counter(&self, key: &str) -> CacherResult<i64> {
        let bytes = match self.transport.get(key).await? {
            Some(CachedValue::Data(bytes)) => bytes,
            Some(CachedValue::Tombstone) | None => return Ok(0),
        };
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| {
                CacheError::InvalidValue {
                    key: key.to_string(),
                    reason: "not an integer".to_string(),
                }
                .into()
            })
    }

    pub async fn get_ttl(&self, key: &str) -> CacherResult<KeyTtl> {
        self.transport.ttl(key).await
    }

    async fn read(&self, address: Address<'_>) -> CacherResult<Option<CachedValue>> {
        match address {
            Address::Key(key) => self.transport.get(key).await,
            Address::Member { bucket, member } => {
                self.transport.get_hash_member(bucket, member).await
            }
        }
    }

    async fn lookup(&self, address: Address<'_>) -> CacherResult<Lookup> {
        if self.config.disable_caching {
            return Ok(Lookup::Populate(LockGuard::unlocked()));
        }

        if let Some(value) = self.read(address).await? {
            self.stats.record_read(Some(&value));
            tracing::debug!(key = %address.label(), tombstone = value.is_tombstone(), "cache hit");
            return Ok(Lookup::Hit(value));
        }

        // Each lookup counts once: as a hit when another holder populated
        // the value while we waited, otherwise as a miss.
        let resolved = self.await_population(address).await;
        match &resolved {
            Ok(Lookup::Hit(value)) => self.stats.record_read(Some(value)),
            _ => self.stats.record_read(None),
        }
        resolved
    }

    /// Take the population lock, or wait for the current holder to populate.
    async fn await_population(&self, address: Address<'_>) -> CacherResult<Lookup> {
        let lock_name = address.lock_name();
        let started = Instant::now();
        let mut backoff = Backoff::new(
            self.config.lock_retry_min_delay,
            self.config.lock_retry_max_delay,
        );
        let mut contended = false;

        loop {
            if let Some(lease) = self
                .locks
                .try_acquire(&lock_name, self.config.lock_lease)
                .await?
            {
                let guard = LockGuard::held(lease, self.locks.clone());
                // Another holder may have populated between our read and
                // our acquisition.
                return match self.read(address).await {
                    Ok(Some(value)) => {
                        guard.release().await.ok();
                        Ok(Lookup::Hit(value))
                    }
                    Ok(None) => {
                        tracing::debug!(key = %address.label(), "population lock acquired");
                        Ok(Lookup::Populate(guard))
                    }
                    Err(error) => {
                        guard.release().await.ok();
                        Err(error)
                    }
                };
            }

            if !contended {
                contended = true;
                self.stats.lock_contentions.fetch_add(1, Ordering::Relaxed);
            }

            let waited = started.elapsed();
            if waited >= self.config.lock_wait_time {
                self.stats.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %address.label(),
                    waited_ms = waited.as_millis() as u64,
                    "gave up waiting for population lock"
                );
                return Err(LockError::AcquireFailed {
                    key: address.label(),
                    waited,
                }
                .into());
            }

            let remaining = self.config.lock_wait_time - waited;
            tokio::time::sleep(backoff.next_delay().min(remaining)).await;

            if !self.locks.is_locked(&lock_name).await? {
                if let Some(value) = self.read(address).await? {
                    return Ok(Lookup::Hit(value));
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Store one item without taking any lock.
    ///
    /// An item whose custom TTL is zero is not stored.
    pub async fn store_without_blocking(&self, item: CacheItem) -> CacherResult<()> {
        if self.config.disable_caching {
            return Ok(());
        }
        let ttl = item.effective_ttl(self.config.default_ttl);
        if ttl.is_zero() {
            tracing::debug!(key = %item.key, "skipping item with zero ttl");
            return Ok(());
        }
        self.transport.set(&item.key, &item.value, ttl).await
    }

    /// Store several items in one atomic round trip.
    pub async fn store_multi_without_blocking(&self, items: &[CacheItem]) -> CacherResult<()> {
        if self.config.disable_caching {
            return Ok(());
        }
        let writes: Vec<ExpiringWrite<'_>> = items
            .iter()
            .map(|item| ExpiringWrite {
                key: &item.key,
                value: &item.value,
                ttl: item.effective_ttl(self.config.default_ttl),
            })
            .filter(|write| !write.ttl.is_zero())
            .collect();
        if writes.is_empty() {
            return Ok(());
        }
        self.transport.set_many(&writes).await
    }

    /// Record that the source of truth has nothing for `key`.
    pub async fn store_nil(&self, key: &str) -> CacherResult<()> {
        if self.config.disable_caching {
            return Ok(());
        }
        self.transport.set(key, &[], self.config.default_ttl).await
    }

    /// Store members of a hash bucket, resetting the bucket's TTL.
    pub async fn store_hash_members(
        &self,
        bucket: &str,
        members: &[(String, Vec<u8>)],
    ) -> CacherResult<()> {
        if self.config.disable_caching || members.is_empty() {
            return Ok(());
        }
        self.transport
            .set_hash_members(bucket, members, self.config.default_ttl)
            .await
    }

    /// Store a single hash member.
    pub async fn store_hash_member(
        &self,
        bucket: &str,
        member: &str,
        value: impl Into<Vec<u8>>,
    ) -> CacherResult<()> {
        self.store_hash_members(bucket, &[(member.to_string(), value.into())])
            .await
    }

    /// Delete keys (plain keys or whole hash buckets). Returns how many existed.
    pub async fn delete_by_keys(&self, keys: &[String]) -> CacherResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.transport.delete(keys).await?;
        tracing::debug!(requested = keys.len(), removed, "cache keys deleted");
        Ok(removed)
    }

    /// Atomically increment a counter, creating it at 1.
    pub async fn increase_cached_value_by_one(&self, key: &str) -> CacherResult<i64> {
        self.transport.incr(key).await
    }

    /// Reset the TTL of an existing key. Returns false if the key is absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> CacherResult<bool> {
        self.transport.expire(key, ttl).await
    }
}
