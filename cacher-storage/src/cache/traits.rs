//! Transport and lock coordination traits.
//!
//! The cache manager talks to the remote store exclusively through these two
//! traits. They are deliberately separate so that the data path and the lock
//! path can run over independent connection pools (or independent servers).

use std::time::Duration;

use async_trait::async_trait;
use cacher_core::{CacherResult, LockError, LockLease};
use tokio::time::Instant;

use super::backoff::Backoff;
use super::item::CachedValue;

/// Remaining lifetime of a key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key exists and expires after the given duration.
    Expiring(Duration),
}

impl KeyTtl {
    /// Interpret a `PTTL` reply (-2 missing, -1 no expiry).
    pub fn from_pttl(millis: i64) -> Self {
        match millis {
            -2 => KeyTtl::Missing,
            m if m < 0 => KeyTtl::Persistent,
            m => KeyTtl::Expiring(Duration::from_millis(m as u64)),
        }
    }

    /// Remaining time to live, if the key expires.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyTtl::Expiring(d) => Some(*d),
            _ => None,
        }
    }

    /// True when the key exists and has a positive TTL.
    pub fn is_expiring(&self) -> bool {
        matches!(self, KeyTtl::Expiring(d) if !d.is_zero())
    }

    pub fn exists(&self) -> bool {
        !matches!(self, KeyTtl::Missing)
    }
}

/// A single write with an already-resolved TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiringWrite<'a> {
    pub key: &'a str,
    pub value: &'a [u8],
    pub ttl: Duration,
}

/// Key-value transport against the remote store.
///
/// Every method is one logical operation: implementations check a
/// connection out of their pool, run the command (or one atomic
/// transaction), and return the connection before returning.
#[async_trait]
pub trait KvTransport: Send + Sync {
    /// Atomically check existence and read the value of `key`.
    ///
    /// Returns `None` when the key does not exist. An existing key holding
    /// the zero-length marker is returned as [`CachedValue::Tombstone`].
    async fn get(&self, key: &str) -> CacherResult<Option<CachedValue>>;

    /// Atomically check existence and read one member of a hash bucket.
    async fn get_hash_member(&self, bucket: &str, member: &str)
        -> CacherResult<Option<CachedValue>>;

    /// Write `value` under `key` with the given TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacherResult<()>;

    /// Write several keys in one atomic round trip, each with its own TTL.
    async fn set_many(&self, writes: &[ExpiringWrite<'_>]) -> CacherResult<()>;

    /// Write members into a hash bucket and reset the bucket's expiry.
    async fn set_hash_members(
        &self,
        bucket: &str,
        members: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> CacherResult<()>;

    /// Delete keys in one command. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> CacherResult<u64>;

    /// Atomically increment an integer counter, creating it at 1.
    async fn incr(&self, key: &str) -> CacherResult<i64>;

    /// Reset the expiry of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacherResult<bool>;

    /// Remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> CacherResult<KeyTtl>;

    /// Round-trip health check.
    async fn ping(&self) -> CacherResult<()>;
}

/// Per-key mutual exclusion across processes.
///
/// Implementations must guarantee that for a given name at most one
/// unexpired lease exists at any time, and that only the holder of a lease
/// can release it.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Single acquisition attempt. `None` means someone else holds the lock.
    async fn try_acquire(&self, name: &str, lease: Duration) -> CacherResult<Option<LockLease>>;

    /// Release a lease. Idempotent: returns false when the lease was already
    /// released, expired, or taken over by another holder.
    async fn release(&self, lease: &LockLease) -> CacherResult<bool>;

    /// Whether any holder currently owns the lock.
    async fn is_locked(&self, name: &str) -> CacherResult<bool>;

    /// Round-trip health check of the lock pool.
    async fn ping(&self) -> CacherResult<()>;

    /// Acquire with a bounded wait, retrying with jittered backoff.
    ///
    /// For callers that need plain mutual exclusion outside cache lookups,
    /// such as serialising a refresh job. Lookups in `CacheManager` run their
    /// own loop because they re-read the cache between attempts.
    async fn acquire(
        &self,
        name: &str,
        lease: Duration,
        wait: Duration,
    ) -> CacherResult<LockLease> {
        let started = Instant::now();
        let mut backoff = Backoff::default();
        loop {
            if let Some(acquired) = self.try_acquire(name, lease).await? {
                return Ok(acquired);
            }
            let waited = started.elapsed();
            if waited >= wait {
                return Err(LockError::AcquireFailed {
                    key: name.to_string(),
                    waited,
                }
                .into());
            }
            tokio::time::sleep(backoff.next_delay().min(wait - waited)).await;
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found real data, including lookups served after waiting
    /// on another holder.
    pub hits: u64,
    /// Reads that found a tombstone.
    pub tombstone_hits: u64,
    /// Reads that found nothing and lookups that did not end with a value.
    pub misses: u64,
    /// Lookups that found the population lock already taken.
    pub lock_contentions: u64,
    /// Lookups that gave up after the lock wait bound.
    pub lock_timeouts: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Tombstones count as hits.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits + self.tombstone_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 70,
            tombstone_hits: 10,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_key_ttl_from_pttl() {
        assert_eq!(KeyTtl::from_pttl(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_pttl(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_pttl(1500),
            KeyTtl::Expiring(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_key_ttl_predicates() {
        assert!(KeyTtl::Expiring(Duration::from_secs(1)).is_expiring());
        assert!(!KeyTtl::Expiring(Duration::ZERO).is_expiring());
        assert!(!KeyTtl::Persistent.is_expiring());
        assert!(KeyTtl::Persistent.exists());
        assert!(!KeyTtl::Missing.exists());
        assert_eq!(KeyTtl::Missing.remaining(), None);
    }
}
