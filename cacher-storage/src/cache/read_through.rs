//! Read-through cache over a caller-supplied source of truth.
//!
//! Wraps the lock-protected lookup protocol so callers only supply the
//! closure that loads a value from the source of truth:
//!
//! ```ignore
//! let read = cache
//!     .fetch(&key, || async { repo.find_product(id).await })
//!     .await?;
//! if read.was_cache_hit() { /* ... */ }
//! let product: Option<Product> = read.into_value();
//! ```
//!
//! On a miss exactly one caller runs the loader; concurrent callers for the
//! same key wait on the population lock and then read what it stored.

use std::future::Future;

use cacher_core::{CacherError, Timestamp};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};

use super::guard::safe_release;
use super::item::CacheItem;
use super::manager::{BestEffort, CacheManager};
use super::typed::{find_hash_member_typed, find_typed, TypedLookup};

/// Where a read-through value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from the cache (including tombstones).
    Cache,
    /// Loaded from the source of truth and written back.
    Source,
    /// Caching is disabled; loaded from the source of truth without writing.
    Bypass,
}

/// Result of a read-through lookup, carrying provenance.
///
/// `None` means the source of truth has no such value.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: Option<T>,
    source: ReadSource,
    read_at: Timestamp,
}

impl<T> CacheRead<T> {
    fn new(value: Option<T>, source: ReadSource) -> Self {
        Self {
            value,
            source,
            read_at: Utc::now(),
        }
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    /// When this value was obtained.
    pub fn read_at(&self) -> Timestamp {
        self.read_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit()
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: self.value.map(f),
            source: self.source,
            read_at: self.read_at,
        }
    }
}

/// Read-through cache.
#[derive(Clone)]
pub struct ReadThroughCache {
    manager: CacheManager,
}

impl ReadThroughCache {
    pub fn new(manager: CacheManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &CacheManager {
        &self.manager
    }

    fn miss_source(&self) -> ReadSource {
        if self.manager.config().disable_caching {
            ReadSource::Bypass
        } else {
            ReadSource::Source
        }
    }

    /// Get `key` from the cache, falling back to `load` on a miss.
    ///
    /// A loaded value is written back with the default TTL; a loader that
    /// returns `Ok(None)` leaves a tombstone. Write-back failures are logged
    /// and never fail the read. A loader error is returned as-is and nothing
    /// is written.
    pub async fn fetch<T, E, F, Fut>(&self, key: &str, load: F) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacherError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let guard = match find_typed::<T>(&self.manager, key).await? {
            TypedLookup::Found(value) => return Ok(CacheRead::new(Some(value), ReadSource::Cache)),
            TypedLookup::Absent => return Ok(CacheRead::new(None, ReadSource::Cache)),
            TypedLookup::Populate(guard) => guard,
        };

        let loaded = load().await;
        if let Ok(found) = &loaded {
            match found {
                Some(value) => match CacheItem::json(key, value) {
                    Ok(item) => self
                        .manager
                        .store_without_blocking(item)
                        .await
                        .or_log("store", key),
                    Err(error) => tracing::warn!(key, %error, "value not cacheable"),
                },
                None => self.manager.store_nil(key).await.or_log("store_nil", key),
            }
        }
        safe_release(Some(guard)).await;

        let source = self.miss_source();
        loaded.map(|value| CacheRead::new(value, source))
    }

    /// Like [`fetch`](Self::fetch) for one member of a hash bucket.
    pub async fn fetch_member<T, E, F, Fut>(
        &self,
        bucket: &str,
        member: &str,
        load: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacherError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let guard = match find_hash_member_typed::<T>(&self.manager, bucket, member).await? {
            TypedLookup::Found(value) => return Ok(CacheRead::new(Some(value), ReadSource::Cache)),
            TypedLookup::Absent => return Ok(CacheRead::new(None, ReadSource::Cache)),
            TypedLookup::Populate(guard) => guard,
        };

        let loaded = load().await;
        if let Ok(found) = &loaded {
            let bytes = match found {
                Some(value) => serde_json::to_vec(value)
                    .inspect_err(|error| tracing::warn!(bucket, member, %error, "value not cacheable"))
                    .ok(),
                None => Some(Vec::new()),
            };
            if let Some(bytes) = bytes {
                self.manager
                    .store_hash_member(bucket, member, bytes)
                    .await
                    .or_log("store_hash_member", bucket);
            }
        }
        safe_release(Some(guard)).await;

        let source = self.miss_source();
        loaded.map(|value| CacheRead::new(value, source))
    }

    /// Drop cached keys after the source of truth changed. Failures are logged.
    pub async fn invalidate(&self, keys: &[String]) {
        self.manager
            .delete_by_keys(keys)
            .await
            .or_log("invalidate", &keys.join(","));
    }

    /// Warm the cache with known values. Failures are logged.
    pub async fn populate(&self, items: &[CacheItem]) {
        let label = items.first().map(|i| i.key.as_str()).unwrap_or_default();
        self.manager
            .store_multi_without_blocking(items)
            .await
            .or_log("populate", label);
    }
}
