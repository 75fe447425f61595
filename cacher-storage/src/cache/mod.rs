//! Stampede-safe read-through cache over a remote key-value store.
//!
//! # Design Philosophy
//!
//! A cache miss on a hot key must not send every concurrent caller to the
//! source of truth. Lookups therefore hand back either the cached value or
//! a [`LockGuard`] proving the caller is the single populator for that key;
//! everyone else waits (bounded) for the populator to finish.
//!
//! "The source has nothing" is cached too, as a zero-length tombstone, so
//! repeated lookups for absent records are served from the cache.
//!
//! # Layers
//!
//! - [`KvTransport`] / [`LockCoordinator`]: the store, behind traits, with
//!   Redis ([`RedisTransport`], [`RedisLockCoordinator`]) and in-process
//!   ([`InMemoryStore`]) implementations.
//! - [`CacheManager`]: the lookup protocol, writes, counters and TTLs.
//! - [`find_typed`] and friends: JSON decoding over manager lookups.
//! - [`ReadThroughCache`]: lookup, load, write back, release in one call.
//! - [`AttemptLimiter`]: failed-attempt lockout on cache counters.
//!
//! # Example
//!
//! ```ignore
//! match find_typed::<Product>(&manager, &key).await? {
//!     TypedLookup::Found(product) => Ok(Some(product)),
//!     TypedLookup::Absent => Ok(None),
//!     TypedLookup::Populate(guard) => {
//!         let product = repo.find(id).await?;
//!         match &product {
//!             Some(p) => manager.store_without_blocking(CacheItem::json(&key, p)?).await.or_log("store", &key),
//!             None => store_nil_logged(&manager, &key).await,
//!         }
//!         safe_release(Some(guard)).await;
//!         Ok(product)
//!     }
//! }
//! ```

pub mod backoff;
pub mod guard;
pub mod item;
pub mod limiter;
pub mod manager;
pub mod memory;
pub mod read_through;
pub mod redis_backend;
pub mod traits;
pub mod typed;

pub use backoff::Backoff;
pub use guard::{safe_release, LockGuard};
pub use item::{CacheItem, CachedValue};
pub use limiter::AttemptLimiter;
pub use manager::{BestEffort, CacheManager, Lookup};
pub use memory::InMemoryStore;
pub use read_through::{CacheRead, ReadSource, ReadThroughCache};
pub use redis_backend::{RedisLockCoordinator, RedisPools, RedisStoreError, RedisTransport};
pub use traits::{CacheStats, ExpiringWrite, KeyTtl, KvTransport, LockCoordinator};
pub use typed::{
    find_hash_member_typed, find_multi_response, find_typed, find_without_lock,
    store_multi_response, store_nil_logged, MultiResponse, TypedLookup,
};
