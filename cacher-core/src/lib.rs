//! Cacher Core - Shared Types
//!
//! Error taxonomy, configuration, key namespacing and lock lease data used
//! by the cache engine. This crate performs no I/O.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod keys;
pub mod lock;

pub use config::{
    CacheConfig, LockoutPolicy, RedisSettings, DEFAULT_CACHE_TTL, DEFAULT_LOCKOUT_WINDOW,
    DEFAULT_LOCK_LEASE, DEFAULT_LOCK_WAIT_TIME, DEFAULT_MAX_ATTEMPTS,
};
pub use error::{CacheError, CacherError, CacherResult, ConfigError, LockError, TransportError};
pub use keys::{sanitize, KeyKind, KeyNamespace, QueryFingerprint};
pub use lock::{lock_name_for_key, lock_name_for_member, LockLease, LOCK_PREFIX};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Opaque token identifying the holder of a distributed lock.
pub type HolderToken = Uuid;
