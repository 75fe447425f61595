//! Configuration types
//!
//! All configuration is constructed once at process startup and handed to the
//! cache manager explicitly. Nothing in this crate reads configuration lazily.

use crate::{CacherError, CacherResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TTL for cached entries and tombstones.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Default lease of a population lock.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(8);

/// Default upper bound a reader waits for another process to populate a key.
pub const DEFAULT_LOCK_WAIT_TIME: Duration = Duration::from_secs(5);

/// Default lockout window for rate-limited actions.
pub const DEFAULT_LOCKOUT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Default number of failures tolerated before lockout.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Policy configuration owned by a cache manager instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Prefix of every namespaced key.
    pub key_prefix: String,
    /// Deployment environment, second segment of every namespaced key.
    pub environment: String,
    /// TTL applied when an item carries no custom TTL, and to tombstones.
    pub default_ttl: Duration,
    /// Lease of a population lock; the lock self-heals after this.
    pub lock_lease: Duration,
    /// Maximum time a reader waits for another holder to populate a key.
    pub lock_wait_time: Duration,
    /// First retry delay while polling a contended lock.
    pub lock_retry_min_delay: Duration,
    /// Ceiling for the retry delay while polling a contended lock.
    pub lock_retry_max_delay: Duration,
    /// Bypass caching entirely and always consult the source of truth.
    pub disable_caching: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "cacher".to_string(),
            environment: "development".to_string(),
            default_ttl: DEFAULT_CACHE_TTL,
            lock_lease: DEFAULT_LOCK_LEASE,
            lock_wait_time: DEFAULT_LOCK_WAIT_TIME,
            lock_retry_min_delay: Duration::from_millis(20),
            lock_retry_max_delay: Duration::from_millis(250),
            disable_caching: false,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the deployment environment.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the population lock lease.
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    /// Set the lock wait bound.
    pub fn with_lock_wait_time(mut self, wait: Duration) -> Self {
        self.lock_wait_time = wait;
        self
    }

    /// Set the retry delays used while polling a contended lock.
    pub fn with_lock_retry_delays(mut self, min: Duration, max: Duration) -> Self {
        self.lock_retry_min_delay = min;
        self.lock_retry_max_delay = max;
        self
    }

    /// Enable or disable caching.
    pub fn with_caching_disabled(mut self, disabled: bool) -> Self {
        self.disable_caching = disabled;
        self
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CACHER_KEY_PREFIX`: key prefix (default: cacher)
    /// - `CACHER_ENV`: deployment environment (default: development)
    /// - `CACHER_DEFAULT_TTL_SECS`: default TTL in seconds (default: 900)
    /// - `CACHER_LOCK_LEASE_MS`: lock lease in milliseconds (default: 8000)
    /// - `CACHER_LOCK_WAIT_MS`: lock wait bound in milliseconds (default: 5000)
    /// - `CACHER_DISABLE_CACHING`: "true" or "1" to bypass caching (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            key_prefix: std::env::var("CACHER_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            environment: std::env::var("CACHER_ENV").unwrap_or(defaults.environment),
            default_ttl: env_duration("CACHER_DEFAULT_TTL_SECS", Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            lock_lease: env_duration("CACHER_LOCK_LEASE_MS", Duration::from_millis)
                .unwrap_or(defaults.lock_lease),
            lock_wait_time: env_duration("CACHER_LOCK_WAIT_MS", Duration::from_millis)
                .unwrap_or(defaults.lock_wait_time),
            lock_retry_min_delay: defaults.lock_retry_min_delay,
            lock_retry_max_delay: defaults.lock_retry_max_delay,
            disable_caching: std::env::var("CACHER_DISABLE_CACHING")
                .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.disable_caching),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - key_prefix and environment are non-empty
    /// - default_ttl and lock_lease are positive
    /// - lock_retry_min_delay <= lock_retry_max_delay
    pub fn validate(&self) -> CacherResult<()> {
        if self.key_prefix.trim().is_empty() {
            return Err(missing("key_prefix"));
        }

        if self.environment.trim().is_empty() {
            return Err(missing("environment"));
        }

        if self.default_ttl.is_zero() {
            return Err(invalid(
                "default_ttl",
                format!("{:?}", self.default_ttl),
                "default_ttl must be positive",
            ));
        }

        if self.lock_lease.is_zero() {
            return Err(invalid(
                "lock_lease",
                format!("{:?}", self.lock_lease),
                "lock_lease must be positive",
            ));
        }

        if self.lock_retry_min_delay > self.lock_retry_max_delay {
            return Err(invalid(
                "lock_retry_min_delay",
                format!("{:?}", self.lock_retry_min_delay),
                "lock_retry_min_delay must not exceed lock_retry_max_delay",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// REDIS CONNECTION SETTINGS
// ============================================================================

/// Connection settings for the data pool and the separate lock pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSettings {
    /// URL of the data store.
    pub url: String,
    /// URL used by the lock pool. Usually the same server as `url`.
    pub lock_url: String,
    /// Maximum connections in the data pool.
    pub max_connections: usize,
    /// Maximum connections in the lock pool.
    pub lock_max_connections: usize,
}

impl RedisSettings {
    /// Settings where data and locks live on the same server.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            lock_url: url.clone(),
            url,
            max_connections: 16,
            lock_max_connections: 8,
        }
    }

    /// Point the lock pool at a different server.
    pub fn with_lock_url(mut self, lock_url: impl Into<String>) -> Self {
        self.lock_url = lock_url.into();
        self
    }

    /// Set pool sizes.
    pub fn with_pool_sizes(mut self, data: usize, lock: usize) -> Self {
        self.max_connections = data;
        self.lock_max_connections = lock;
        self
    }

    /// Create RedisSettings from environment variables.
    ///
    /// Environment variables:
    /// - `CACHER_REDIS_URL`: data store URL (required)
    /// - `CACHER_REDIS_LOCK_URL`: lock store URL (default: `CACHER_REDIS_URL`)
    /// - `CACHER_REDIS_MAX_CONNECTIONS`: data pool size (default: 16)
    /// - `CACHER_REDIS_LOCK_MAX_CONNECTIONS`: lock pool size (default: 8)
    pub fn from_env() -> CacherResult<Self> {
        let url = std::env::var("CACHER_REDIS_URL").map_err(|_| missing("CACHER_REDIS_URL"))?;
        let mut settings = Self::new(url);

        if let Ok(lock_url) = std::env::var("CACHER_REDIS_LOCK_URL") {
            settings.lock_url = lock_url;
        }
        if let Some(max) = env_parse("CACHER_REDIS_MAX_CONNECTIONS") {
            settings.max_connections = max;
        }
        if let Some(max) = env_parse("CACHER_REDIS_LOCK_MAX_CONNECTIONS") {
            settings.lock_max_connections = max;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> CacherResult<()> {
        if self.url.trim().is_empty() {
            return Err(missing("url"));
        }
        if self.lock_url.trim().is_empty() {
            return Err(missing("lock_url"));
        }
        if self.max_connections == 0 {
            return Err(invalid(
                "max_connections",
                "0".to_string(),
                "pool must hold at least one connection",
            ));
        }
        if self.lock_max_connections == 0 {
            return Err(invalid(
                "lock_max_connections",
                "0".to_string(),
                "pool must hold at least one connection",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// LOCKOUT POLICY
// ============================================================================

/// Policy for rate-limited actions such as password login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Failures tolerated inside one window before the identity is locked.
    pub max_attempts: i64,
    /// Window after the last failure during which failures are counted.
    pub window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_LOCKOUT_WINDOW,
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: i64, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }

    /// Environment variables:
    /// - `CACHER_LOGIN_RETRY_ATTEMPTS` (default: 3)
    /// - `CACHER_LOGIN_LOCK_TTL_SECS` (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("CACHER_LOGIN_RETRY_ATTEMPTS").unwrap_or(defaults.max_attempts),
            window: env_duration("CACHER_LOGIN_LOCK_TTL_SECS", Duration::from_secs)
                .unwrap_or(defaults.window),
        }
    }

    pub fn validate(&self) -> CacherResult<()> {
        if self.max_attempts <= 0 {
            return Err(invalid(
                "max_attempts",
                self.max_attempts.to_string(),
                "max_attempts must be greater than 0",
            ));
        }
        if self.window.is_zero() {
            return Err(invalid(
                "window",
                format!("{:?}", self.window),
                "window must be positive",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_duration(name: &str, unit: fn(u64) -> Duration) -> Option<Duration> {
    env_parse::<u64>(name).map(unit)
}

fn missing(field: &str) -> CacherError {
    CacherError::Config(ConfigError::MissingRequired {
        field: field.to_string(),
    })
}

fn invalid(field: &str, value: String, reason: &str) -> CacherError {
    CacherError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}
