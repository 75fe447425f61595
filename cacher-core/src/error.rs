//! Error types for cacher operations

use std::time::Duration;
use thiserror::Error;

/// Cache-level errors raised while reading or decoding cached entries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Failed to decode cached value for {key}: {reason}")]
    DecodeFailed { key: String, reason: String },

    #[error("Failed to encode value for {key}: {reason}")]
    EncodeFailed { key: String, reason: String },

    #[error("Invalid cached value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Distributed lock errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock acquisition failed for {key} after waiting {waited:?}")]
    AcquireFailed { key: String, waited: Duration },

    #[error("Lock release failed for {key}: {reason}")]
    ReleaseFailed { key: String, reason: String },
}

/// Connectivity or protocol failures talking to the remote store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection pool unavailable: {reason}")]
    PoolUnavailable { reason: String },

    #[error("Command {command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all cacher errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacherError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CacherError {
    /// Shorthand for a `KeyNotFound` error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        CacherError::Cache(CacheError::KeyNotFound { key: key.into() })
    }

    /// True when the key is absent from the store.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, CacherError::Cache(CacheError::KeyNotFound { .. }))
    }

    /// True when exclusivity could not be obtained within the wait bound.
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, CacherError::Lock(LockError::AcquireFailed { .. }))
    }

    /// True for connectivity/protocol failures against the remote store.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, CacherError::Transport(_))
    }

    /// True when cached bytes could not be turned into the requested type.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, CacherError::Cache(CacheError::DecodeFailed { .. }))
    }
}

/// Result type alias for cacher operations.
pub type CacherResult<T> = Result<T, CacherError>;

// =============================================================================
// TESTS
// =============================================================================
