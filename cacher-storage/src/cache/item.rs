//! Cached values and write items.

use std::time::Duration;

use cacher_core::{CacheError, CacherResult, Timestamp};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};

/// A value read back from the store.
///
/// The zero-length byte string is reserved as the "known absent" marker, so
/// an empty payload always reads back as [`CachedValue::Tombstone`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    /// Cached payload bytes (never empty).
    Data(Vec<u8>),
    /// The source of truth was consulted and had nothing for this key.
    Tombstone,
}

impl CachedValue {
    /// Classify raw bytes read from the store.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            CachedValue::Tombstone
        } else {
            CachedValue::Data(bytes)
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, CachedValue::Tombstone)
    }

    /// Payload bytes, or `None` for a tombstone.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CachedValue::Data(bytes) => Some(bytes),
            CachedValue::Tombstone => None,
        }
    }

    /// Bytes as stored on the wire (empty for a tombstone).
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            CachedValue::Data(bytes) => bytes,
            CachedValue::Tombstone => Vec::new(),
        }
    }

    /// Decode a JSON payload. A tombstone decodes to `None`.
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> CacherResult<Option<T>> {
        match self {
            CachedValue::Tombstone => Ok(None),
            CachedValue::Data(bytes) => serde_json::from_slice(bytes).map(Some).map_err(|e| {
                CacheError::DecodeFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
        }
    }
}

/// One pending write: a key, its payload and an optional custom TTL.
///
/// Without a custom TTL the manager's default TTL applies. A custom TTL of
/// zero means "do not cache" and the item is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    pub key: String,
    pub value: Vec<u8>,
    pub ttl: Option<Duration>,
}

impl CacheItem {
    /// Item that expires after the default TTL.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    /// Item with a custom TTL.
    pub fn with_ttl(key: impl Into<String>, value: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: Some(ttl),
        }
    }

    /// Item holding the JSON encoding of `value`.
    pub fn json<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> CacherResult<Self> {
        let key = key.into();
        let value = serde_json::to_vec(value).map_err(|e| CacheError::EncodeFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(key, value))
    }

    /// Tombstone item for a key whose source lookup found nothing.
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self::new(key, Vec::new())
    }

    /// Override the TTL.
    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Expire at an absolute instant, e.g. a token's own expiry.
    ///
    /// An instant already in the past yields a zero TTL, so the item is
    /// skipped on write.
    pub fn expire_at(mut self, at: Timestamp) -> Self {
        let remaining = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.ttl = Some(remaining);
        self
    }

    /// TTL to write with, given the manager's default.
    pub fn effective_ttl(&self, default_ttl: Duration) -> Duration {
        self.ttl.unwrap_or(default_ttl)
    }
}
