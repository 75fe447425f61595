//! Typed retrieval helpers over the raw manager API.

use cacher_core::CacherResult;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::guard::LockGuard;
use super::item::CachedValue;
use super::manager::{BestEffort, CacheManager, Lookup};

/// Result of a typed lock-protected lookup.
#[derive(Debug)]
pub enum TypedLookup<T> {
    /// A cached value decoded into `T`.
    Found(T),
    /// A tombstone: the source of truth is known to have nothing.
    Absent,
    /// Nothing cached; the caller holds the population lock.
    Populate(LockGuard),
}

impl<T> TypedLookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, TypedLookup::Found(_))
    }

    pub fn into_found(self) -> Option<T> {
        match self {
            TypedLookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_guard(self) -> Option<LockGuard> {
        match self {
            TypedLookup::Populate(guard) => Some(guard),
            _ => None,
        }
    }
}

fn decode_lookup<T: DeserializeOwned>(key: &str, lookup: Lookup) -> CacherResult<TypedLookup<T>> {
    match lookup {
        Lookup::Populate(guard) => Ok(TypedLookup::Populate(guard)),
        Lookup::Hit(value) => Ok(match value.decode(key)? {
            Some(decoded) => TypedLookup::Found(decoded),
            None => TypedLookup::Absent,
        }),
    }
}

/// Look up a JSON-encoded value, taking the population lock on a miss.
///
/// A payload that fails to decode is an error; the caller does not receive a
/// lock in that case and should treat the key as corrupt.
pub async fn find_typed<T: DeserializeOwned>(
    manager: &CacheManager,
    key: &str,
) -> CacherResult<TypedLookup<T>> {
    let lookup = manager.get_or_lock(key).await?;
    decode_lookup(key, lookup)
}

/// Look up a JSON-encoded hash member, taking its population lock on a miss.
pub async fn find_hash_member_typed<T: DeserializeOwned>(
    manager: &CacheManager,
    bucket: &str,
    member: &str,
) -> CacherResult<TypedLookup<T>> {
    let lookup = manager.get_hash_member_or_lock(bucket, member).await?;
    decode_lookup(&format!("{}[{}]", bucket, member), lookup).inspect_err(|error| {
        tracing::error!(bucket, member, %error, "cached hash member could not be decoded");
    })
}

/// Read a raw string value without any locking.
///
/// A tombstone reads as the empty string; a missing key is
/// `KeyNotFound`.
pub async fn find_without_lock(manager: &CacheManager, key: &str) -> CacherResult<String> {
    let value = manager.get(key).await?;
    Ok(match value {
        CachedValue::Data(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        CachedValue::Tombstone => String::new(),
    })
}

/// Store a tombstone, logging instead of failing.
pub async fn store_nil_logged(manager: &CacheManager, key: &str) {
    manager.store_nil(key).await.or_log("store_nil", key);
}

/// A cached page of identifiers plus the total count of the full result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiResponse {
    pub ids: Vec<u64>,
    pub count: u64,
}

impl MultiResponse {
    pub fn new(ids: Vec<u64>, count: u64) -> Self {
        Self { ids, count }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Look up a cached [`MultiResponse`] stored as a hash member.
pub async fn find_multi_response(
    manager: &CacheManager,
    bucket: &str,
    member: &str,
) -> CacherResult<TypedLookup<MultiResponse>> {
    find_hash_member_typed(manager, bucket, member).await
}

/// Store a [`MultiResponse`] as a hash member.
pub async fn store_multi_response(
    manager: &CacheManager,
    bucket: &str,
    member: &str,
    response: &MultiResponse,
) -> CacherResult<()> {
    let bytes = serde_json::to_vec(response).map_err(|e| cacher_core::CacheError::EncodeFailed {
        key: bucket.to_string(),
        reason: e.to_string(),
    })?;
    manager.store_hash_member(bucket, member, bytes).await
}
