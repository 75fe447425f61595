//! Distributed lock lease data.
//!
//! A lease is the proof that one process currently holds the exclusive right
//! to populate a key. The remote store is the source of truth for whether the
//! lease is still valid; the timestamps here are the holder's local view.
//!
//! ```text
//! (free) ─── acquire ──→ held by token T ─── release(T) ──→ (free)
//!                               │
//!                         lease elapses ──→ (free)
//! ```

use crate::{HolderToken, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Prefix of every lock name in the lock store.
pub const LOCK_PREFIX: &str = "lock:";

/// Lock name guarding population of a plain key.
pub fn lock_name_for_key(key: &str) -> String {
    format!("{}{}", LOCK_PREFIX, key)
}

/// Lock name guarding population of one member of a hash bucket.
pub fn lock_name_for_member(bucket: &str, member: &str) -> String {
    format!("{}{}:{}", LOCK_PREFIX, bucket, member)
}

/// A held distributed lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockLease {
    /// Name of the lock in the lock store.
    pub name: String,
    /// Opaque holder token; only the holder can release.
    pub token: HolderToken,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl LockLease {
    /// Build a lease for a freshly generated holder token.
    pub fn issue(name: impl Into<String>, lease: Duration) -> Self {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease)
            .unwrap_or_else(|_| chrono::Duration::milliseconds(lease.as_millis() as i64));
        Self {
            name: name.into(),
            token: Uuid::now_v7(),
            acquired_at: now,
            expires_at: now + lease,
        }
    }

    /// Token as the string written into the lock store.
    pub fn token_str(&self) -> String {
        self.token.simple().to_string()
    }

    /// Check if the lease has elapsed based on the given time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Remaining duration until the lease elapses.
    pub fn remaining_duration(&self, now: Timestamp) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }
}
