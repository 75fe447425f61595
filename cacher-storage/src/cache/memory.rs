//! In-process store implementing both the transport and the lock traits.
//!
//! Mirrors the Redis semantics the engine relies on (lazy expiry, `SET NX`
//! locks, `INCR` on missing keys, `WRONGTYPE` on hash/string mix-ups) on top
//! of a mutex-guarded map. Expiry follows the tokio clock so tests can
//! drive time with `tokio::time::advance`.
//!
//! Expired keys are evicted when touched, and writes sweep the whole map at
//! most once per [`SWEEP_INTERVAL`] so keys that are never read again do not
//! accumulate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cacher_core::{CacherResult, LockLease, TransportError};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use super::item::CachedValue;
use super::traits::{ExpiringWrite, KeyTtl, KvTransport, LockCoordinator};

#[derive(Debug, Clone)]
enum Slot {
    Scalar(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn scalar(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            slot: Slot::Scalar(value),
            expires_at: Some(Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Minimum store-clock time between two full sweeps of expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<String, Entry>,
    last_sweep: Option<Instant>,
}

impl Table {
    fn sweep_if_due(&mut self) {
        let now = Instant::now();
        if self
            .last_sweep
            .is_some_and(|at| now.saturating_duration_since(at) < SWEEP_INTERVAL)
        {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        self.last_sweep = Some(now);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::trace!(evicted, "swept expired entries");
        }
    }
}

fn wrong_type(command: &str) -> TransportError {
    TransportError::CommandFailed {
        command: command.to_string(),
        reason: "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    }
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    table: Mutex<Table>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails with a transport error
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.table
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every key.
    pub async fn flush(&self) {
        self.table.lock().await.entries.clear();
    }

    /// Lock the table for a mutation, sweeping expired entries first when due.
    async fn writable(&self) -> MutexGuard<'_, Table> {
        let mut table = self.table.lock().await;
        table.sweep_if_due();
        table
    }

    fn check_online(&self) -> CacherResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable {
                reason: "in-memory store is offline".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Live entry for `key`, evicting it first if it has expired.
    fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if map.get(key).is_some_and(|e| !e.is_live(now)) {
            map.remove(key);
        }
        map.get_mut(key)
    }
}

#[async_trait]
impl KvTransport for InMemoryStore {
    async fn get(&self, key: &str) -> CacherResult<Option<CachedValue>> {
        self.check_online()?;
        let mut table = self.table.lock().await;
        let map = &mut table.entries;
        match Self::live(map, key) {
            None => Ok(None),
            Some(Entry {
                slot: Slot::Scalar(bytes),
                ..
            }) => Ok(Some(CachedValue::from_bytes(bytes.clone()))),
            Some(_) => Err(wrong_type("GET").into()),
        }
    }

    async fn get_hash_member(
        &self,
        bucket: &str,
        member: &str,
    ) -> CacherResult<Option<CachedValue>> {
        self.check_online()?;
        let mut table = self.table.lock().await;
        let map = &mut table.entries;
        match Self::live(map, bucket) {
            None => Ok(None),
            Some(Entry {
                slot: Slot::Hash(members),
                ..
            }) => Ok(members
                .get(member)
                .map(|bytes| CachedValue::from_bytes(bytes.clone()))),
            Some(_) => Err(wrong_type("HGET").into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacherResult<()> {
        self.check_online()?;
        self.writable()
            .await
            .entries
            .insert(key.to_string(), Entry::scalar(value.to_vec(), ttl));
        Ok(())
    }

    async fn set_many(&self, writes: &[ExpiringWrite<'_>]) -> CacherResult<()> {
        self.check_online()?;
        let mut table = self.writable().await;
        let map = &mut table.entries;
        for write in writes {
            map.insert(
                write.key.to_string(),
                Entry::scalar(write.value.to_vec(), write.ttl),
            );
        }
        Ok(())
    }

    async fn set_hash_members(
        &self,
        bucket: &str,
        members: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> CacherResult<()> {
        self.check_online()?;
        let mut table = self.writable().await;
        let map = &mut table.entries;
        let expires_at = Some(Instant::now() + ttl);
        match Self::live(map, bucket) {
            Some(Entry {
                slot: Slot::Hash(existing),
                expires_at: at,
            }) => {
                for (member, value) in members {
                    existing.insert(member.clone(), value.clone());
                }
                *at = expires_at;
            }
            Some(_) => return Err(wrong_type("HSET").into()),
            None => {
                let hash = members.iter().cloned().collect();
                map.insert(
                    bucket.to_string(),
                    Entry {
                        slot: Slot::Hash(hash),
                        expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacherResult<u64> {
        self.check_online()?;
        let mut table = self.writable().await;
        let map = &mut table.entries;
        let mut removed = 0;
        for key in keys {
            if Self::live(map, key).is_some() {
                map.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> CacherResult<i64> {
        self.check_online()?;
        let mut table = self.writable().await;
        let map = &mut table.entries;
        match Self::live(map, key) {
            None => {
                map.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::Scalar(b"1".to_vec()),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
            Some(Entry {
                slot: Slot::Scalar(bytes),
                ..
            }) => {
                let current: i64 = std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| TransportError::CommandFailed {
                        command: "INCR".to_string(),
                        reason: "ERR value is not an integer or out of range".to_string(),
                    })?;
                let next = current + 1;
                *bytes = next.to_string().into_bytes();
                Ok(next)
            }
            Some(_) => Err(wrong_type("INCR").into()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacherResult<bool> {
        self.check_online()?;
        let mut table = self.writable().await;
        let map = &mut table.entries;
        if ttl.is_zero() {
            // A non-positive expiry deletes the key outright.
            let existed = Self::live(map, key).is_some();
            map.remove(key);
            return Ok(existed);
        }
        match Self::live(map, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> CacherResult<KeyTtl> {
        self.check_online()?;
        let mut table = self.table.lock().await;
        let map = &mut table.entries;
        let now = Instant::now();
        Ok(match Self::live(map, key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expiring(at.saturating_duration_since(now)),
        })
    }

    async fn ping(&self) -> CacherResult<()> {
        self.check_online()
    }
}

#[async_trait]
impl LockCoordinator for InMemoryStore {
    async fn try_acquire(&self, name: &str, lease: Duration) -> CacherResult<Option<LockLease>> {
        self.check_online()?;
        let mut table = self.writable().await;
        let map = &mut table.entries;
        if Self::live(map, name).is_some() {
            return Ok(None);
        }
        let acquired = LockLease::issue(name, lease);
        map.insert(
            name.to_string(),
            Entry::scalar(acquired.token_str().into_bytes(), lease),
        );
        Ok(Some(acquired))
    }

    async fn release(&self, lease: &LockLease) -> CacherResult<bool> {
        self.check_online()?;
        let mut table = self.writable().await;
        let map = &mut table.entries;
        let token = lease.token_str();
        let owned = matches!(
            Self::live(map, &lease.name),
            Some(Entry { slot: Slot::Scalar(bytes), .. }) if bytes.as_slice() == token.as_bytes()
        );
        if owned {
            map.remove(&lease.name);
        }
        Ok(owned)
    }

    async fn is_locked(&self, name: &str) -> CacherResult<bool> {
        self.check_online()?;
        let mut table = self.table.lock().await;
        let map = &mut table.entries;
        Ok(Self::live(map, name).is_some())
    }

    async fn ping(&self) -> CacherResult<()> {
        self.check_online()
    }
}
