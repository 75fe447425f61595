//! Population lock guard.

use std::fmt;
use std::sync::Arc;

use cacher_core::{CacherResult, LockLease};
use tokio::runtime::Handle;

use super::traits::LockCoordinator;

/// Proof that the caller is responsible for populating a key.
///
/// Release it explicitly with [`LockGuard::release`] or [`safe_release`]
/// once the value (or a tombstone) has been stored. A guard that is simply
/// dropped still releases its lock in the background when a tokio runtime
/// is available; otherwise the lease elapses on its own.
#[must_use = "the population lock stays held until released or its lease elapses"]
pub struct LockGuard {
    lease: Option<LockLease>,
    coordinator: Option<Arc<dyn LockCoordinator>>,
}

impl LockGuard {
    pub(crate) fn held(lease: LockLease, coordinator: Arc<dyn LockCoordinator>) -> Self {
        Self {
            lease: Some(lease),
            coordinator: Some(coordinator),
        }
    }

    /// Guard that holds nothing; used when caching is bypassed.
    pub(crate) fn unlocked() -> Self {
        Self {
            lease: None,
            coordinator: None,
        }
    }

    pub fn is_held(&self) -> bool {
        self.lease.is_some()
    }

    pub fn lease(&self) -> Option<&LockLease> {
        self.lease.as_ref()
    }

    /// Release the lock. Returns false if nothing was held or the lease had
    /// already elapsed.
    pub async fn release(mut self) -> CacherResult<bool> {
        match (self.lease.take(), self.coordinator.take()) {
            (Some(lease), Some(coordinator)) => {
                let released = coordinator.release(&lease).await?;
                tracing::debug!(lock = %lease.name, released, "population lock released");
                Ok(released)
            }
            _ => Ok(false),
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let (Some(lease), Some(coordinator)) = (self.lease.take(), self.coordinator.take()) else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = coordinator.release(&lease).await {
                        tracing::warn!(lock = %lease.name, %error, "background lock release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    lock = %lease.name,
                    "lock guard dropped outside a runtime; lease will elapse"
                );
            }
        }
    }
}

/// Release a guard if there is one. Never fails: release errors are logged
/// and the lease is left to elapse.
pub async fn safe_release(guard: Option<LockGuard>) {
    let Some(guard) = guard else {
        return;
    };
    let name = guard.lease().map(|l| l.name.clone());
    if let Err(error) = guard.release().await {
        tracing::warn!(lock = ?name, %error, "lock release failed; lease will elapse");
    }
}
