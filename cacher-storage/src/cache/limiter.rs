//! Failed-attempt lockout built on cache counters.
//!
//! Each failure increments a counter key and pushes its expiry out to the
//! full window, so an identity stays locked until it has gone quiet for one
//! whole window.

use std::time::Duration;

use cacher_core::{CacherResult, LockoutPolicy};

use super::manager::CacheManager;

/// Counts failures per identity and reports lockout.
#[derive(Clone)]
pub struct AttemptLimiter {
    manager: CacheManager,
    policy: LockoutPolicy,
    action: String,
}

impl AttemptLimiter {
    /// Limiter for one action (e.g. `"login"`), keyed per identity.
    ///
    /// Rejects policies with no attempts or a zero window; a zero window
    /// would expire the counter on every failure.
    pub fn new(
        manager: CacheManager,
        policy: LockoutPolicy,
        action: impl Into<String>,
    ) -> CacherResult<Self> {
        policy.validate()?;
        Ok(Self {
            manager,
            policy,
            action: action.into(),
        })
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Counter key for an identity.
    pub fn key(&self, identity: &str) -> String {
        self.manager.namespace().counter(&self.action, identity)
    }

    /// Whether the identity has reached the attempt limit inside a live window.
    pub async fn is_locked(&self, identity: &str) -> CacherResult<bool> {
        Ok(self.remaining_lockout(identity).await?.is_some())
    }

    /// Time left before a locked identity may try again.
    pub async fn remaining_lockout(&self, identity: &str) -> CacherResult<Option<Duration>> {
        let key = self.key(identity);
        let ttl = self.manager.get_ttl(&key).await?;
        if !ttl.is_expiring() {
            return Ok(None);
        }
        let attempts = self.manager.get_counter(&key).await?;
        Ok((attempts >= self.policy.max_attempts)
            .then(|| ttl.remaining())
            .flatten())
    }

    /// Record one failure and return the running count.
    pub async fn record_failure(&self, identity: &str) -> CacherResult<i64> {
        let key = self.key(identity);
        let attempts = self.manager.increase_cached_value_by_one(&key).await?;
        self.manager.expire(&key, self.policy.window).await?;
        if attempts >= self.policy.max_attempts {
            tracing::info!(action = %self.action, identity, attempts, "attempt limit reached");
        }
        Ok(attempts)
    }

    /// Clear the counter, e.g. after a successful attempt.
    pub async fn reset(&self, identity: &str) -> CacherResult<()> {
        self.manager.delete_by_keys(&[self.key(identity)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryStore;
    use cacher_core::CacheConfig;
    use std::sync::Arc;

    fn manager() -> CacheManager {
        CacheManager::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            CacheConfig::new().with_key_prefix("app").with_environment("test"),
        )
        .unwrap()
    }

    fn limiter(policy: LockoutPolicy) -> AttemptLimiter {
        AttemptLimiter::new(manager(), policy, "login").unwrap()
    }

    #[test]
    fn test_rejects_zero_window() {
        let err = AttemptLimiter::new(manager(), LockoutPolicy::new(3, Duration::ZERO), "login")
            .err()
            .unwrap();
        assert!(matches!(err, cacher_core::CacherError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = AttemptLimiter::new(manager(), LockoutPolicy::new(0, Duration::from_secs(60)), "login")
            .err()
            .unwrap();
        assert!(matches!(err, cacher_core::CacherError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_locks_after_max_attempts() {
        let limiter = limiter(LockoutPolicy::new(3, Duration::from_secs(300)));
        for expected in 1..=2 {
            assert_eq!(limiter.record_failure("a@b.c").await.unwrap(), expected);
            assert!(!limiter.is_locked("a@b.c").await.unwrap());
        }
        assert_eq!(limiter.record_failure("a@b.c").await.unwrap(), 3);
        assert!(limiter.is_locked("a@b.c").await.unwrap());
        assert_eq!(
            limiter.remaining_lockout("a@b.c").await.unwrap(),
            Some(Duration::from_secs(300))
        );
        assert!(!limiter.is_locked("other@b.c").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_lifts_after_window() {
        let limiter = limiter(LockoutPolicy::new(2, Duration::from_secs(60)));
        limiter.record_failure("u").await.unwrap();
        limiter.record_failure("u").await.unwrap();
        assert!(limiter.is_locked("u").await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!limiter.is_locked("u").await.unwrap());
        assert_eq!(limiter.record_failure("u").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_counter() {
        let limiter = limiter(LockoutPolicy::new(1, Duration::from_secs(60)));
        limiter.record_failure("u").await.unwrap();
        assert!(limiter.is_locked("u").await.unwrap());
        limiter.reset("u").await.unwrap();
        assert!(!limiter.is_locked("u").await.unwrap());
    }

    #[test]
    fn test_key_is_namespaced() {
        let limiter = limiter(LockoutPolicy::default());
        let key = limiter.key("a=b&c");
        assert!(key.starts_with("app_test_"));
        assert!(!key.contains('=') && !key.contains('&'));
    }
}
