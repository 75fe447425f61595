//! Redis-backed transport and lock coordinator.
//!
//! Data and locks use two independent `deadpool-redis` pools so that a burst
//! of lock polling can never starve ordinary reads and writes of connections.

use std::time::Duration;

use async_trait::async_trait;
use cacher_core::{CacherError, CacherResult, LockLease, RedisSettings, TransportError};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::Script;

use super::item::CachedValue;
use super::traits::{ExpiringWrite, KeyTtl, KvTransport, LockCoordinator};

/// Compare-and-delete: only the holder of the token may drop the lock.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Errors specific to the Redis backend.
#[derive(Debug, thiserror::Error)]
pub enum RedisStoreError {
    #[error("Failed to build connection pool: {0}")]
    PoolBuild(String),

    #[error("Failed to check out connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis {command} failed: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: redis::RedisError,
    },
}

impl From<RedisStoreError> for CacherError {
    fn from(e: RedisStoreError) -> Self {
        match e {
            RedisStoreError::PoolBuild(reason) => {
                TransportError::PoolUnavailable { reason }.into()
            }
            RedisStoreError::Pool(err) => TransportError::PoolUnavailable {
                reason: err.to_string(),
            }
            .into(),
            RedisStoreError::Command { command, source } => TransportError::CommandFailed {
                command: command.to_string(),
                reason: source.to_string(),
            }
            .into(),
        }
    }
}

fn command(command: &'static str) -> impl FnOnce(redis::RedisError) -> RedisStoreError {
    move |source| RedisStoreError::Command { command, source }
}

/// Milliseconds for `PX`/`PEXPIRE`; Redis rejects `PX 0`.
fn px(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

fn build_pool(url: &str, max_size: usize) -> Result<Pool, RedisStoreError> {
    let mut config = Config::from_url(url);
    config.pool = Some(PoolConfig::new(max_size));
    config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| RedisStoreError::PoolBuild(e.to_string()))
}

async fn checkout(pool: &Pool) -> Result<Connection, RedisStoreError> {
    Ok(pool.get().await?)
}

/// The pair of pools the engine runs on.
#[derive(Clone)]
pub struct RedisPools {
    pub data: Pool,
    pub lock: Pool,
}

impl RedisPools {
    /// Build both pools. Connections are opened lazily on first checkout.
    pub fn connect(settings: &RedisSettings) -> CacherResult<Self> {
        settings.validate()?;
        let data = build_pool(&settings.url, settings.max_connections)?;
        let lock = build_pool(&settings.lock_url, settings.lock_max_connections)?;
        tracing::info!(
            data_pool = settings.max_connections,
            lock_pool = settings.lock_max_connections,
            "redis pools configured"
        );
        Ok(Self { data, lock })
    }

    pub fn transport(&self) -> RedisTransport {
        RedisTransport::new(self.data.clone())
    }

    pub fn coordinator(&self) -> RedisLockCoordinator {
        RedisLockCoordinator::new(self.lock.clone())
    }
}

/// Key-value transport over the data pool.
#[derive(Clone)]
pub struct RedisTransport {
    pool: Pool,
}

impl RedisTransport {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvTransport for RedisTransport {
    async fn get(&self, key: &str) -> CacherResult<Option<CachedValue>> {
        let mut conn = checkout(&self.pool).await?;
        let (exists, value): (bool, Option<Vec<u8>>) = redis::pipe()
            .atomic()
            .cmd("EXISTS")
            .arg(key)
            .cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command("EXISTS/GET"))?;
        Ok(exists.then(|| CachedValue::from_bytes(value.unwrap_or_default())))
    }

    async fn get_hash_member(
        &self,
        bucket: &str,
        member: &str,
    ) -> CacherResult<Option<CachedValue>> {
        let mut conn = checkout(&self.pool).await?;
        let (exists, value): (bool, Option<Vec<u8>>) = redis::pipe()
            .atomic()
            .cmd("HEXISTS")
            .arg(bucket)
            .arg(member)
            .cmd("HGET")
            .arg(bucket)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(command("HEXISTS/HGET"))?;
        Ok(exists.then(|| CachedValue::from_bytes(value.unwrap_or_default())))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacherResult<()> {
        let mut conn = checkout(&self.pool).await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(px(ttl))
            .query_async(&mut conn)
            .await
            .map_err(command("SET"))?;
        Ok(())
    }

    async fn set_many(&self, writes: &[ExpiringWrite<'_>]) -> CacherResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for write in writes {
            pipe.cmd("SET")
                .arg(write.key)
                .arg(write.value)
                .arg("PX")
                .arg(px(write.ttl))
                .ignore();
        }
        let mut conn = checkout(&self.pool).await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(command("MULTI/SET"))?;
        Ok(())
    }

    async fn set_hash_members(
        &self,
        bucket: &str,
        members: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> CacherResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (member, value) in members {
            pipe.cmd("HSET").arg(bucket).arg(member).arg(value).ignore();
        }
        pipe.cmd("PEXPIRE").arg(bucket).arg(px(ttl)).ignore();
        let mut conn = checkout(&self.pool).await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(command("MULTI/HSET"))?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacherResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = checkout(&self.pool).await?;
        let removed: u64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(command("DEL"))?;
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> CacherResult<i64> {
        let mut conn = checkout(&self.pool).await?;
        let value: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command("INCR"))?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacherResult<bool> {
        let mut conn = checkout(&self.pool).await?;
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(command("PEXPIRE"))?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> CacherResult<KeyTtl> {
        let mut conn = checkout(&self.pool).await?;
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command("PTTL"))?;
        Ok(KeyTtl::from_pttl(millis))
    }

    async fn ping(&self) -> CacherResult<()> {
        let mut conn = checkout(&self.pool).await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command("PING"))?;
        Ok(())
    }
}

/// Lock coordinator over the lock pool.
///
/// Acquisition is `SET name token NX PX lease`; release runs a
/// compare-and-delete script so a holder whose lease already elapsed cannot
/// delete a successor's lock.
#[derive(Clone)]
pub struct RedisLockCoordinator {
    pool: Pool,
    release_script: Script,
}

impl RedisLockCoordinator {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn try_acquire(&self, name: &str, lease: Duration) -> CacherResult<Option<LockLease>> {
        let candidate = LockLease::issue(name, lease);
        let mut conn = checkout(&self.pool).await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(candidate.token_str())
            .arg("NX")
            .arg("PX")
            .arg(px(lease))
            .query_async(&mut conn)
            .await
            .map_err(command("SET NX"))?;
        Ok(reply.map(|_| candidate))
    }

    async fn release(&self, lease: &LockLease) -> CacherResult<bool> {
        let mut conn = checkout(&self.pool).await?;
        let deleted: i64 = self
            .release_script
            .key(&lease.name)
            .arg(lease.token_str())
            .invoke_async(&mut conn)
            .await
            .map_err(command("EVALSHA"))?;
        Ok(deleted == 1)
    }

    async fn is_locked(&self, name: &str) -> CacherResult<bool> {
        let mut conn = checkout(&self.pool).await?;
        let exists: bool = redis::cmd("EXISTS")
            .arg(name)
            .query_async(&mut conn)
            .await
            .map_err(command("EXISTS"))?;
        Ok(exists)
    }

    async fn ping(&self) -> CacherResult<()> {
        let mut conn = checkout(&self.pool).await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command("PING"))?;
        Ok(())
    }
}
