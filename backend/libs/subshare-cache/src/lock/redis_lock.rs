//! Redis lock: `SET name token NX PX ttl`, released by compare-and-delete.

use super::{LockProvider, LockToken};
use crate::{CacheError, CacheResult};
use redis::{AsyncCommands, Script};
use redis_utils::{checkout, run_with_timeout, RedisPool, SharedConnectionManager};
use std::time::Duration;
use tracing::{debug, warn};

const RELEASE_IF_OWNER: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

#[derive(Clone)]
pub struct RedisLockProvider {
    redis: SharedConnectionManager,
    command_timeout: Duration,
    release_script: Script,
}

impl RedisLockProvider {
    pub fn new(redis: SharedConnectionManager, command_timeout: Duration) -> Self {
        Self {
            redis,
            command_timeout,
            release_script: Script::new(RELEASE_IF_OWNER),
        }
    }

    pub fn from_pool(pool: &RedisPool) -> Self {
        Self::new(pool.manager(), pool.command_timeout())
    }
}

#[async_trait::async_trait]
impl LockProvider for RedisLockProvider {
    async fn try_acquire(&self, resource: &str, ttl: Duration) -> CacheResult<Option<LockToken>> {
        let ttl_ms = usize::try_from(ttl.as_millis())
            .map_err(|_| CacheError::Configuration(format!("lock ttl {:?} too large", ttl)))?;
        if ttl_ms == 0 {
            return Err(CacheError::Configuration("lock ttl must be at least 1ms".into()));
        }

        let token = LockToken::generate();
        let mut conn = checkout(&self.redis).await;

        // SET key token NX PX ttl; true only when we created the key
        let acquired: bool = run_with_timeout(
            self.command_timeout,
            conn.set_options(
                resource,
                token.as_str(),
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::PX(ttl_ms)),
            ),
        )
        .await
        .map_err(|e| {
            warn!(lock = %resource, error = %e, "Lock acquire failed");
            CacheError::Redis(e)
        })?;

        if acquired {
            Ok(Some(token))
        } else {
            debug!(lock = %resource, "Lock held elsewhere");
            Ok(None)
        }
    }

    async fn release(&self, resource: &str, token: &LockToken) -> CacheResult<bool> {
        let mut conn = checkout(&self.redis).await;
        let deleted: i64 = run_with_timeout(
            self.command_timeout,
            self.release_script
                .key(resource)
                .arg(token.as_str())
                .invoke_async(&mut conn),
        )
        .await
        .map_err(|e| {
            warn!(lock = %resource, error = %e, "Lock release failed");
            CacheError::Redis(e)
        })?;

        Ok(deleted == 1)
    }
}
