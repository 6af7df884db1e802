//! Redis-backed store.
//!
//! Entries are hashes `{data, sld}`; `sld` holds the sliding window in
//! milliseconds so a read can push the expiry forward atomically.

use super::CacheStore;
use crate::metrics::CacheMetrics;
use crate::{CacheError, CacheResult};
use redis::{AsyncCommands, Script};
use redis_utils::{checkout, run_with_timeout, RedisPool, SharedConnectionManager};
use std::time::Duration;
use tracing::{debug, warn};

const GET_SLIDING: &str = r#"
    local v = redis.call('HMGET', KEYS[1], 'data', 'sld')
    if not v[1] then
        return false
    end
    local sld = tonumber(v[2])
    if sld and sld > 0 then
        redis.call('PEXPIRE', KEYS[1], sld)
    end
    return v[1]
"#;

const SET_SLIDING: &str = r#"
    redis.call('DEL', KEYS[1])
    redis.call('HSET', KEYS[1], 'data', ARGV[1], 'sld', ARGV[2])
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
"#;

#[derive(Clone)]
pub struct RedisCacheStore {
    redis: SharedConnectionManager,
    command_timeout: Duration,
    get_script: Script,
    set_script: Script,
    metrics: CacheMetrics,
}

impl RedisCacheStore {
    pub fn new(redis: SharedConnectionManager, command_timeout: Duration) -> Self {
        Self {
            redis,
            command_timeout,
            get_script: Script::new(GET_SLIDING),
            set_script: Script::new(SET_SLIDING),
            metrics: CacheMetrics::new(),
        }
    }

    pub fn from_pool(pool: &RedisPool) -> Self {
        Self::new(pool.manager(), pool.command_timeout())
    }
}

fn sliding_millis(ttl: Duration) -> CacheResult<u64> {
    let ms = u64::try_from(ttl.as_millis())
        .map_err(|_| CacheError::Configuration(format!("sliding ttl {:?} too large", ttl)))?;
    if ms == 0 {
        return Err(CacheError::Configuration(
            "sliding ttl must be at least 1ms".into(),
        ));
    }
    Ok(ms)
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = checkout(&self.redis).await;
        let result: Option<Vec<u8>> = run_with_timeout(
            self.command_timeout,
            self.get_script.key(key).invoke_async(&mut conn),
        )
        .await
        .map_err(|e| {
            warn!(key = %key, error = %e, "Redis get error");
            self.metrics.record_error(key, "redis_get");
            CacheError::Redis(e)
        })?;

        debug!(key = %key, hit = result.is_some(), "Cache store get");
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], sliding_ttl: Duration) -> CacheResult<()> {
        let sld = sliding_millis(sliding_ttl)?;
        let mut conn = checkout(&self.redis).await;
        run_with_timeout(
            self.command_timeout,
            self.set_script
                .key(key)
                .arg(value)
                .arg(sld)
                .invoke_async::<_, i64>(&mut conn),
        )
        .await
        .map_err(|e| {
            warn!(key = %key, error = %e, "Redis set error");
            self.metrics.record_error(key, "redis_set");
            CacheError::Redis(e)
        })?;

        debug!(key = %key, sliding_ms = sld, bytes = value.len(), "Cache store set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = checkout(&self.redis).await;
        let removed: usize = run_with_timeout(self.command_timeout, conn.del(key))
            .await
            .map_err(CacheError::Redis)?;

        debug!(key = %key, removed, "Cache store delete");
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[&str]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = checkout(&self.redis).await;
        let removed: usize = run_with_timeout(self.command_timeout, conn.del(keys))
            .await
            .map_err(CacheError::Redis)?;

        debug!(count = keys.len(), removed, "Cache store delete many");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    async fn store() -> RedisCacheStore {
        let pool = RedisPool::connect(REDIS_URL, Duration::from_secs(2))
            .await
            .expect("Failed to connect to Redis");
        RedisCacheStore::from_pool(&pool)
    }

    #[test]
    fn test_sliding_millis() {
        assert_eq!(sliding_millis(Duration::from_secs(2)).unwrap(), 2000);
        assert!(sliding_millis(Duration::ZERO).is_err());
        assert!(sliding_millis(Duration::from_micros(10)).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_set_get_delete() {
        let store = store().await;
        let key = format!("{}:GroupDetail", uuid::Uuid::new_v4());

        assert_eq!(store.get(&key).await.unwrap(), None);

        store
            .set(&key, b"{\"id\":\"G1\"}", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(b"{\"id\":\"G1\"}".to_vec()));

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_read_slides_expiry() {
        let store = store().await;
        let key = format!("{}:upcoming_bills", uuid::Uuid::new_v4());

        store.set(&key, b"[]", Duration::from_millis(400)).await.unwrap();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(store.get(&key).await.unwrap().is_some());
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_delete_many_tolerates_absent_keys() {
        let store = store().await;
        let present = format!("{}:UserDetail", uuid::Uuid::new_v4());
        let absent = format!("{}:UserDetail", uuid::Uuid::new_v4());

        store.set(&present, b"{}", Duration::from_secs(30)).await.unwrap();

        let removed = store.delete_many(&[&present, &absent]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.delete_many(&[&present, &absent]).await.unwrap(), 0);
        assert_eq!(store.delete_many(&[]).await.unwrap(), 0);
    }
}
