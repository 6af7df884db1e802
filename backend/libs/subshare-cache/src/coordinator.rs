//! Cache-aside reads with at most one recompute per key across the fleet.
//!
//! ```text
//! get_or_populate(key)
//!   GET key ──hit──▶ return                    (never touches the lock)
//!     │miss
//!     ▼
//!   acquire lock:key (bounded wait) ──elapsed──▶ sleep backoff, GET key ──hit──▶ return
//!     │acquired                                        │miss
//!     ▼                                                └──▶ acquire again
//!   GET key ──hit──▶ release, return
//!     │miss
//!     ▼
//!   recompute() ──err──▶ release, return Recompute(err)   (nothing cached)
//!     │ok
//!     ▼
//!   SET key (sliding ttl), release, return
//! ```
//!
//! Consistency window: a population that read the system of record before a
//! mutation committed but writes after that mutation's invalidation ran
//! leaves the superseded value cached until the next invalidation of the
//! key or its sliding expiry. Nothing here orders invalidation against
//! population.
//!
//! The lock is not extended while `recompute` runs. A recompute that
//! outlives the lock TTL lets another instance take the lock and recompute
//! the same key concurrently; the later write wins. Keep `lock_ttl_ms` well
//! above the slowest expected recompute.
//!
//! Provider failures (store reads, lock calls) are counted per call. With
//! `fail_open_after = Some(n)`, the n-th consecutive failure makes the call
//! recompute without the lock, trading stampede protection for
//! availability. With `None` the call keeps retrying until its deadline or
//! cancellation.

use crate::codec;
use crate::config::CacheConfig;
use crate::keys::CacheKey;
use crate::lock::{self, Acquisition, LockGuard, LockOptions, LockProvider, RedisLockProvider};
use crate::metrics::CacheMetrics;
use crate::store::{CacheStore, RedisCacheStore};
use crate::{CacheError, CacheResult, Cancelled, PopulateError};
use redis_utils::RedisPool;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing and failure policy of the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub lock: LockOptions,
    pub retry_backoff: Duration,
    pub max_wait: Duration,
    pub fail_open_after: Option<u32>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CoordinatorSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            lock: config.lock_options(),
            retry_backoff: config.retry_backoff(),
            max_wait: config.max_wait(),
            fail_open_after: config.fail_open_after(),
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Miss,
    Unavailable,
}

#[derive(Clone)]
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    locks: Arc<dyn LockProvider>,
    settings: CoordinatorSettings,
    metrics: CacheMetrics,
}

impl CacheCoordinator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        locks: Arc<dyn LockProvider>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            locks,
            settings,
            metrics: CacheMetrics::new(),
        }
    }

    /// Redis-backed coordinator; store and lock share one connection manager.
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let pool = RedisPool::connect(&config.redis_url, config.redis_command_timeout())
            .await
            .map_err(|e| CacheError::Unavailable(format!("{:#}", e)))?;

        info!(
            lock_wait_ms = config.lock_wait_ms,
            lock_ttl_ms = config.lock_ttl_ms,
            retry_backoff_ms = config.retry_backoff_ms,
            fail_open_after = config.fail_open_after,
            "Cache coordinator connected"
        );

        Ok(Self::new(
            Arc::new(RedisCacheStore::from_pool(&pool)),
            Arc::new(RedisLockProvider::from_pool(&pool)),
            CoordinatorSettings::from(config),
        ))
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        self.store.clone()
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Read `key`, or recompute it under `lock:{key}` and cache it for the
    /// sliding `ttl`.
    ///
    /// `recompute` runs at most once per call and only while this call holds
    /// the key's lock (or after failing open). Its error comes back as
    /// [`PopulateError::Recompute`] and nothing is cached.
    pub async fn get_or_populate<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        recompute: F,
        cancel: &CancellationToken,
    ) -> Result<T, PopulateError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if ttl.is_zero() {
            return Err(CacheError::Configuration("sliding ttl must be positive".into()).into());
        }

        let started = Instant::now();
        let mut provider_failures = 0u32;

        match or_cancel(cancel, self.lookup::<T>(key)).await? {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Miss => {}
            Lookup::Unavailable => provider_failures += 1,
        }

        let deadline = started + self.settings.max_wait;
        let lock_name = key.lock_name();

        loop {
            if self.should_fail_open(provider_failures) {
                warn!(
                    key = %key,
                    failures = provider_failures,
                    "Cache providers failing; recomputing without lock"
                );
                self.metrics.record_fail_open(key.as_str());
                let value = self.run_recompute(key, recompute, cancel).await?;
                self.write_back(key, &value, ttl).await;
                return Ok(value);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let options = LockOptions {
                wait: self.settings.lock.wait.min(remaining),
                ..self.settings.lock
            };

            // Not raced against `cancel`: a grant must always end up in a guard
            match lock::acquire(&self.locks, &lock_name, &options, cancel).await {
                Ok(Acquisition::Held(guard)) => {
                    return self.populate_locked(guard, key, ttl, recompute, cancel).await;
                }
                Ok(Acquisition::Cancelled) => return Err(PopulateError::Cancelled),
                Ok(Acquisition::Busy) => {
                    provider_failures = 0;
                    debug!(key = %key, "Lock held by another caller; waiting for its result");
                    self.metrics.record_lock_contention(key.as_str());
                }
                Err(e) => {
                    provider_failures += 1;
                    warn!(key = %key, error = %e, failures = provider_failures, "Lock provider error");
                    self.metrics.record_provider_failure(key.as_str(), "lock");
                }
            }

            let now = Instant::now();
            if now + self.settings.retry_backoff > deadline {
                let waited = now - started;
                warn!(key = %key, waited_ms = waited.as_millis() as u64, "Cache population deadline exceeded");
                return Err(PopulateError::DeadlineExceeded {
                    key: key.to_string(),
                    waited,
                });
            }
            or_cancel(cancel, tokio::time::sleep(self.settings.retry_backoff)).await?;

            match or_cancel(cancel, self.lookup::<T>(key)).await? {
                Lookup::Hit(value) => return Ok(value),
                Lookup::Miss => {}
                Lookup::Unavailable => provider_failures += 1,
            }
        }
    }

    /// Read without populating. A payload that no longer decodes reads as
    /// absent; transport failures are returned.
    pub async fn peek<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheResult<Option<T>> {
        match self.store.get(key.as_str()).await? {
            Some(bytes) => Ok(codec::decode(&bytes).ok()),
            None => Ok(None),
        }
    }

    fn should_fail_open(&self, provider_failures: u32) -> bool {
        matches!(self.settings.fail_open_after, Some(n) if provider_failures >= n)
    }

    async fn populate_locked<T, F, Fut, E>(
        &self,
        guard: LockGuard,
        key: &CacheKey,
        ttl: Duration,
        recompute: F,
        cancel: &CancellationToken,
    ) -> Result<T, PopulateError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let outcome = self
            .recompute_under_lock(key, ttl, recompute, cancel)
            .await;

        if let Err(e) = guard.release().await {
            // TTL frees it eventually
            warn!(key = %key, error = %e, "Failed to release cache lock");
            self.metrics.record_provider_failure(key.as_str(), "lock");
        }
        outcome
    }

    async fn recompute_under_lock<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        recompute: F,
        cancel: &CancellationToken,
    ) -> Result<T, PopulateError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Another holder may have populated between our miss and the lock
        if let Lookup::Hit(value) = or_cancel(cancel, self.lookup::<T>(key)).await? {
            return Ok(value);
        }
        let value = self.run_recompute(key, recompute, cancel).await?;
        self.write_back(key, &value, ttl).await;
        Ok(value)
    }

    async fn run_recompute<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        recompute: F,
        cancel: &CancellationToken,
    ) -> Result<T, PopulateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        debug!(key = %key, "Recomputing cache value");
        match or_cancel(cancel, recompute()).await? {
            Ok(value) => {
                self.metrics.record_recompute(key.as_str(), true);
                Ok(value)
            }
            Err(e) => {
                debug!(key = %key, "Recompute failed; nothing cached");
                self.metrics.record_recompute(key.as_str(), false);
                Err(PopulateError::Recompute(e))
            }
        }
    }

    /// Best-effort write. The caller already has its value, so a failed
    /// write only costs a future recompute.
    async fn write_back<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let bytes = match codec::encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(key = %key, error = %e, "Cache value failed to serialize");
                self.metrics.record_error(key.as_str(), "encode");
                return;
            }
        };

        match self.store.set(key.as_str(), &bytes, ttl).await {
            Ok(()) => {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache populated");
                self.metrics.record_write(key.as_str());
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache write failed");
                self.metrics.record_provider_failure(key.as_str(), "store");
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Lookup<T> {
        match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => match codec::decode::<T>(&bytes) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    self.metrics.record_hit(key.as_str());
                    Lookup::Hit(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cached value failed to decode; treating as miss");
                    self.metrics.record_error(key.as_str(), "decode");
                    Lookup::Miss
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss(key.as_str());
                Lookup::Miss
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache store read failed");
                self.metrics.record_provider_failure(key.as_str(), "store");
                Lookup::Unavailable
            }
        }
    }
}

/// Race `fut` against cancellation; cancellation wins ties.
pub async fn or_cancel<O>(
    cancel: &CancellationToken,
    fut: impl Future<Output = O>,
) -> Result<O, Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}
