//! Distributed lock provider
//!
//! A named, TTL-bounded mutual exclusion visible to every process sharing the
//! provider. The TTL is enforced by the provider itself, so a crashed holder
//! cannot wedge a name past it. Release only succeeds for the token that
//! acquired the lock.

mod memory;
mod redis_lock;

pub use self::memory::MemoryLockProvider;
pub use self::redis_lock::RedisLockProvider;

use crate::CacheResult;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ownership token for an acquired lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait::async_trait]
pub trait LockProvider: Send + Sync {
    /// Single non-blocking attempt. `Ok(None)` means another holder owns it.
    async fn try_acquire(&self, resource: &str, ttl: Duration) -> CacheResult<Option<LockToken>>;

    /// Release if `token` still owns the lock. Returns whether it did.
    async fn release(&self, resource: &str, token: &LockToken) -> CacheResult<bool>;
}

/// Timing of one bounded-wait acquisition.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Server-side liveness of the lock once granted
    pub ttl: Duration,
    /// How long a single acquisition keeps trying
    pub wait: Duration,
    /// Pause between attempts inside `wait`
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            wait: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Held lock. Call [`LockGuard::release`] on every path; if the guard is
/// dropped instead (e.g. the owning future was cancelled), release is
/// handed to a background task.
pub struct LockGuard {
    provider: Arc<dyn LockProvider>,
    resource: String,
    token: Option<LockToken>,
}

impl LockGuard {
    pub async fn release(mut self) -> CacheResult<bool> {
        match self.token.take() {
            Some(token) => {
                let released = self.provider.release(&self.resource, &token).await?;
                if !released {
                    // TTL ran out and someone else may hold it now
                    warn!(lock = %self.resource, "Lock expired before release");
                }
                debug!(lock = %self.resource, released, "Lock released");
                Ok(released)
            }
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let provider = self.provider.clone();
        let resource = std::mem::take(&mut self.resource);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = provider.release(&resource, &token).await {
                        warn!(lock = %resource, error = %e, "Deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(lock = %resource, "No runtime to release lock; left to expire");
            }
        }
    }
}

/// Outcome of a bounded-wait acquisition.
pub enum Acquisition {
    Held(LockGuard),
    /// The wait elapsed with the lock still held elsewhere
    Busy,
    Cancelled,
}

/// Acquire `resource`, retrying every `poll_interval` for up to `wait`.
///
/// Each `try_acquire` runs to completion, so a lock granted on the server is
/// always wrapped in a guard. `cancel` is honoured before each attempt and
/// during the poll sleep; a grant that races with cancellation is released
/// before returning [`Acquisition::Cancelled`]. Provider errors are returned
/// immediately so the caller can count them.
pub async fn acquire(
    provider: &Arc<dyn LockProvider>,
    resource: &str,
    options: &LockOptions,
    cancel: &CancellationToken,
) -> CacheResult<Acquisition> {
    let deadline = Instant::now() + options.wait;

    loop {
        if cancel.is_cancelled() {
            return Ok(Acquisition::Cancelled);
        }

        if let Some(token) = provider.try_acquire(resource, options.ttl).await? {
            let guard = LockGuard {
                provider: provider.clone(),
                resource: resource.to_string(),
                token: Some(token),
            };

            if cancel.is_cancelled() {
                debug!(lock = %resource, "Lock granted after cancellation; releasing");
                if let Err(e) = guard.release().await {
                    warn!(lock = %resource, error = %e, "Failed to release lock after cancellation");
                }
                return Ok(Acquisition::Cancelled);
            }

            debug!(lock = %resource, ttl_ms = options.ttl.as_millis() as u64, "Lock acquired");
            return Ok(Acquisition::Held(guard));
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(lock = %resource, "Lock wait elapsed");
            return Ok(Acquisition::Busy);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Acquisition::Cancelled),
            _ = tokio::time::sleep(options.poll_interval.min(deadline - now)) => {}
        }
    }
}
