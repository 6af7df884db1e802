use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, IntoConnectionInfo, RedisError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
///
/// The mutex only guards the handle; callers clone the manager out of it
/// and issue commands on the clone, so commands never serialize on the lock.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Lower bound applied to configured command timeouts.
pub const MIN_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Redis connection pool shared by the cache store and the lock provider.
pub struct RedisPool {
    manager: SharedConnectionManager,
    command_timeout: Duration,
}

impl RedisPool {
    pub async fn connect(redis_url: &str, command_timeout: Duration) -> Result<Self> {
        let info = redis_url
            .into_connection_info()
            .context("failed to parse redis connection string")?;
        let addr = format!("{:?}", info.addr);

        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!(addr = %addr, "Redis connection manager ready");

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
            command_timeout: command_timeout.max(MIN_COMMAND_TIMEOUT),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
}

/// Clone a connection handle out of a shared manager.
pub async fn checkout(manager: &SharedConnectionManager) -> ConnectionManager {
    manager.lock().await.clone()
}

/// Run a redis command, mapping an elapsed deadline to an IO-kind `RedisError`
/// so callers see a transport failure rather than a hang.
pub async fn run_with_timeout<F, T>(limit: Duration, future: F) -> Result<T, RedisError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match timeout(limit, future).await {
        Ok(res) => res,
        Err(_) => Err(RedisError::from((
            redis::ErrorKind::IoError,
            "redis command timed out",
        ))),
    }
}

/// True when the error means Redis could not be reached (as opposed to a
/// command-level failure such as WRONGTYPE).
pub fn is_transport_error(err: &RedisError) -> bool {
    err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.kind() == redis::ErrorKind::IoError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_with_timeout_passes_through_result() {
        let result = run_with_timeout(Duration::from_secs(1), async { Ok::<_, RedisError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_run_with_timeout_elapsed_is_io_error() {
        let result = run_with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, RedisError>(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), redis::ErrorKind::IoError);
        assert!(is_transport_error(&err));
    }

    #[test]
    fn test_command_level_error_is_not_transport() {
        let err = RedisError::from((redis::ErrorKind::TypeError, "wrong type"));
        assert!(!is_transport_error(&err));
    }
}
