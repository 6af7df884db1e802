//! Cache error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// Store or lock provider could not be reached.
    pub fn is_unavailable(&self) -> bool {
        match self {
            CacheError::Redis(e) => redis_utils::is_transport_error(e),
            CacheError::Unavailable(_) => true,
            _ => false,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Failure of [`CacheCoordinator::get_or_populate`](crate::CacheCoordinator::get_or_populate).
///
/// `E` is the caller's recompute error, returned untouched.
#[derive(Error, Debug)]
pub enum PopulateError<E> {
    #[error("Recompute failed: {0}")]
    Recompute(E),

    #[error("Cache population cancelled")]
    Cancelled,

    #[error("Gave up waiting for lock on {key} after {waited:?}")]
    DeadlineExceeded { key: String, waited: Duration },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// The caller's cancellation token fired.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

impl<E> From<Cancelled> for PopulateError<E> {
    fn from(_: Cancelled) -> Self {
        PopulateError::Cancelled
    }
}

impl<E> PopulateError<E> {
    /// The recompute error, if that is what failed.
    pub fn into_recompute(self) -> Option<E> {
        match self {
            PopulateError::Recompute(e) => Some(e),
            _ => None,
        }
    }
}
