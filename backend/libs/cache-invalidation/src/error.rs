//! Error types for signal publishing and invalidation

use crate::SignalKind;
use subshare_cache::CacheError;
use thiserror::Error;

/// Failure inside one handler
#[derive(Error, Debug)]
pub enum InvalidationError {
    /// Store unreachable or key could not be built
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Handler failed: {0}")]
    HandlerFailed(String),
}

/// One handler's failure, as reported to the publisher
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: &'static str,
    pub error: InvalidationError,
}

#[derive(Error, Debug)]
pub enum PublishError {
    /// Every handler ran; these ones failed
    #[error("{failed} of {attempted} handlers failed for {kind}", failed = .failures.len())]
    PartialFailure {
        kind: SignalKind,
        attempted: usize,
        failures: Vec<HandlerFailure>,
    },

    #[error("Publish of {kind} cancelled before all handlers finished")]
    Cancelled { kind: SignalKind },
}

impl PublishError {
    pub fn failures(&self) -> &[HandlerFailure] {
        match self {
            PublishError::PartialFailure { failures, .. } => failures,
            PublishError::Cancelled { .. } => &[],
        }
    }
}
