//! In-process signal bus
//!
//! Routes each published [`Signal`] to the handlers registered for its
//! [`SignalKind`]. Handlers run concurrently and are all awaited; one
//! handler failing never stops the others.

use crate::stats::StatsCollector;
use crate::{HandlerFailure, InvalidationError, InvalidationStats, PublishError, Signal, SignalKind};
use crate::handlers::{
    GroupInvalidation, InvalidationHandler, MembershipInvalidation, SubscriptionInvalidation,
    UserInvalidation,
};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subshare_cache::{or_cancel, CacheStore, CancellationToken};
use tracing::{debug, error, warn};

#[async_trait::async_trait]
pub trait SignalHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Signal kinds this handler is registered for.
    fn subscribes_to(&self) -> &'static [SignalKind];

    async fn handle(&self, signal: &Signal) -> Result<(), InvalidationError>;
}

/// Outcome of a publish in which every handler succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReport {
    pub kind: SignalKind,
    pub handlers: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Default)]
pub struct SignalBus {
    handlers: HashMap<SignalKind, Vec<Arc<dyn SignalHandler>>>,
    stats: StatsCollector,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus with the group, membership, subscription and user handlers all
    /// deleting from `store`.
    pub fn with_default_handlers(store: Arc<dyn CacheStore>) -> Self {
        let mut bus = Self::new();
        bus.register(Arc::new(InvalidationHandler::<GroupInvalidation>::new(
            store.clone(),
        )));
        bus.register(Arc::new(
            InvalidationHandler::<MembershipInvalidation>::new(store.clone()),
        ));
        bus.register(Arc::new(
            InvalidationHandler::<SubscriptionInvalidation>::new(store.clone()),
        ));
        bus.register(Arc::new(InvalidationHandler::<UserInvalidation>::new(store)));
        bus
    }

    /// Register `handler` for every kind it subscribes to.
    pub fn register(&mut self, handler: Arc<dyn SignalHandler>) {
        for kind in handler.subscribes_to() {
            self.handlers
                .entry(*kind)
                .or_default()
                .push(handler.clone());
        }
    }

    pub fn handler_count(&self, kind: SignalKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }

    /// Deliver `signal` to its handlers and wait for all of them.
    ///
    /// Returns [`PublishError::PartialFailure`] once every handler has run if
    /// any of them failed, or [`PublishError::Cancelled`] if `cancel` fires
    /// first. Handlers already started are dropped on cancellation.
    pub async fn publish(
        &self,
        signal: &Signal,
        cancel: &CancellationToken,
    ) -> Result<PublishReport, PublishError> {
        let kind = signal.kind();
        let start = Instant::now();
        let handlers = self.handlers.get(&kind).map_or(&[][..], Vec::as_slice);

        if handlers.is_empty() {
            debug!(signal = %kind, "No handlers registered for signal");
            self.stats.record_publish(0);
            return Ok(PublishReport {
                kind,
                handlers: 0,
                elapsed: start.elapsed(),
            });
        }

        let runs = handlers.iter().map(|handler| async move {
            (handler.name(), handler.handle(signal).await)
        });

        let outcomes = match or_cancel(cancel, join_all(runs)).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                warn!(signal = %kind, "Signal publish cancelled");
                self.stats.record_cancelled();
                return Err(PublishError::Cancelled { kind });
            }
        };

        let attempted = outcomes.len();
        let failures: Vec<HandlerFailure> = outcomes
            .into_iter()
            .filter_map(|(handler, result)| {
                result.err().map(|error| {
                    error!(signal = %kind, handler, error = %error, "Invalidation handler failed");
                    HandlerFailure { handler, error }
                })
            })
            .collect();

        let elapsed = start.elapsed();
        self.stats.record_publish(attempted);
        self.stats.record_latency(elapsed.as_secs_f64() * 1000.0);

        if !failures.is_empty() {
            self.stats.record_failures(failures.len());
            return Err(PublishError::PartialFailure {
                kind,
                attempted,
                failures,
            });
        }

        debug!(signal = %kind, handlers = attempted, "Signal published");
        Ok(PublishReport {
            kind,
            handlers: attempted,
            elapsed,
        })
    }
}
