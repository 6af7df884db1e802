//! Cache metrics for observability

use crate::keys::qualifier_of;
use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    recomputes: CounterVec,
    writes: CounterVec,
    lock_contention: CounterVec,
    provider_failures: CounterVec,
    fail_open: CounterVec,
    errors: CounterVec,
}

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    CounterVec::new(Opts::new(name, help), labels).expect("valid metric definition")
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: counter("subshare_cache_hits_total", "Total cache hits", &["view"]),
            misses: counter("subshare_cache_misses_total", "Total cache misses", &["view"]),
            recomputes: counter(
                "subshare_cache_recomputes_total",
                "Recomputes run on a miss",
                &["view", "outcome"],
            ),
            writes: counter("subshare_cache_writes_total", "Total cache writes", &["view"]),
            lock_contention: counter(
                "subshare_cache_lock_contention_total",
                "Lock waits that elapsed with the lock held elsewhere",
                &["view"],
            ),
            provider_failures: counter(
                "subshare_cache_provider_failures_total",
                "Store or lock provider calls that failed",
                &["view", "provider"],
            ),
            fail_open: counter(
                "subshare_cache_fail_open_total",
                "Recomputes run without the lock after repeated provider failures",
                &["view"],
            ),
            errors: counter(
                "subshare_cache_errors_total",
                "Total cache errors",
                &["view", "error_type"],
            ),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.recomputes.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.lock_contention.clone()))?;
        registry.register(Box::new(self.provider_failures.clone()))?;
        registry.register(Box::new(self.fail_open.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, key: &str) {
        get_metrics().hits.with_label_values(&[qualifier_of(key)]).inc();
    }

    pub fn record_miss(&self, key: &str) {
        get_metrics().misses.with_label_values(&[qualifier_of(key)]).inc();
    }

    pub fn record_recompute(&self, key: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        get_metrics()
            .recomputes
            .with_label_values(&[qualifier_of(key), outcome])
            .inc();
    }

    pub fn record_write(&self, key: &str) {
        get_metrics().writes.with_label_values(&[qualifier_of(key)]).inc();
    }

    pub fn record_lock_contention(&self, key: &str) {
        get_metrics()
            .lock_contention
            .with_label_values(&[qualifier_of(key)])
            .inc();
    }

    pub fn record_provider_failure(&self, key: &str, provider: &str) {
        get_metrics()
            .provider_failures
            .with_label_values(&[qualifier_of(key), provider])
            .inc();
    }

    pub fn record_fail_open(&self, key: &str) {
        get_metrics()
            .fail_open
            .with_label_values(&[qualifier_of(key)])
            .inc();
    }

    pub fn record_error(&self, key: &str, error_type: &str) {
        get_metrics()
            .errors
            .with_label_values(&[qualifier_of(key), error_type])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_count() {
        let registry = Registry::new();
        CacheMetrics::register(&registry).unwrap();

        let metrics = CacheMetrics::new();
        metrics.record_hit("G1:GroupDetail");
        metrics.record_recompute("U1:upcoming_bills", false);

        let families = registry.gather();
        let hits = families
            .iter()
            .find(|f| f.get_name() == "subshare_cache_hits_total")
            .expect("hits registered");
        let labelled = hits
            .get_metric()
            .iter()
            .any(|m| m.get_label().iter().any(|l| l.get_value() == "GroupDetail"));
        assert!(labelled);
    }
}
