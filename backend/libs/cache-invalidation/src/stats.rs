//! Statistics tracking for signal publishing

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of bus activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvalidationStats {
    pub signals_published: u64,
    pub handler_runs: u64,
    pub handler_failures: u64,
    pub publishes_cancelled: u64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
}

const MAX_SAMPLES: usize = 1000;

/// Thread-safe statistics collector
#[derive(Clone, Default)]
pub struct StatsCollector {
    signals_published: Arc<AtomicU64>,
    handler_runs: Arc<AtomicU64>,
    handler_failures: Arc<AtomicU64>,
    publishes_cancelled: Arc<AtomicU64>,
    latencies: Arc<std::sync::Mutex<Vec<f64>>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self, handlers: usize) {
        self.signals_published.fetch_add(1, Ordering::Relaxed);
        self.handler_runs
            .fetch_add(handlers as u64, Ordering::Relaxed);
    }

    pub fn record_failures(&self, failures: usize) {
        self.handler_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.publishes_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record publish latency (in milliseconds)
    pub fn record_latency(&self, latency_ms: f64) {
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push(latency_ms);
            // Keep only recent samples
            if latencies.len() > MAX_SAMPLES {
                latencies.drain(0..MAX_SAMPLES / 2);
            }
        }
    }

    pub fn snapshot(&self) -> InvalidationStats {
        let (p50, p99) = match self.latencies.lock() {
            Ok(latencies) if !latencies.is_empty() => {
                let mut sorted = latencies.clone();
                sorted.sort_by(f64::total_cmp);
                (percentile(&sorted, 0.50), percentile(&sorted, 0.99))
            }
            _ => (0.0, 0.0),
        };

        InvalidationStats {
            signals_published: self.signals_published.load(Ordering::Relaxed),
            handler_runs: self.handler_runs.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            publishes_cancelled: self.publishes_cancelled.load(Ordering::Relaxed),
            latency_p50_ms: p50,
            latency_p99_ms: p99,
        }
    }

    pub fn reset(&self) {
        self.signals_published.store(0, Ordering::Relaxed);
        self.handler_runs.store(0, Ordering::Relaxed);
        self.handler_failures.store(0, Ordering::Relaxed);
        self.publishes_cancelled.store(0, Ordering::Relaxed);
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.clear();
        }
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = (sorted.len() as f64 * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}
