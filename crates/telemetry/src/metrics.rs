//! In-process metrics for the ingestion loop.
//!
//! Collected on atomics and exposed as a point-in-time snapshot for the
//! `/metrics` endpoint and the shutdown log line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (last value wins).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    /// Stores a duration as whole milliseconds.
    pub fn set_duration(&self, val: Duration) {
        self.set(u64::try_from(val.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s
    buckets: [AtomicU64; 10],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 10] = [10, 50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_duration(&self, elapsed: Duration) {
        self.observe(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns (upper bound, count) per bucket.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the ingestion loop.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ticks
    pub ticks_total: Counter,
    pub ticks_succeeded: Counter,
    pub ticks_degraded: Counter,
    pub ticks_failed: Counter,
    pub ticks_abandoned: Counter,

    // Records
    pub records_fetched: Counter,
    pub records_failed_validation: Counter,
    pub records_deduplicated: Counter,
    pub records_ingested: Counter,
    pub records_failed_write: Counter,

    // Errors
    pub fetch_transient_errors: Counter,
    pub fetch_protocol_errors: Counter,
    pub write_errors: Counter,

    // Latency histograms
    pub fetch_latency_ms: Histogram,
    pub write_latency_ms: Histogram,
    pub tick_latency_ms: Histogram,

    // Gauges
    pub consecutive_failures: Gauge,
    /// Delay before the next tick while backing off; 0 when not backing off
    pub backoff_delay_ms: Gauge,
    pub dedup_entries: Gauge,
    pub last_tick_unix_ms: Gauge,
    pub last_success_unix_ms: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the loop is currently waiting out a backoff delay.
    pub fn backing_off(&self) -> bool {
        self.consecutive_failures.get() > 0
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub ticks_total: u64,
    pub ticks_succeeded: u64,
    pub ticks_degraded: u64,
    pub ticks_failed: u64,
    pub ticks_abandoned: u64,
    pub records_fetched: u64,
    pub records_failed_validation: u64,
    pub records_deduplicated: u64,
    pub records_ingested: u64,
    pub records_failed_write: u64,
    pub fetch_transient_errors: u64,
    pub fetch_protocol_errors: u64,
    pub write_errors: u64,
    pub fetch_latency_mean_ms: f64,
    pub write_latency_mean_ms: f64,
    pub tick_latency_mean_ms: f64,
    pub consecutive_failures: u64,
    pub backoff_delay_ms: u64,
    pub dedup_entries: u64,
    pub last_tick_unix_ms: u64,
    pub last_success_unix_ms: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            ticks_total: self.ticks_total.get(),
            ticks_succeeded: self.ticks_succeeded.get(),
            ticks_degraded: self.ticks_degraded.get(),
            ticks_failed: self.ticks_failed.get(),
            ticks_abandoned: self.ticks_abandoned.get(),
            records_fetched: self.records_fetched.get(),
            records_failed_validation: self.records_failed_validation.get(),
            records_deduplicated: self.records_deduplicated.get(),
            records_ingested: self.records_ingested.get(),
            records_failed_write: self.records_failed_write.get(),
            fetch_transient_errors: self.fetch_transient_errors.get(),
            fetch_protocol_errors: self.fetch_protocol_errors.get(),
            write_errors: self.write_errors.get(),
            fetch_latency_mean_ms: self.fetch_latency_ms.mean(),
            write_latency_mean_ms: self.write_latency_ms.mean(),
            tick_latency_mean_ms: self.tick_latency_ms.mean(),
            consecutive_failures: self.consecutive_failures.get(),
            backoff_delay_ms: self.backoff_delay_ms.get(),
            dedup_entries: self.dedup_entries.get(),
            last_tick_unix_ms: self.last_tick_unix_ms.get(),
            last_success_unix_ms: self.last_success_unix_ms.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
