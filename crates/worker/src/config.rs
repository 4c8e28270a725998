//! Scheduler configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracks_core::limits::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_CALL_TIMEOUT_MS,
    DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_TICK_INTERVAL_MS, MIN_TICK_INTERVAL_MS,
};
use tracks_core::DedupConfig;
use validator::Validate;

/// Ingestion loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SchedulerConfig {
    /// Delay between the end of one healthy tick and the start of the next
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Floor for `interval_ms`; smaller intervals are clamped up to it
    #[serde(default = "default_min_interval_ms")]
    #[validate(range(min = 1))]
    pub min_interval_ms: u64,
    /// First backoff delay after a failed tick
    #[serde(default = "default_backoff_base_ms")]
    #[validate(range(min = 1))]
    pub backoff_base_ms: u64,
    /// Backoff ceiling
    #[serde(default = "default_backoff_max_ms")]
    #[validate(range(min = 1))]
    pub backoff_max_ms: u64,
    /// Upper bound on any single fetch or write
    #[serde(default = "default_call_timeout_ms")]
    #[validate(range(min = 1))]
    pub call_timeout_ms: u64,
    /// How long an in-flight tick may run after shutdown is requested
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default)]
    pub dedup: DedupConfig,
}

fn default_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_min_interval_ms() -> u64 {
    MIN_TICK_INTERVAL_MS
}

fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX_MS
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            dedup: DedupConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Configured interval clamped up to the floor.
    pub fn effective_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(self.min_interval_ms))
    }

    pub fn interval_clamped(&self) -> bool {
        self.interval_ms < self.min_interval_ms
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Backoff ceiling, never below the base delay.
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Whether the dedup map can hold a full batch of `max_batch` records.
    /// A smaller map evicts identities recorded in the same tick.
    pub fn dedup_holds_batch(&self, max_batch: usize) -> bool {
        self.dedup.max_entries >= max_batch
    }
}
