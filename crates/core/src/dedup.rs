//! Cross-tick duplicate suppression.
//!
//! TriMet keeps returning a vehicle's last report until the vehicle reports
//! again, so most of each response repeats the previous one. The
//! deduplicator remembers the identity of every record it let through and
//! suppresses it while it keeps reappearing within the window.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::limits::{DEFAULT_DEDUP_MAX_ENTRIES, DEFAULT_DEDUP_WINDOW_TICKS};
use crate::records::{Identity, NormalizedRecord};

/// Deduplicator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DedupConfig {
    /// An identity is forgotten once unseen for this many ticks
    #[serde(default = "default_window_ticks")]
    #[validate(range(min = 1))]
    pub window_ticks: u64,
    /// Hard cap on remembered identities; oldest are evicted first
    #[serde(default = "default_max_entries")]
    #[validate(range(min = 1))]
    pub max_entries: usize,
}

fn default_window_ticks() -> u64 {
    DEFAULT_DEDUP_WINDOW_TICKS
}

fn default_max_entries() -> usize {
    DEFAULT_DEDUP_MAX_ENTRIES
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_ticks: default_window_ticks(),
            max_entries: default_max_entries(),
        }
    }
}

/// Identity → last-seen tick.
#[derive(Debug, Default)]
pub struct Deduplicator {
    config: DedupConfig,
    seen: HashMap<Identity, u64>,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            seen: HashMap::new(),
        }
    }

    /// Returns the records not seen within the window and records their
    /// identities at `tick`. Within one batch only the first occurrence of an
    /// identity passes. Suppressed identities have their last-seen tick
    /// refreshed.
    pub fn filter(&mut self, records: Vec<NormalizedRecord>, tick: u64) -> Vec<NormalizedRecord> {
        self.prune(tick);

        let mut passed = Vec::with_capacity(records.len());
        for record in records {
            let identity = record.identity();
            if let Some(last_seen) = self.seen.get_mut(&identity) {
                *last_seen = tick;
                continue;
            }
            self.seen.insert(identity, tick);
            passed.push(record);
        }

        self.enforce_capacity();
        passed
    }

    /// Drops identities so they pass again on the next tick. Used when a
    /// write failed as a whole and nothing reached the store.
    pub fn forget<'a>(&mut self, identities: impl IntoIterator<Item = &'a Identity>) {
        for identity in identities {
            self.seen.remove(identity);
        }
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.seen.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    fn prune(&mut self, tick: u64) {
        let window = self.config.window_ticks;
        let before = self.seen.len();
        self.seen
            .retain(|_, last_seen| tick.saturating_sub(*last_seen) < window);

        let pruned = before - self.seen.len();
        if pruned > 0 {
            debug!(pruned, remaining = self.seen.len(), "Pruned dedup window");
        }
    }

    fn enforce_capacity(&mut self) {
        let excess = self.seen.len().saturating_sub(self.config.max_entries);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(u64, Identity)> = self
            .seen
            .iter()
            .map(|(identity, tick)| (*tick, identity.clone()))
            .collect();
        by_age.sort_by_key(|(tick, _)| *tick);

        for (_, identity) in by_age.into_iter().take(excess) {
            self.seen.remove(&identity);
        }

        debug!(evicted = excess, "Dedup capacity reached, evicted oldest identities");
    }
}
