//! Scheduled ingestion loop.
//!
//! Each tick fetches the vehicle feed once, normalizes and deduplicates the
//! records and bulk-writes what is new. Failed ticks back off exponentially.

pub mod backoff;
pub mod config;
pub mod scheduler;
pub mod tick;

pub use backoff::BackoffState;
pub use config::SchedulerConfig;
pub use scheduler::*;
pub use tick::*;
