//! Bounds and defaults for the ingestion loop.
//!
//! Configuration values outside these bounds are clamped, never rejected,
//! so a misconfigured deployment still makes forward progress.

// === Scheduling ===

/// Lowest tick interval the loop will honour (milliseconds).
///
/// The TriMet vehicles feed refreshes no faster than this.
pub const MIN_TICK_INTERVAL_MS: u64 = 5_000;

/// Default tick interval (milliseconds).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 5_000;

/// Default base delay for exponential backoff (milliseconds).
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5_000;

/// Default ceiling for exponential backoff (5 minutes).
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default timeout for any single external call (milliseconds).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// Default grace period for an in-flight tick on shutdown (milliseconds).
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 15_000;

// === Deduplication ===

/// Default dedup window in ticks (one minute at the default interval).
pub const DEFAULT_DEDUP_WINDOW_TICKS: u64 = 12;

/// Default maximum number of identities remembered.
///
/// The full TriMet fleet is well under 1000 vehicles, so this covers the
/// window many times over.
pub const DEFAULT_DEDUP_MAX_ENTRIES: usize = 50_000;

// === Upstream ===

/// Maximum vehicles accepted in one upstream response.
pub const MAX_VEHICLES_PER_RESPONSE: usize = 10_000;

// === Timestamp Bounds ===

/// Maximum allowed clock skew for future timestamps (seconds).
pub const MAX_FUTURE_SKEW_SECS: i64 = 300;

/// Maximum age for stale positions (seconds).
pub const MAX_RECORD_AGE_SECS: i64 = 24 * 60 * 60;

// === Coordinates ===

pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;
