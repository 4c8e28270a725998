//! Internal telemetry for transit-tracks.
//!
//! Counters, gauges and component health live in process and are read by
//! the `api` crate's `/health` and `/metrics` endpoints.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
