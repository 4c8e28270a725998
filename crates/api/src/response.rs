//! API response bodies.

use serde::{Deserialize, Serialize};
use telemetry::ComponentHealthReport;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: Vec<ComponentHealthReport>,
    pub consecutive_failures: u64,
    pub backoff_delay_ms: u64,
    pub last_success_unix_ms: u64,
}
