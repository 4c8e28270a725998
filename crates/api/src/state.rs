//! Application state shared across handlers.

use telemetry::{HealthRegistry, Metrics};

/// Registries the endpoints read from. The ingestion loop writes to the
/// same instances.
#[derive(Clone, Copy)]
pub struct AppState {
    pub metrics: &'static Metrics,
    pub health: &'static HealthRegistry,
}

impl AppState {
    pub fn new(metrics: &'static Metrics, health: &'static HealthRegistry) -> Self {
        Self { metrics, health }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(telemetry::metrics(), telemetry::health())
    }
}
