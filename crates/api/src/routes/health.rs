//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health - Full health check.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.health.report();

    Json(HealthResponse {
        status: report.status.as_str().to_string(),
        components: report.components,
        consecutive_failures: state.metrics.consecutive_failures.get(),
        backoff_delay_ms: state.metrics.backoff_delay_ms.get(),
        last_success_unix_ms: state.metrics.last_success_unix_ms.get(),
    })
}

/// GET /health/ready - Readiness probe (sink accepting writes).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler(State(state): State<AppState>) -> StatusCode {
    if state.health.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
