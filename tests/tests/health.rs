//! Tests for health and metrics endpoints.

use api::{router, AppState};
use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::fixtures;
use integration_tests::setup::{registries, TestLoop};
use tracks_core::FetchError;

fn server(state: AppState) -> TestServer {
    TestServer::new(router(state)).expect("Failed to create test server")
}

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let (metrics, health) = registries();
    let server = server(AppState::new(metrics, health));

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["consecutive_failures"], 0);
    assert_eq!(body["backoff_delay_ms"], 0);

    let names: Vec<&str> = body["components"]
        .as_array()
        .expect("components array")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["trimet", "elasticsearch"]);
}

/// Test /health/ready follows sink health
#[tokio::test]
async fn test_ready_endpoint_follows_sink() {
    let (metrics, health) = registries();
    let server = server(AppState::new(metrics, health));

    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    health.sink.set_healthy();
    server.get("/health/ready").await.assert_status_ok();

    // An upstream outage alone does not make the service unready.
    health.upstream.set_unhealthy("[FETCH_001] timed out");
    server.get("/health/ready").await.assert_status_ok();

    health.sink.set_unhealthy("[WRITE_001] connection refused");
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

/// Test /health/live always returns 200 when the service is running
#[tokio::test]
async fn test_live_endpoint() {
    let (metrics, health) = registries();
    let server = server(AppState::new(metrics, health));

    server.get("/health/live").await.assert_status_ok();
}

/// Health and metrics reflect what the loop did
#[tokio::test]
async fn test_endpoints_reflect_loop_activity() {
    let mut t = TestLoop::default();
    let server = server(AppState::new(t.metrics, t.health));

    t.fetcher.push_batch(vec![
        fixtures::vehicle(1),
        fixtures::vehicle_with_nan_latitude(2),
        fixtures::vehicle(3),
    ]);
    t.scheduler.step().await;

    let metrics: serde_json::Value = server.get("/metrics").await.json();
    assert_eq!(metrics["ticks_total"], 1);
    assert_eq!(metrics["ticks_succeeded"], 1);
    assert_eq!(metrics["records_fetched"], 3);
    assert_eq!(metrics["records_failed_validation"], 1);
    assert_eq!(metrics["records_ingested"], 2);
    assert_eq!(metrics["dedup_entries"], 2);

    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "healthy");

    t.fetcher.push_error(FetchError::transient("timed out"));
    t.scheduler.step().await;

    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["consecutive_failures"], 1);
    assert_eq!(body["backoff_delay_ms"], 10_000);

    let trimet = &body["components"][0];
    assert_eq!(trimet["healthy"], false);
    assert!(trimet["message"].as_str().unwrap().starts_with("[FETCH_001]"));

    let metrics: serde_json::Value = server.get("/metrics").await.json();
    assert_eq!(metrics["ticks_failed"], 1);
    assert_eq!(metrics["fetch_transient_errors"], 1);
}
