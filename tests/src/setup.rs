//! Common test setup functions.
//!
//! `FakeTrimet` and `FakeElastic` are in-process axum servers speaking just
//! enough of each HTTP API to exercise the real clients end to end.
//! `TestLoop` wires a scheduler to the mocks with private registries.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, head, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use elastic_client::ElasticConfig;
use telemetry::{HealthRegistry, Metrics};
use tracks_core::Transformer;
use trimet::TrimetConfig;
use worker::{IngestScheduler, SchedulerConfig};

use crate::mocks::{MockFetcher, MockSink};

/// Bind an ephemeral local port and serve `app` on it.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    format!("http://{}", addr)
}

/// Fresh metrics and health registries, isolated from other tests.
pub fn registries() -> (&'static Metrics, &'static HealthRegistry) {
    (
        Box::leak(Box::new(Metrics::new())),
        Box::leak(Box::new(HealthRegistry::new())),
    )
}

// ---------------------------------------------------------------------------
// TriMet
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TrimetState {
    responses: Mutex<VecDeque<(StatusCode, String)>>,
    app_ids: Mutex<Vec<Option<String>>>,
    user_agents: Mutex<Vec<Option<String>>>,
}

/// Fake TriMet vehicles endpoint.
pub struct FakeTrimet {
    pub url: String,
    state: Arc<TrimetState>,
}

impl FakeTrimet {
    pub async fn start() -> Self {
        let state = Arc::new(TrimetState::default());
        let app = Router::new()
            .route("/ws/v2/vehicles", get(vehicles_handler))
            .with_state(state.clone());

        let base = serve(app).await;
        Self {
            url: format!("{}/ws/v2/vehicles", base),
            state,
        }
    }

    /// Queue a raw response. When the queue is empty the endpoint answers
    /// with an empty vehicle list.
    pub fn push(&self, status: StatusCode, body: impl Into<String>) {
        self.state.responses.lock().push_back((status, body.into()));
    }

    pub fn push_json(&self, body: &Value) {
        self.push(StatusCode::OK, body.to_string());
    }

    /// `appID` query values of every request received.
    pub fn app_ids(&self) -> Vec<Option<String>> {
        self.state.app_ids.lock().clone()
    }

    pub fn user_agents(&self) -> Vec<Option<String>> {
        self.state.user_agents.lock().clone()
    }

    /// Client configuration pointing at this server.
    pub fn config(&self) -> TrimetConfig {
        TrimetConfig {
            url: self.url.clone(),
            app_id: "TESTAPPID".into(),
            timeout_ms: 2000,
            ..Default::default()
        }
    }
}

async fn vehicles_handler(
    State(state): State<Arc<TrimetState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.app_ids.lock().push(query.get("appID").cloned());
    state.user_agents.lock().push(
        headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let next = state.responses.lock().pop_front();
    let (status, body) = next.unwrap_or_else(|| {
        (
            StatusCode::OK,
            json!({"resultSet": {"queryTime": 0, "vehicle": []}}).to_string(),
        )
    });

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("valid response")
}

// ---------------------------------------------------------------------------
// Elasticsearch
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ElasticState {
    indices: Mutex<HashMap<String, Value>>,
    docs: Mutex<HashMap<String, Value>>,
    bulk_requests: AtomicUsize,
    index_deletes: AtomicUsize,
    bulk_failure: Mutex<Option<StatusCode>>,
    rejected_ids: Mutex<Vec<String>>,
    authorization: Mutex<Vec<Option<String>>>,
}

impl ElasticState {
    fn record_auth(&self, headers: &HeaderMap) {
        self.authorization.lock().push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
    }
}

/// Fake Elasticsearch cluster holding documents in memory.
pub struct FakeElastic {
    pub url: String,
    state: Arc<ElasticState>,
}

impl FakeElastic {
    pub async fn start() -> Self {
        let state = Arc::new(ElasticState::default());
        let app = Router::new()
            .route("/", get(info_handler))
            .route("/_bulk", post(bulk_handler))
            .route(
                "/:index",
                head(index_exists_handler)
                    .put(create_index_handler)
                    .delete(delete_index_handler),
            )
            .with_state(state.clone());

        let url = serve(app).await;
        Self { url, state }
    }

    /// Client configuration pointing at this server.
    pub fn config(&self, index: &str) -> ElasticConfig {
        ElasticConfig {
            url: self.url.clone(),
            index: index.into(),
            timeout_ms: 2000,
            ..Default::default()
        }
    }

    /// Pretend the index already exists with the given mapping.
    pub fn seed_index(&self, index: &str, body: Value) {
        self.state.indices.lock().insert(index.into(), body);
    }

    /// Mapping body the index was created with, if it exists.
    pub fn index_body(&self, index: &str) -> Option<Value> {
        self.state.indices.lock().get(index).cloned()
    }

    pub fn seed_document(&self, id: &str, doc: Value) {
        self.state.docs.lock().insert(id.into(), doc);
    }

    pub fn document(&self, id: &str) -> Option<Value> {
        self.state.docs.lock().get(id).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.state.docs.lock().len()
    }

    pub fn bulk_requests(&self) -> usize {
        self.state.bulk_requests.load(Ordering::SeqCst)
    }

    pub fn index_deletes(&self) -> usize {
        self.state.index_deletes.load(Ordering::SeqCst)
    }

    /// Fail every bulk request as a whole with `status`.
    pub fn fail_bulk_with(&self, status: Option<StatusCode>) {
        *self.state.bulk_failure.lock() = status;
    }

    /// Reject these document ids with a mapping error.
    pub fn reject_ids(&self, ids: &[&str]) {
        *self.state.rejected_ids.lock() = ids.iter().map(|s| s.to_string()).collect();
    }

    /// `Authorization` header of every request received.
    pub fn authorization_headers(&self) -> Vec<Option<String>> {
        self.state.authorization.lock().clone()
    }
}

async fn info_handler(State(state): State<Arc<ElasticState>>, headers: HeaderMap) -> Json<Value> {
    state.record_auth(&headers);
    Json(json!({
        "name": "fake-node",
        "cluster_name": "fake",
        "version": {"number": "8.11.0"},
        "tagline": "You Know, for Search"
    }))
}

async fn index_exists_handler(
    State(state): State<Arc<ElasticState>>,
    Path(index): Path<String>,
) -> StatusCode {
    if state.indices.lock().contains_key(&index) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn create_index_handler(
    State(state): State<Arc<ElasticState>>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut indices = state.indices.lock();
    if indices.contains_key(&index) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"type": "resource_already_exists_exception"}, "status": 400})),
        );
    }
    indices.insert(index.clone(), body);
    (
        StatusCode::OK,
        Json(json!({"acknowledged": true, "index": index})),
    )
}

async fn delete_index_handler(
    State(state): State<Arc<ElasticState>>,
    Path(index): Path<String>,
) -> StatusCode {
    state.index_deletes.fetch_add(1, Ordering::SeqCst);
    if state.indices.lock().remove(&index).is_some() {
        state.docs.lock().clear();
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn bulk_handler(
    State(state): State<Arc<ElasticState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.bulk_requests.fetch_add(1, Ordering::SeqCst);
    state.record_auth(&headers);

    let failure = *state.bulk_failure.lock();
    if let Some(status) = failure {
        return (status, "bulk rejected").into_response();
    }

    let rejected = state.rejected_ids.lock().clone();
    let mut items = Vec::new();
    let mut errors = false;

    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    while let Some(action_line) = lines.next() {
        let action = serde_json::from_str::<Value>(action_line);
        let (Ok(action), Some(doc_line)) = (action, lines.next()) else {
            return (StatusCode::BAD_REQUEST, "malformed bulk body").into_response();
        };
        let Ok(doc) = serde_json::from_str::<Value>(doc_line) else {
            return (StatusCode::BAD_REQUEST, "malformed document").into_response();
        };

        let index = action["index"]["_index"].as_str().unwrap_or_default().to_string();
        let id = action["index"]["_id"].as_str().unwrap_or_default().to_string();

        if rejected.contains(&id) {
            errors = true;
            items.push(json!({"index": {
                "_index": index,
                "_id": id,
                "status": 400,
                "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [location] of type [geo_point]"
                }
            }}));
            continue;
        }

        let created = state.docs.lock().insert(id.clone(), doc).is_none();
        items.push(json!({"index": {
            "_index": index,
            "_id": id,
            "result": if created { "created" } else { "updated" },
            "status": if created { 201 } else { 200 }
        }}));
    }

    Json(json!({"took": 1, "errors": errors, "items": items})).into_response()
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Scheduler wired to in-memory mocks.
pub struct TestLoop {
    pub fetcher: MockFetcher,
    pub sink: MockSink,
    pub metrics: &'static Metrics,
    pub health: &'static HealthRegistry,
    pub scheduler: IngestScheduler,
}

impl TestLoop {
    pub fn new(config: SchedulerConfig) -> Self {
        let fetcher = MockFetcher::new();
        let sink = MockSink::new();
        let (metrics, health) = registries();

        let scheduler = IngestScheduler::new(
            config,
            Transformer::default(),
            Arc::new(fetcher.clone()),
            Arc::new(sink.clone()),
        )
        .with_telemetry(metrics, health);

        Self {
            fetcher,
            sink,
            metrics,
            health,
            scheduler,
        }
    }
}

impl Default for TestLoop {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
