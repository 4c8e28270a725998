//! Elasticsearch client, index setup and bulk sink against an in-process
//! fake cluster.

use axum::http::StatusCode;
use elastic_client::{
    ensure_index, ElasticClient, ElasticConfig, ElasticSink, IndexSetup, SetupPolicy, TrackSink,
};
use integration_tests::fixtures;
use integration_tests::setup::FakeElastic;
use tracks_core::{NormalizedRecord, Transformer, WriteError};

const INDEX: &str = "trimettracks";

fn records(n: u32) -> Vec<NormalizedRecord> {
    let now = fixtures::now_ms();
    let transformer = Transformer::default();
    fixtures::vehicles(n, now)
        .iter()
        .map(|raw| transformer.transform(raw).unwrap())
        .collect()
}

fn sink(fake: &FakeElastic) -> ElasticSink {
    ElasticSink::new(ElasticClient::new(fake.config(INDEX)).unwrap())
}

#[tokio::test]
async fn test_ensure_index_creates_with_mapping() {
    let fake = FakeElastic::start().await;
    let client = ElasticClient::new(fake.config(INDEX)).unwrap();

    let setup = ensure_index(&client, SetupPolicy::Retain).await.unwrap();
    assert_eq!(setup, IndexSetup::Created);

    let body = fake.index_body(INDEX).expect("index created");
    let properties = &body["mappings"]["properties"];
    assert_eq!(properties["location"]["type"], "geo_point");
    assert_eq!(properties["vehicle_ref"]["type"], "keyword");
    assert_eq!(properties["@timestamp"]["type"], "date");
}

#[tokio::test]
async fn test_ensure_index_retains_existing() {
    let fake = FakeElastic::start().await;
    fake.seed_index(INDEX, serde_json::json!({}));
    fake.seed_document("1-1704067200000", serde_json::json!({"vehicle_ref": "1"}));
    let client = ElasticClient::new(fake.config(INDEX)).unwrap();

    let setup = ensure_index(&client, SetupPolicy::Retain).await.unwrap();

    assert_eq!(setup, IndexSetup::Retained);
    assert_eq!(fake.index_deletes(), 0);
    assert_eq!(fake.document_count(), 1);
}

#[tokio::test]
async fn test_ensure_index_recreates_when_asked() {
    let fake = FakeElastic::start().await;
    fake.seed_index(INDEX, serde_json::json!({}));
    fake.seed_document("1-1704067200000", serde_json::json!({"vehicle_ref": "1"}));
    let client = ElasticClient::new(fake.config(INDEX)).unwrap();

    let setup = ensure_index(&client, SetupPolicy::Recreate).await.unwrap();

    assert_eq!(setup, IndexSetup::Recreated);
    assert_eq!(fake.index_deletes(), 1);
    assert_eq!(fake.document_count(), 0);
    assert!(fake.index_body(INDEX).unwrap()["mappings"].is_object());
}

#[tokio::test]
async fn test_write_is_idempotent_per_identity() {
    let fake = FakeElastic::start().await;
    let sink = sink(&fake);
    let batch = records(3);

    let first = sink.write(&batch).await.unwrap();
    let again = sink.write(&batch).await.unwrap();

    assert_eq!(first.succeeded, 3);
    assert_eq!(again.succeeded, 3);
    assert_eq!(fake.bulk_requests(), 2);
    assert_eq!(fake.document_count(), 3);

    let id = batch[0].identity().document_id();
    assert_eq!(fake.document(&id).unwrap()["vehicle_ref"], "1");
}

#[tokio::test]
async fn test_empty_write_makes_no_request() {
    let fake = FakeElastic::start().await;
    let report = sink(&fake).write(&[]).await.unwrap();

    assert_eq!(report.attempted, 0);
    assert_eq!(fake.bulk_requests(), 0);
}

#[tokio::test]
async fn test_item_rejections_are_reported() {
    let fake = FakeElastic::start().await;
    let batch = records(3);
    let rejected = batch[1].identity().document_id();
    fake.reject_ids(&[&rejected]);

    let report = sink(&fake).write(&batch).await.unwrap();

    assert!(report.is_partial());
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].document_id, rejected);
    assert_eq!(report.failures[0].status, 400);
    assert!(report.failures[0].reason.contains("mapper_parsing_exception"));
    assert_eq!(fake.document_count(), 2);
}

#[tokio::test]
async fn test_overloaded_cluster_is_transient() {
    let fake = FakeElastic::start().await;
    fake.fail_bulk_with(Some(StatusCode::SERVICE_UNAVAILABLE));

    let err = sink(&fake).write(&records(1)).await.unwrap_err();
    assert!(matches!(err, WriteError::Transient(_)), "got {}", err);

    fake.fail_bulk_with(Some(StatusCode::TOO_MANY_REQUESTS));
    let err = sink(&fake).write(&records(1)).await.unwrap_err();
    assert!(matches!(err, WriteError::Transient(_)), "got {}", err);
}

#[tokio::test]
async fn test_rejected_request_is_protocol_error() {
    let fake = FakeElastic::start().await;
    fake.fail_bulk_with(Some(StatusCode::BAD_REQUEST));

    let err = sink(&fake).write(&records(1)).await.unwrap_err();
    assert!(matches!(err, WriteError::Protocol(_)), "got {}", err);
    assert_eq!(err.code(), "WRITE_002");
}

#[tokio::test]
async fn test_basic_auth_sent_when_configured() {
    let fake = FakeElastic::start().await;
    let client = ElasticClient::new(ElasticConfig {
        username: Some("elastic".into()),
        password: Some("changeme".into()),
        ..fake.config(INDEX)
    })
    .unwrap();

    assert!(elastic_client::health::check_connection(&client).await);
    ElasticSink::new(client).write(&records(1)).await.unwrap();

    let headers = fake.authorization_headers();
    assert_eq!(headers.len(), 2);
    for header in headers {
        assert!(header.unwrap_or_default().starts_with("Basic "));
    }
}

#[tokio::test]
async fn test_unreachable_cluster() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ElasticClient::new(ElasticConfig {
        url: format!("http://{}", addr),
        timeout_ms: 1000,
        ..Default::default()
    })
    .unwrap();

    assert!(!elastic_client::health::check_connection(&client).await);
    assert!(ensure_index(&client, SetupPolicy::Retain).await.is_err());

    let err = ElasticSink::new(client).write(&records(1)).await.unwrap_err();
    assert!(matches!(err, WriteError::Transient(_)));
}
