//! Bulk writes of track documents.

use crate::client::ElasticClient;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;
use tracks_core::{NormalizedRecord, WriteError};

/// Destination for normalized records.
///
/// One `write` is one bulk operation. Rejections of individual records are
/// reported in the `WriteReport`; an `Err` means nothing can be assumed
/// written.
#[async_trait]
pub trait TrackSink: Send + Sync {
    async fn write(&self, records: &[NormalizedRecord]) -> Result<WriteReport, WriteError>;
}

/// A record the store refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub document_id: String,
    pub status: u16,
    pub reason: String,
}

/// Per-record outcome of one bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
}

impl WriteReport {
    pub fn all_succeeded(count: usize) -> Self {
        Self {
            attempted: count,
            succeeded: count,
            failures: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// At least one record was rejected by the store.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Records were sent and none of them were stored.
    pub fn all_rejected(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }
}

/// NDJSON body for `POST /_bulk`: an `index` action per record, keyed by the
/// record identity.
pub fn encode_bulk(index: &str, records: &[NormalizedRecord]) -> Result<String, WriteError> {
    let mut body = String::with_capacity(records.len() * 320);

    for record in records {
        let action = json!({
            "index": {
                "_index": index,
                "_id": record.identity().document_id(),
            }
        });
        let doc = serde_json::to_string(record)
            .map_err(|e| WriteError::protocol(format!("unencodable record: {}", e)))?;

        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&doc);
        body.push('\n');
    }

    Ok(body)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Map a bulk response onto the records that were sent, in order.
pub fn decode_bulk(body: &[u8], records: &[NormalizedRecord]) -> Result<WriteReport, WriteError> {
    let response: BulkResponse = serde_json::from_slice(body)
        .map_err(|e| WriteError::protocol(format!("undecodable bulk response: {}", e)))?;

    if response.items.len() != records.len() {
        return Err(WriteError::protocol(format!(
            "bulk response has {} items for {} records",
            response.items.len(),
            records.len()
        )));
    }

    let mut report = WriteReport {
        attempted: records.len(),
        ..Default::default()
    };

    for (entry, record) in response.items.into_iter().zip(records) {
        let item = entry
            .into_values()
            .next()
            .ok_or_else(|| WriteError::protocol("empty bulk response item"))?;

        if item.status < 300 {
            report.succeeded += 1;
            continue;
        }

        report.failures.push(ItemFailure {
            document_id: item
                .id
                .unwrap_or_else(|| record.identity().document_id()),
            status: item.status,
            reason: item.error.as_ref().map(error_reason).unwrap_or_default(),
        });
    }

    Ok(report)
}

fn error_reason(error: &Value) -> String {
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        (Some(kind), None) => kind.to_string(),
        (None, Some(reason)) => reason.to_string(),
        (None, None) => error.to_string(),
    }
}

/// `_bulk` writer for the configured index.
#[derive(Clone)]
pub struct ElasticSink {
    client: ElasticClient,
}

impl ElasticSink {
    pub fn new(client: ElasticClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ElasticClient {
        &self.client
    }
}

#[async_trait]
impl TrackSink for ElasticSink {
    async fn write(&self, records: &[NormalizedRecord]) -> Result<WriteReport, WriteError> {
        if records.is_empty() {
            return Ok(WriteReport::default());
        }

        let body = encode_bulk(self.client.index(), records)?;

        let response = self
            .client
            .request(Method::POST, "_bulk")
            .map_err(|e| WriteError::protocol(e.to_string()))?
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WriteError::transient("bulk request timed out")
                } else {
                    WriteError::transient(format!("bulk request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(WriteError::transient(format!("bulk returned {}", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WriteError::protocol(format!("bulk returned {}: {}", status, text)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| WriteError::transient(format!("failed to read bulk response: {}", e)))?;

        let report = decode_bulk(&bytes, records)?;
        debug!(
            index = self.client.index(),
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed(),
            "Bulk write complete"
        );
        Ok(report)
    }
}
