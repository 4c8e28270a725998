//! Single-shot fetch of the TriMet vehicles feed.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use tracks_core::{Error, FetchError, RawRecord, Result};
use url::Url;

use crate::config::TrimetConfig;

/// Source of raw vehicle records.
///
/// Implementations make exactly one upstream call per `fetch` and never
/// retry; retry policy belongs to the scheduler.
#[async_trait]
pub trait VehicleFetcher: Send + Sync {
    async fn fetch(&self) -> std::result::Result<Vec<RawRecord>, FetchError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VehiclesResponse {
    result_set: Option<ResultSet>,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(default)]
    vehicle: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<Value>,
}

/// Parse a vehicles response body.
///
/// A `resultSet` without a `vehicle` array is an empty batch; TriMet omits
/// the key when nothing is reporting. Entries are decoded one at a time, so a
/// malformed entry is rejected by the transformer without losing the rest.
pub fn parse_vehicles(
    body: &[u8],
    max_vehicles: usize,
) -> std::result::Result<Vec<RawRecord>, FetchError> {
    let response: VehiclesResponse = serde_json::from_slice(body)
        .map_err(|e| FetchError::protocol(format!("undecodable vehicles response: {}", e)))?;

    let result_set = response
        .result_set
        .ok_or_else(|| FetchError::protocol("response has no resultSet"))?;

    if let Some(error) = result_set.error {
        let message = error
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(FetchError::protocol(format!("upstream error: {}", message)));
    }

    let entries = result_set.vehicle.unwrap_or_default();
    if entries.len() > max_vehicles {
        return Err(FetchError::protocol(format!(
            "{} vehicles exceeds limit of {}",
            entries.len(),
            max_vehicles
        )));
    }

    Ok(entries.iter().map(RawRecord::from_entry).collect())
}

/// HTTP fetcher for the TriMet vehicles endpoint.
#[derive(Clone)]
pub struct TrimetFetcher {
    http: reqwest::Client,
    endpoint: Url,
    config: TrimetConfig,
}

impl TrimetFetcher {
    /// Creates a new fetcher. Fails only on an unusable URL or client setup.
    pub fn new(config: TrimetConfig) -> Result<Self> {
        let mut endpoint = Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid TriMet url {}: {}", config.url, e)))?;
        endpoint
            .query_pairs_mut()
            .append_pair("appID", &config.app_id);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::setup(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            config,
        })
    }

    pub fn config(&self) -> &TrimetConfig {
        &self.config
    }

    /// Endpoint host, for logging without leaking the app id.
    pub fn host(&self) -> &str {
        self.endpoint.host_str().unwrap_or("unknown")
    }
}

#[async_trait]
impl VehicleFetcher for TrimetFetcher {
    async fn fetch(&self) -> std::result::Result<Vec<RawRecord>, FetchError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::transient(format!("upstream returned {}", status)));
        }
        if !status.is_success() {
            return Err(FetchError::protocol(format!("upstream returned {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transient(format!("failed to read body: {}", e)))?;

        let vehicles = parse_vehicles(&body, self.config.max_vehicles)?;
        debug!(host = self.host(), vehicles = vehicles.len(), "Fetched vehicles");
        Ok(vehicles)
    }
}

fn classify_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_decode() || e.is_builder() {
        FetchError::protocol(format!("request failed: {}", e))
    } else if e.is_timeout() {
        FetchError::transient("request timed out")
    } else {
        FetchError::transient(format!("request failed: {}", e))
    }
}
