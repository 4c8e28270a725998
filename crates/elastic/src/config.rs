//! Elasticsearch configuration.

use serde::{Deserialize, Serialize};
use tracks_core::limits::DEFAULT_CALL_TIMEOUT_MS;
use validator::Validate;

/// Elasticsearch client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ElasticConfig {
    /// Elasticsearch HTTP URL
    #[serde(default = "default_url")]
    #[validate(url)]
    pub url: String,
    /// Target index for track documents
    #[serde(default = "default_index")]
    #[validate(length(min = 1, max = 255))]
    pub index: String,
    /// Basic auth username (optional)
    pub username: Option<String>,
    /// Basic auth password (optional)
    pub password: Option<String>,
    /// Skip TLS certificate verification (local dev clusters only)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    /// Delete and recreate the index at startup if it already exists
    #[serde(default)]
    pub recreate_index: bool,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "trimettracks".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            index: default_index(),
            username: None,
            password: None,
            accept_invalid_certs: false,
            timeout_ms: default_timeout_ms(),
            recreate_index: false,
        }
    }
}
