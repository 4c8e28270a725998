//! TriMet API configuration.

use serde::{Deserialize, Serialize};
use tracks_core::limits::{DEFAULT_CALL_TIMEOUT_MS, MAX_VEHICLES_PER_RESPONSE};
use validator::Validate;

/// Vehicles endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrimetConfig {
    /// Vehicles endpoint URL
    #[serde(default = "default_url")]
    #[validate(url)]
    pub url: String,
    /// Application id issued by TriMet, sent as `appID`
    #[serde(default)]
    pub app_id: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    /// Responses with more vehicles than this are rejected
    #[serde(default = "default_max_vehicles")]
    #[validate(range(min = 1))]
    pub max_vehicles: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_url() -> String {
    "https://developer.trimet.org/ws/v2/vehicles".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

fn default_max_vehicles() -> usize {
    MAX_VEHICLES_PER_RESPONSE
}

fn default_user_agent() -> String {
    concat!("transit-tracks/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for TrimetConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            app_id: String::new(),
            timeout_ms: default_timeout_ms(),
            max_vehicles: default_max_vehicles(),
            user_agent: default_user_agent(),
        }
    }
}

impl TrimetConfig {
    pub fn has_app_id(&self) -> bool {
        !self.app_id.trim().is_empty()
    }
}
