//! HTTP server configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

/// Health and metrics server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    /// Serve the endpoints at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_enabled() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ApiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}
