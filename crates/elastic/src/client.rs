//! Elasticsearch REST client wrapper.

use crate::config::ElasticConfig;
use reqwest::{Method, RequestBuilder};
use std::time::Duration;
use tracing::info;
use tracks_core::{Error, Result};
use url::Url;

/// Thin REST client bound to one cluster and one index.
#[derive(Clone)]
pub struct ElasticClient {
    http: reqwest::Client,
    base: Url,
    config: ElasticConfig,
}

impl ElasticClient {
    /// Creates a new Elasticsearch client.
    pub fn new(config: ElasticConfig) -> Result<Self> {
        let mut base = Url::parse(&config.url).map_err(|e| {
            Error::config(format!("invalid Elasticsearch url {}: {}", config.url, e))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::setup(format!("failed to build HTTP client: {}", e)))?;

        info!(
            url = %base,
            index = %config.index,
            auth = config.username.is_some(),
            "Created Elasticsearch client"
        );

        Ok(Self { http, base, config })
    }

    /// Builds a request for a path relative to the cluster URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base
            .join(path)
            .map_err(|e| Error::config(format!("invalid request path {}: {}", path, e)))?;

        let mut builder = self.http.request(method, url);
        if let Some(ref user) = self.config.username {
            builder = builder.basic_auth(user, self.config.password.as_ref());
        }
        Ok(builder)
    }

    /// Returns the target index name.
    pub fn index(&self) -> &str {
        &self.config.index
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ElasticConfig {
        &self.config
    }
}
