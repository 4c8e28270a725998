//! Elasticsearch health checks and one-time index setup.

use crate::client::ElasticClient;
use crate::schema::tracks_index_body;
use reqwest::{Method, StatusCode};
use tracing::{debug, error, info, warn};
use tracks_core::{Error, Result};

/// What to do when the index already exists at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPolicy {
    /// Keep the existing index and its documents.
    Retain,
    /// Delete the index and create it again with the current mapping.
    Recreate,
}

impl SetupPolicy {
    pub fn from_recreate_flag(recreate: bool) -> Self {
        if recreate {
            Self::Recreate
        } else {
            Self::Retain
        }
    }
}

/// Outcome of `ensure_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSetup {
    Created,
    Retained,
    Recreated,
}

/// Check Elasticsearch connection health.
pub async fn check_connection(client: &ElasticClient) -> bool {
    let request = match client.request(Method::GET, "") {
        Ok(r) => r,
        Err(e) => {
            error!("Elasticsearch health check failed: {}", e);
            return false;
        }
    };

    match request.send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!("Elasticsearch connection healthy");
            true
        }
        Ok(resp) => {
            error!(status = %resp.status(), "Elasticsearch health check failed");
            false
        }
        Err(e) => {
            error!("Elasticsearch health check failed: {}", e);
            false
        }
    }
}

/// Whether the configured index exists.
pub async fn index_exists(client: &ElasticClient) -> Result<bool> {
    let resp = client
        .request(Method::HEAD, client.index())?
        .send()
        .await
        .map_err(|e| Error::setup(format!("index lookup failed: {}", e)))?;

    match resp.status() {
        StatusCode::OK => Ok(true),
        StatusCode::NOT_FOUND => Ok(false),
        status => Err(Error::setup(format!(
            "index lookup for {} returned {}",
            client.index(),
            status
        ))),
    }
}

/// Create the configured index with the track mapping.
pub async fn create_index(client: &ElasticClient) -> Result<()> {
    info!(index = client.index(), "Creating index");

    let resp = client
        .request(Method::PUT, client.index())?
        .json(&tracks_index_body())
        .send()
        .await
        .map_err(|e| Error::setup(format!("index creation failed: {}", e)))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::setup(format!(
            "index creation returned {}: {}",
            status, body
        )));
    }
    Ok(())
}

/// Delete the configured index.
pub async fn delete_index(client: &ElasticClient) -> Result<()> {
    warn!(index = client.index(), "Deleting index");

    let resp = client
        .request(Method::DELETE, client.index())?
        .send()
        .await
        .map_err(|e| Error::setup(format!("index deletion failed: {}", e)))?;

    if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
        return Err(Error::setup(format!(
            "index deletion returned {}",
            resp.status()
        )));
    }
    Ok(())
}

/// Make sure the index exists before the loop starts.
pub async fn ensure_index(client: &ElasticClient, policy: SetupPolicy) -> Result<IndexSetup> {
    if !index_exists(client).await? {
        create_index(client).await?;
        return Ok(IndexSetup::Created);
    }

    match policy {
        SetupPolicy::Retain => {
            info!(index = client.index(), "Retaining existing index");
            Ok(IndexSetup::Retained)
        }
        SetupPolicy::Recreate => {
            delete_index(client).await?;
            create_index(client).await?;
            Ok(IndexSetup::Recreated)
        }
    }
}
