//! transit-tracks
//!
//! Polls the TriMet vehicle-position feed on a fixed cadence and indexes
//! each vehicle report into Elasticsearch:
//! - one fetch per tick, no overlap between ticks
//! - per-record validation and normalization
//! - cross-tick duplicate suppression
//! - exponential backoff on failed ticks

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use validator::Validate;

use api::{router, ApiConfig, AppState};
use elastic_client::{ElasticClient, ElasticConfig, ElasticSink, SetupPolicy};
use telemetry::{health, init_tracing_from_env, metrics};
use tracks_core::{TransformConfig, Transformer};
use trimet::{TrimetConfig, TrimetFetcher};
use worker::{IngestScheduler, SchedulerConfig};

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    trimet: TrimetConfig,

    #[serde(default)]
    elastic: ElasticConfig,

    #[serde(default)]
    scheduler: SchedulerConfig,

    #[serde(default)]
    transform: TransformConfig,

    #[serde(default)]
    api: ApiConfig,
}

impl Config {
    fn validate(&self) -> Result<()> {
        self.trimet.validate().context("Invalid [trimet] configuration")?;
        self.elastic.validate().context("Invalid [elastic] configuration")?;
        self.scheduler
            .validate()
            .context("Invalid [scheduler] configuration")?;
        self.scheduler
            .dedup
            .validate()
            .context("Invalid [scheduler.dedup] configuration")?;
        self.transform
            .validate()
            .context("Invalid [transform] configuration")?;
        self.api.validate().context("Invalid [api] configuration")?;

        if !self.trimet.has_app_id() {
            bail!("TriMet app id is required (TRACKS_TRIMET_APP_ID)");
        }
        if !self.scheduler.dedup_holds_batch(self.trimet.max_vehicles) {
            bail!(
                "scheduler.dedup.max_entries ({}) must be at least trimet.max_vehicles ({})",
                self.scheduler.dedup.max_entries,
                self.trimet.max_vehicles
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting transit-tracks v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config.validate()?;

    info!(
        trimet_url = %config.trimet.url,
        elastic_url = %config.elastic.url,
        index = %config.elastic.index,
        interval_ms = config.scheduler.interval_ms,
        "Loaded configuration"
    );

    let fetcher = Arc::new(
        TrimetFetcher::new(config.trimet.clone()).context("Failed to create TriMet client")?,
    );

    let client = ElasticClient::new(config.elastic.clone())
        .context("Failed to create Elasticsearch client")?;

    check_health(&fetcher, &client).await;

    let setup = elastic_client::ensure_index(
        &client,
        SetupPolicy::from_recreate_flag(config.elastic.recreate_index),
    )
    .await
    .context("Failed to set up Elasticsearch index")?;
    health().sink.set_healthy();
    info!(index = client.index(), ?setup, "Index ready");

    let sink = Arc::new(ElasticSink::new(client));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut scheduler = IngestScheduler::new(
        config.scheduler.clone(),
        Transformer::new(config.transform.clone()),
        fetcher,
        sink,
    );
    let scheduler_rx = shutdown_rx.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });

    let server_handle = if config.api.enabled {
        Some(spawn_api_server(&config.api, shutdown_rx.clone()).await?)
    } else {
        None
    };

    shutdown_signal().await;
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler_handle.await {
        error!("Ingestion loop task failed: {}", e);
    }

    if let Some(handle) = server_handle {
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("Server error: {}", e),
            Ok(Err(e)) => error!("Server task failed: {}", e),
            Err(_) => warn!("Server did not stop in time"),
        }
    }

    let snapshot = metrics().snapshot();
    info!(
        ticks = snapshot.ticks_total,
        failed_ticks = snapshot.ticks_failed,
        records_ingested = snapshot.records_ingested,
        records_deduplicated = snapshot.records_deduplicated,
        records_failed_validation = snapshot.records_failed_validation,
        records_failed_write = snapshot.records_failed_write,
        "Shutdown complete"
    );
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::with_prefix("TRACKS")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat overrides for secrets and connection details
    if let Ok(app_id) = std::env::var("TRACKS_TRIMET_APP_ID") {
        config.trimet.app_id = app_id;
    }
    if let Ok(url) = std::env::var("TRACKS_ELASTIC_URL") {
        config.elastic.url = url;
    }
    if let Ok(username) = std::env::var("TRACKS_ELASTIC_USERNAME") {
        config.elastic.username = Some(username);
    }
    if let Ok(password) = std::env::var("TRACKS_ELASTIC_PASSWORD") {
        config.elastic.password = Some(password);
    }
    if let Ok(index) = std::env::var("TRACKS_ELASTIC_INDEX") {
        config.elastic.index = index;
    }

    Ok(config)
}

/// Check component health on startup.
async fn check_health(fetcher: &TrimetFetcher, client: &ElasticClient) {
    if trimet::health::check_connection(fetcher).await {
        health().upstream.set_healthy();
        info!(host = fetcher.host(), "TriMet connection: healthy");
    } else {
        health().upstream.set_unhealthy("Connection failed");
        warn!(host = fetcher.host(), "TriMet connection: unhealthy, loop will back off");
    }

    if elastic_client::health::check_connection(client).await {
        info!("Elasticsearch connection: healthy");
    } else {
        health().sink.set_unhealthy("Connection failed");
        error!("Elasticsearch connection: unhealthy");
    }
}

async fn spawn_api_server(
    config: &ApiConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<std::io::Result<()>>> {
    let addr = config.socket_addr().context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Listening on http://{}", addr);

    let app = router(AppState::default());
    Ok(tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    }))
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
