//! The ingestion loop: fetch, transform, deduplicate, write, wait.
//!
//! Ticks never overlap. The next tick is scheduled relative to the end of
//! the previous one, at the configured interval after a tick that made
//! progress and at the backoff delay after a failed one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use elastic_client::TrackSink;
use telemetry::{HealthRegistry, Metrics};
use tracks_core::{Deduplicator, FetchError, Identity, Transformer, WriteError};
use trimet::VehicleFetcher;

use crate::backoff::BackoffState;
use crate::config::SchedulerConfig;
use crate::tick::{TickFailure, TickOutcome, TickResult};

/// Where the loop is between and during ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ticking,
    BackingOff,
    Stopped,
}

/// Strictly sequential ingestion loop.
pub struct IngestScheduler {
    config: SchedulerConfig,
    fetcher: Arc<dyn VehicleFetcher>,
    sink: Arc<dyn TrackSink>,
    transformer: Transformer,
    dedup: Deduplicator,
    backoff: BackoffState,
    interval: Duration,
    ticks: u64,
    state: SchedulerState,
    metrics: &'static Metrics,
    health: &'static HealthRegistry,
}

impl IngestScheduler {
    /// Creates a scheduler reporting to the global metrics and health registries.
    pub fn new(
        config: SchedulerConfig,
        transformer: Transformer,
        fetcher: Arc<dyn VehicleFetcher>,
        sink: Arc<dyn TrackSink>,
    ) -> Self {
        if config.interval_clamped() {
            warn!(
                requested_ms = config.interval_ms,
                min_ms = config.min_interval_ms,
                "Tick interval below minimum, clamping"
            );
        }

        Self {
            interval: config.effective_interval(),
            backoff: BackoffState::new(config.backoff_base(), config.backoff_max()),
            dedup: Deduplicator::new(config.dedup.clone()),
            config,
            fetcher,
            sink,
            transformer,
            ticks: 0,
            state: SchedulerState::Idle,
            metrics: telemetry::metrics(),
            health: telemetry::health(),
        }
    }

    /// Report to the given registries instead of the global ones.
    pub fn with_telemetry(
        mut self,
        metrics: &'static Metrics,
        health: &'static HealthRegistry,
    ) -> Self {
        self.metrics = metrics;
        self.health = health;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn backoff(&self) -> &BackoffState {
        &self.backoff
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Ticks started so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Runs one tick to completion. Errors are folded into the result; a
    /// tick never aborts the loop.
    pub async fn run_tick(&mut self) -> TickResult {
        let started = Instant::now();
        self.ticks += 1;
        self.state = SchedulerState::Ticking;

        let mut result = TickResult::start(self.ticks);
        let call_timeout = self.config.call_timeout();

        let fetch_started = Instant::now();
        let fetched = match timeout(call_timeout, self.fetcher.fetch()).await {
            Ok(fetched) => fetched,
            Err(_) => Err(FetchError::transient(format!(
                "fetch exceeded {}ms",
                call_timeout.as_millis()
            ))),
        };
        self.metrics
            .fetch_latency_ms
            .observe_duration(fetch_started.elapsed());

        let raws = match fetched {
            Ok(raws) => {
                self.health.upstream.set_healthy();
                raws
            }
            Err(e) => {
                self.health.upstream.set_unhealthy(e.to_string());
                if e.is_protocol() {
                    self.metrics.fetch_protocol_errors.inc();
                } else {
                    self.metrics.fetch_transient_errors.inc();
                }
                result.fail(TickFailure::Fetch(e));
                return self.finish(result, started);
            }
        };
        result.fetched = raws.len();

        let batch = self.transformer.transform_batch(&raws, Utc::now());
        for rejection in &batch.rejected {
            debug!(tick = result.tick, code = rejection.code(), "Dropped record: {}", rejection);
        }
        result.validation_failed = batch.rejected.len();
        result.transformed = batch.records.len();

        let fresh = self.dedup.filter(batch.records, result.tick);
        result.deduplicated = result.transformed - fresh.len();

        if fresh.is_empty() {
            return self.finish(result, started);
        }

        let write_started = Instant::now();
        let written = match timeout(call_timeout, self.sink.write(&fresh)).await {
            Ok(written) => written,
            Err(_) => Err(WriteError::transient(format!(
                "write exceeded {}ms",
                call_timeout.as_millis()
            ))),
        };
        self.metrics
            .write_latency_ms
            .observe_duration(write_started.elapsed());

        match written {
            Ok(report) => {
                self.health.sink.set_healthy();
                result.written = report.succeeded;
                result.write_failed = report.failed();
                for failure in &report.failures {
                    warn!(
                        tick = result.tick,
                        document_id = %failure.document_id,
                        status = failure.status,
                        "Record rejected by store: {}",
                        failure.reason
                    );
                }
                // Item rejections are not retried, so the identities stay
                // recorded even when the whole batch was refused.
                if report.all_rejected() {
                    result.fail(TickFailure::AllRejected {
                        rejected: report.failed(),
                    });
                } else if report.is_partial() {
                    result.outcome = TickOutcome::Degraded;
                }
            }
            Err(e) => {
                self.health.sink.set_unhealthy(e.to_string());
                self.metrics.write_errors.inc();
                // Nothing reached the store; let these through again next tick.
                let identities: Vec<Identity> = fresh.iter().map(|r| r.identity()).collect();
                self.dedup.forget(&identities);
                result.write_failed = fresh.len();
                result.fail(TickFailure::Write(e));
            }
        }

        self.finish(result, started)
    }

    /// Updates backoff from a finished tick and returns the delay before the
    /// next one.
    pub fn schedule_next(&mut self, result: &TickResult) -> Duration {
        if result.outcome.made_progress() {
            if self.backoff.is_backing_off() {
                info!(
                    after_failures = self.backoff.consecutive_failures(),
                    "Recovered, backoff reset"
                );
            }
            self.backoff.reset();
            self.state = SchedulerState::Idle;
            self.metrics.consecutive_failures.set(0);
            // Not backing off; the next failure starts again from the base delay.
            self.metrics.backoff_delay_ms.set(0);
            return self.interval;
        }

        let delay = self.backoff.record_failure();
        self.state = SchedulerState::BackingOff;
        self.metrics
            .consecutive_failures
            .set(u64::from(self.backoff.consecutive_failures()));
        self.metrics.backoff_delay_ms.set_duration(delay);
        warn!(
            consecutive_failures = self.backoff.consecutive_failures(),
            delay_ms = delay.as_millis() as u64,
            "Backing off"
        );
        delay
    }

    /// One tick followed by the scheduling decision.
    pub async fn step(&mut self) -> (TickResult, Duration) {
        let result = self.run_tick().await;
        let delay = self.schedule_next(&result);
        (result, delay)
    }

    /// Runs ticks until `shutdown` turns true.
    ///
    /// A shutdown during a wait stops immediately. A shutdown during a tick
    /// lets it finish within the grace period, after which it is abandoned.
    /// A dropped sender is not a shutdown request.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            backoff_base_ms = self.config.backoff_base_ms,
            backoff_max_ms = self.config.backoff_max_ms,
            dedup_window_ticks = self.config.dedup.window_ticks,
            "Ingestion loop starting"
        );

        let grace = self.config.shutdown_grace();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let completed = {
                let tick = self.run_tick();
                tokio::pin!(tick);

                let interrupted = tokio::select! {
                    result = &mut tick => Ok(result),
                    _ = shutdown_requested(&mut shutdown) => Err(()),
                };

                match interrupted {
                    Ok(result) => Some(result),
                    Err(()) => {
                        info!(
                            grace_ms = grace.as_millis() as u64,
                            "Shutdown requested mid-tick, waiting for it to finish"
                        );
                        timeout(grace, &mut tick).await.ok()
                    }
                }
            };

            let Some(result) = completed else {
                self.metrics.ticks_abandoned.inc();
                warn!(tick = self.ticks, "Grace period elapsed, abandoning in-flight tick");
                break;
            };

            let delay = self.schedule_next(&result);
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.state = SchedulerState::Stopped;
        info!(ticks = self.ticks, "Ingestion loop stopped");
    }

    fn finish(&mut self, mut result: TickResult, started: Instant) -> TickResult {
        result.elapsed = started.elapsed();

        let m = self.metrics;
        m.ticks_total.inc();
        match result.outcome {
            TickOutcome::Success => m.ticks_succeeded.inc(),
            TickOutcome::Degraded => m.ticks_degraded.inc(),
            TickOutcome::Failed => m.ticks_failed.inc(),
        }
        m.records_fetched.inc_by(result.fetched as u64);
        m.records_failed_validation
            .inc_by(result.validation_failed as u64);
        m.records_deduplicated.inc_by(result.deduplicated as u64);
        m.records_ingested.inc_by(result.written as u64);
        m.records_failed_write.inc_by(result.write_failed as u64);
        m.tick_latency_ms.observe_duration(result.elapsed);
        m.dedup_entries.set(self.dedup.len() as u64);

        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        m.last_tick_unix_ms.set(now_ms);
        if result.outcome.made_progress() {
            m.last_success_unix_ms.set(now_ms);
        }

        log_tick(&result);
        result
    }
}

fn log_tick(result: &TickResult) {
    info!(
        tick = result.tick,
        outcome = result.outcome.as_str(),
        fetched = result.fetched,
        validation_failed = result.validation_failed,
        deduplicated = result.deduplicated,
        written = result.written,
        write_failed = result.write_failed,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Tick complete"
    );

    if result.validation_failed > 0 {
        warn!(
            tick = result.tick,
            validation_failed = result.validation_failed,
            "Dropped invalid records"
        );
    }

    match &result.failure {
        Some(failure) if failure.is_protocol() => error!(
            tick = result.tick,
            code = failure.code(),
            "Remote contract violated: {}",
            failure
        ),
        Some(failure) => error!(
            tick = result.tick,
            code = failure.code(),
            "Tick failed: {}",
            failure
        ),
        None if result.outcome == TickOutcome::Degraded => warn!(
            tick = result.tick,
            write_failed = result.write_failed,
            "Tick degraded, store rejected records"
        ),
        None => {}
    }
}

/// Resolves once the flag is true. Pending forever if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
