//! Outcome of a single ingestion tick.

use std::fmt;
use std::time::Duration;
use tracks_core::{FetchError, WriteError};

/// How a tick ended, as seen by the backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Everything handed to the sink was stored, or there was nothing to store.
    Success,
    /// The sink rejected some records but stored at least one.
    Degraded,
    /// The fetch or the write failed as a whole, or the sink rejected every
    /// record.
    Failed,
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }

    /// Success and Degraded both reset backoff.
    pub fn made_progress(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stage that failed a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickFailure {
    Fetch(FetchError),
    Write(WriteError),
    /// The write went through but the store refused every record in it.
    AllRejected { rejected: usize },
}

impl TickFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.code(),
            Self::Write(e) => e.code(),
            Self::AllRejected { .. } => "WRITE_003",
        }
    }

    /// The remote answered in a shape the loop does not understand.
    pub fn is_protocol(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_protocol(),
            Self::Write(e) => matches!(e, WriteError::Protocol(_)),
            Self::AllRejected { .. } => false,
        }
    }
}

impl fmt::Display for TickFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => e.fmt(f),
            Self::Write(e) => e.fmt(f),
            Self::AllRejected { rejected } => {
                write!(f, "[WRITE_003] store rejected all {} records", rejected)
            }
        }
    }
}

/// Per-tick counts and outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    pub tick: u64,
    pub outcome: TickOutcome,
    /// Records returned by the upstream
    pub fetched: usize,
    /// Records that passed validation
    pub transformed: usize,
    /// Records dropped by validation
    pub validation_failed: usize,
    /// Records suppressed as already seen
    pub deduplicated: usize,
    /// Records the sink stored
    pub written: usize,
    /// Records the sink rejected individually
    pub write_failed: usize,
    pub failure: Option<TickFailure>,
    pub elapsed: Duration,
}

impl TickResult {
    pub(crate) fn start(tick: u64) -> Self {
        Self {
            tick,
            outcome: TickOutcome::Success,
            fetched: 0,
            transformed: 0,
            validation_failed: 0,
            deduplicated: 0,
            written: 0,
            write_failed: 0,
            failure: None,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn fail(&mut self, failure: TickFailure) {
        self.outcome = TickOutcome::Failed;
        self.failure = Some(failure);
    }
}
