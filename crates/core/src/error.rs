//! Error taxonomy for the ingestion loop.
//!
//! Error codes:
//! - FETCH_001-002: Upstream fetch errors
//! - VALID_001-007: Per-record validation errors
//! - WRITE_001-002: Sink write errors
//! - SETUP_001-002: One-time setup and configuration errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single upstream fetch.
///
/// The fetcher never retries; both variants are handed to the scheduler,
/// which applies backoff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeout, connection failure, or a retryable HTTP status.
    #[error("[FETCH_001] transient upstream failure: {0}")]
    Transient(String),

    /// The upstream answered with something that is not the expected shape.
    #[error("[FETCH_002] upstream protocol violation: {0}")]
    Protocol(String),
}

impl FetchError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transient(_) => "FETCH_001",
            Self::Protocol(_) => "FETCH_002",
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// A single record that cannot be normalized. The record is dropped and
/// counted; the rest of the batch continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("[VALID_001] missing vehicle identifier")]
    MissingIdentifier,

    #[error("[VALID_002] missing {0}")]
    MissingCoordinate(&'static str),

    #[error("[VALID_003] {field} is not finite for vehicle {vehicle}")]
    NonFiniteCoordinate { vehicle: String, field: &'static str },

    #[error("[VALID_004] {field} {value} out of range for vehicle {vehicle}")]
    CoordinateOutOfRange {
        vehicle: String,
        field: &'static str,
        value: f64,
    },

    #[error("[VALID_005] unparsable timestamp for vehicle {vehicle}: {raw}")]
    InvalidTimestamp { vehicle: String, raw: String },

    #[error("[VALID_006] timestamp {timestamp} for vehicle {vehicle} outside accepted skew")]
    TimestampOutOfRange { vehicle: String, timestamp: String },

    #[error("[VALID_007] undecodable vehicle entry: {0}")]
    UndecodableEntry(String),
}

impl ValidationError {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingIdentifier => "VALID_001",
            Self::MissingCoordinate(_) => "VALID_002",
            Self::NonFiniteCoordinate { .. } => "VALID_003",
            Self::CoordinateOutOfRange { .. } => "VALID_004",
            Self::InvalidTimestamp { .. } => "VALID_005",
            Self::TimestampOutOfRange { .. } => "VALID_006",
            Self::UndecodableEntry(_) => "VALID_007",
        }
    }
}

/// Failure of a whole bulk write. Item-level rejections are not errors; they
/// are reported in `WriteReport`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// Store unreachable, timed out, or overloaded. Nothing was written.
    #[error("[WRITE_001] transient sink failure: {0}")]
    Transient(String),

    /// The store rejected the request as a whole or answered unintelligibly.
    #[error("[WRITE_002] sink protocol violation: {0}")]
    Protocol(String),
}

impl WriteError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transient(_) => "WRITE_001",
            Self::Protocol(_) => "WRITE_002",
        }
    }
}

/// Unified error type for setup and configuration, outside the tick loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[SETUP_001] {0}")]
    Setup(String),

    #[error("[SETUP_002] invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl Error {
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Setup(_) => Some("SETUP_001"),
            Self::Config(_) => Some("SETUP_002"),
            Self::Fetch(e) => Some(e.code()),
            Self::Write(e) => Some(e.code()),
            Self::Serialization(_) => None,
        }
    }
}
