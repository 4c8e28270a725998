//! Raw vehicle entry → track document.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::ValidationError;
use crate::limits::{
    MAX_FUTURE_SKEW_SECS, MAX_LATITUDE, MAX_LONGITUDE, MAX_RECORD_AGE_SECS, MIN_LATITUDE,
    MIN_LONGITUDE,
};
use crate::records::{GeoPoint, NormalizedRecord, RawRecord, VehicleClass};

/// How the upstream bearing is carried into the document.
///
/// TriMet reports bearing in compass degrees while the maps consumer of the
/// index treats it as a flat 2D rotation. The value is not corrected either
/// way; it is either passed through or left out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BearingMode {
    #[default]
    Passthrough,
    Omit,
}

/// Transformer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransformConfig {
    #[serde(default)]
    pub bearing: BearingMode,
    /// Accepted clock skew for source timestamps ahead of local time
    #[serde(default = "default_max_future_skew_secs")]
    #[validate(range(min = 0))]
    pub max_future_skew_secs: i64,
    /// Positions older than this are stale and dropped
    #[serde(default = "default_max_record_age_secs")]
    #[validate(range(min = 1))]
    pub max_record_age_secs: i64,
}

fn default_max_future_skew_secs() -> i64 {
    MAX_FUTURE_SKEW_SECS
}

fn default_max_record_age_secs() -> i64 {
    MAX_RECORD_AGE_SECS
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            bearing: BearingMode::default(),
            max_future_skew_secs: default_max_future_skew_secs(),
            max_record_age_secs: default_max_record_age_secs(),
        }
    }
}

/// Result of transforming one fetched batch.
#[derive(Debug, Default)]
pub struct TransformedBatch {
    pub records: Vec<NormalizedRecord>,
    pub rejected: Vec<ValidationError>,
}

/// Stateless mapping from `RawRecord` to `NormalizedRecord`.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    config: TransformConfig,
}

impl Transformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Transform a single record using the current time as the ingestion
    /// clock.
    pub fn transform(&self, raw: &RawRecord) -> Result<NormalizedRecord, ValidationError> {
        self.transform_at(raw, Utc::now())
    }

    /// Transform a single record against an explicit ingestion clock.
    pub fn transform_at(
        &self,
        raw: &RawRecord,
        now: DateTime<Utc>,
    ) -> Result<NormalizedRecord, ValidationError> {
        if let Some(reason) = &raw.undecodable {
            return Err(ValidationError::UndecodableEntry(reason.clone()));
        }

        let vehicle_ref = vehicle_ref(raw.vehicle_id.as_ref())?;

        let lat = coordinate(
            &vehicle_ref,
            "latitude",
            raw.latitude,
            MIN_LATITUDE,
            MAX_LATITUDE,
        )?;
        let lon = coordinate(
            &vehicle_ref,
            "longitude",
            raw.longitude,
            MIN_LONGITUDE,
            MAX_LONGITUDE,
        )?;

        let timestamp = source_timestamp(&vehicle_ref, raw.time.as_ref())?;
        self.check_skew(&vehicle_ref, timestamp, now)?;

        let bearing = match self.config.bearing {
            BearingMode::Passthrough => raw.bearing.filter(|b| b.is_finite()),
            BearingMode::Omit => None,
        };

        let vehicle_type = match &raw.vehicle_type {
            Some(Value::String(s)) => VehicleClass::parse(s),
            _ => VehicleClass::Unknown,
        };

        Ok(NormalizedRecord {
            location: GeoPoint { lat, lon },
            bearing,
            vehicle_ref,
            timestamp,
            index_time: now.trunc_subsecs(3),
            route_number: route_number(raw.route_number.as_ref()),
            in_congestion: truthy(raw.in_congestion.as_ref()),
            vehicle_type,
        })
    }

    /// Transform a batch, dropping invalid records and keeping the rest in
    /// their original order.
    pub fn transform_batch(&self, raws: &[RawRecord], now: DateTime<Utc>) -> TransformedBatch {
        let mut batch = TransformedBatch {
            records: Vec::with_capacity(raws.len()),
            rejected: Vec::new(),
        };

        for raw in raws {
            match self.transform_at(raw, now) {
                Ok(record) => batch.records.push(record),
                Err(e) => batch.rejected.push(e),
            }
        }

        batch
    }

    fn check_skew(
        &self,
        vehicle_ref: &str,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let newest = now + Duration::seconds(self.config.max_future_skew_secs);
        let oldest = now - Duration::seconds(self.config.max_record_age_secs);

        if timestamp > newest || timestamp < oldest {
            return Err(ValidationError::TimestampOutOfRange {
                vehicle: vehicle_ref.to_string(),
                timestamp: timestamp.to_rfc3339(),
            });
        }
        Ok(())
    }
}

fn vehicle_ref(raw: Option<&Value>) -> Result<String, ValidationError> {
    match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(match n.as_u64() {
            Some(id) => id.to_string(),
            None => n.to_string(),
        }),
        _ => Err(ValidationError::MissingIdentifier),
    }
}

fn coordinate(
    vehicle_ref: &str,
    field: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingCoordinate(field))?;

    if !value.is_finite() {
        return Err(ValidationError::NonFiniteCoordinate {
            vehicle: vehicle_ref.to_string(),
            field,
        });
    }

    if !(min..=max).contains(&value) {
        return Err(ValidationError::CoordinateOutOfRange {
            vehicle: vehicle_ref.to_string(),
            field,
            value,
        });
    }

    Ok(value)
}

fn source_timestamp(
    vehicle_ref: &str,
    raw: Option<&Value>,
) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = || ValidationError::InvalidTimestamp {
        vehicle: vehicle_ref.to_string(),
        raw: raw.map(|v| v.to_string()).unwrap_or_else(|| "missing".into()),
    };

    let parsed = match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(millis) => DateTime::from_timestamp_millis(millis),
                Err(_) => DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc)),
            }
        }
        _ => None,
    };

    parsed.map(|ts| ts.trunc_subsecs(3)).ok_or_else(invalid)
}

fn route_number(raw: Option<&Value>) -> Option<u32> {
    match raw? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|r| u32::try_from(r).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn truthy(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}
