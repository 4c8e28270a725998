//! Vehicle record types.
//!
//! `RawRecord` mirrors one entry of the TriMet `resultSet.vehicle` array and
//! is treated as untrusted. `NormalizedRecord` is the document shape written
//! to the `trimettracks` index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Upstream vehicle entry, exactly as fetched.
///
/// Every field is optional; presence and ranges are checked by the
/// transformer. Numeric coordinate fields accept JSON numbers or numeric
/// strings. Any other non-null value decodes to NaN so that it is rejected
/// as non-finite instead of failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(rename = "vehicleID", default)]
    pub vehicle_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bearing: Option<f64>,
    /// Epoch milliseconds or a timestamp string
    #[serde(default)]
    pub time: Option<Value>,
    #[serde(default)]
    pub route_number: Option<Value>,
    #[serde(default)]
    pub in_congestion: Option<Value>,
    #[serde(rename = "type", default)]
    pub vehicle_type: Option<Value>,
    /// Set when the entry itself could not be decoded (not an object, or a
    /// structurally invalid one). The transformer rejects such records.
    #[serde(skip)]
    pub undecodable: Option<String>,
}

impl RawRecord {
    /// Decode one `resultSet.vehicle` entry. An entry that is not a vehicle
    /// object becomes a placeholder carrying the decode error, so it is
    /// dropped on its own instead of failing the whole response.
    pub fn from_entry(entry: &Value) -> Self {
        Self::deserialize(entry).unwrap_or_else(|e| Self {
            undecodable: Some(e.to_string()),
            ..Self::default()
        })
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }))
}

/// Geo point in Elasticsearch object form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Vehicle class, constrained to the values TriMet publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Bus,
    Rail,
    Unknown,
}

impl VehicleClass {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bus" => Self::Bus,
            "rail" => Self::Rail,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bus => "bus",
            Self::Rail => "rail",
            Self::Unknown => "unknown",
        }
    }
}

/// Canonical track document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub location: GeoPoint,
    /// Upstream bearing, passed through uncorrected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    pub vehicle_ref: String,
    /// Source timestamp, millisecond precision
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Set when the record was transformed
    pub index_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_number: Option<u32>,
    pub in_congestion: bool,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleClass,
}

impl NormalizedRecord {
    pub fn identity(&self) -> Identity {
        Identity {
            vehicle_ref: self.vehicle_ref.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Dedup key: two records are duplicates iff their identities are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub vehicle_ref: String,
    pub timestamp: DateTime<Utc>,
}

impl Identity {
    /// Stable document id, so a re-sent record overwrites rather than
    /// duplicating in the index.
    pub fn document_id(&self) -> String {
        format!("{}-{}", self.vehicle_ref, self.timestamp.timestamp_millis())
    }
}
