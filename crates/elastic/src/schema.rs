//! Index mapping for track documents.
//!
//! `bearing` is mapped as a plain double. The maps layer rotates icons by
//! this field in 2D, so compass bearings are stored uncorrected.

use serde_json::{json, Value};

/// Body for `PUT /{index}`.
pub fn tracks_index_body() -> Value {
    json!({
        "mappings": {
            "properties": {
                "location": {
                    "type": "geo_point",
                    "ignore_malformed": true
                },
                "vehicle_ref": { "type": "keyword" },
                "bearing": { "type": "double" },
                "@timestamp": { "type": "date" },
                "index_time": { "type": "date" },
                "in_congestion": { "type": "boolean" },
                "route_number": { "type": "double" },
                "type": { "type": "keyword" }
            }
        }
    })
}
