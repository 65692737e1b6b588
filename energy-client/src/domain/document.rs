use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The single-resource JSON document written after a retrieval or a CSV
/// conversion.
///
/// Readings are stored as `[epoch_seconds_or_ms, value]` rows exactly as the
/// source delivered them; normalisation happens when the document is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub resource_id: String,
    pub resource_name: String,
    pub resource_unit: String,
    pub resource_classifier: String,
    pub start_date: String,
    pub end_date: String,
    pub period: String,
    #[serde(default)]
    pub timezone_offset: i32,
    #[serde(default)]
    pub readings: Vec<Value>,
}

/// Numeric timestamp of a raw `[timestamp, value]` row, if it has one.
pub fn row_timestamp(row: &Value) -> Option<f64> {
    match row.get(0)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
