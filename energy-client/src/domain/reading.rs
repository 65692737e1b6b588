use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single canonical measurement.
///
/// `timestamp` is whole epoch seconds. Single-source readings always carry a
/// value; rows whose value could not be parsed never become a `Reading`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: i64,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Human-readable rendering of a reading's timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampIso {
    /// `YYYY-MM-DDTHH:MM:SS`.
    Resolved(String),
    /// The timestamp could not be turned into an instant; holds the raw value.
    DegradedTimestamp(String),
}

impl TimestampIso {
    pub fn as_str(&self) -> &str {
        match self {
            TimestampIso::Resolved(s) | TimestampIso::DegradedTimestamp(s) => s,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, TimestampIso::DegradedTimestamp(_))
    }

    pub fn into_string(self) -> String {
        match self {
            TimestampIso::Resolved(s) | TimestampIso::DegradedTimestamp(s) => s,
        }
    }
}

impl fmt::Display for TimestampIso {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumption and cost at one timestamp. A side with no reading is `None`,
/// which is distinct from a reading of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub timestamp: i64,
    pub timestamp_iso: String,
    pub consumption_value: Option<f64>,
    pub cost_value: Option<f64>,
}

/// One row of the all-resources table: a `{type}_{category}` column per
/// resource type and category, zero where that series had no reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRecord {
    pub timestamp: i64,
    pub timestamp_iso: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

/// Per-day totals of a merged series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub consumption_total: f64,
    pub cost_total: f64,
    pub reading_count: u64,
}
