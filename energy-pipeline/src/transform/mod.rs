use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use energy_client::domain::{Category, PersistedDocument, Reading, ResourceMetadata, ResourceSeries};
use serde_json::{Map, Value};

use crate::pipeline::PipelineError;

pub mod resolution;
pub mod timestamp;

pub use resolution::{Field, FieldRule, SourceKey, FIELD_RULES, READINGS_KEYS};
pub use timestamp::{compact_date, epoch_seconds, format_iso, timestamp_iso, MILLISECOND_THRESHOLD};

/// A readings document in one of the shapes the pipeline meets.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDocument {
    /// Remote API response (camelCase, query echoed under `query`) or any
    /// loosely shaped object; resolved field by field.
    Api(Map<String, Value>),
    /// Single-resource document written by this pipeline.
    Persisted(PersistedDocument),
    /// Already canonical.
    Canonical(ResourceSeries),
}

impl RawDocument {
    pub fn from_value(value: Value) -> Result<Self, PipelineError> {
        let Value::Object(map) = value else {
            return Err(PipelineError::MalformedDocument {
                location: "<document>".to_string(),
                reason: "top level is not a JSON object".to_string(),
            });
        };

        if resolution::API_ONLY_KEYS.iter().any(|k| map.contains_key(*k)) {
            return Ok(RawDocument::Api(map));
        }
        if map.contains_key("metadata") {
            if let Ok(series) = serde_json::from_value::<ResourceSeries>(Value::Object(map.clone())) {
                return Ok(RawDocument::Canonical(series));
            }
        }
        match serde_json::from_value::<PersistedDocument>(Value::Object(map.clone())) {
            Ok(doc) => Ok(RawDocument::Persisted(doc)),
            Err(_) => Ok(RawDocument::Api(map)),
        }
    }
}

/// Read and classify a document from disk. Unreadable or non-JSON files are
/// errors; odd field shapes are left to the normalizer.
pub fn load_raw_document(path: &Path) -> Result<RawDocument, PipelineError> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let value: Value = serde_json::from_str(&text).map_err(|e| PipelineError::MalformedDocument {
        location: path.display().to_string(),
        reason: e.to_string(),
    })?;
    RawDocument::from_value(value).map_err(|e| match e {
        PipelineError::MalformedDocument { reason, .. } => PipelineError::MalformedDocument {
            location: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// What normalisation had to throw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Rows that were not a pair, or whose timestamp or value was not numeric.
    pub dropped_rows: usize,
    /// Rows that repeated an earlier timestamp and replaced its value.
    pub duplicate_timestamps: usize,
}

pub fn normalize(raw: RawDocument) -> ResourceSeries {
    normalize_with_report(raw).0
}

/// Canonical series of `raw`. Never fails: bad rows are dropped and counted.
pub fn normalize_with_report(raw: RawDocument) -> (ResourceSeries, NormalizeReport) {
    normalize_as(raw, None)
}

/// As [`normalize_with_report`]. Missing fields take the defaults of
/// `category`, else of the category the document's classifier names.
pub fn normalize_as(raw: RawDocument, category: Option<Category>) -> (ResourceSeries, NormalizeReport) {
    let mut report = NormalizeReport::default();

    let series = match raw {
        RawDocument::Api(map) => {
            let classifier = resolution::resolve(&map, Field::Classifier);
            let category = category.unwrap_or_else(|| Category::from_classifier(&classifier));
            let metadata = ResourceMetadata {
                resource_id: resolution::resolve(&map, Field::ResourceId),
                resource_name: resolution::resolve_as(&map, Field::ResourceName, category),
                resource_unit: resolution::resolve_as(&map, Field::Units, category),
                resource_classifier: classifier,
            };
            ResourceSeries {
                metadata,
                resource_type: resolution::resolve(&map, Field::ResourceType),
                from: resolution::resolve(&map, Field::From),
                to: resolution::resolve(&map, Field::To),
                period: resolution::resolve(&map, Field::Period),
                readings: canonical_readings(resolution::readings(&map), &mut report),
            }
        }
        RawDocument::Persisted(doc) => {
            let readings = canonical_readings(&doc.readings, &mut report);
            ResourceSeries {
                metadata: ResourceMetadata {
                    resource_id: doc.resource_id,
                    resource_name: doc.resource_name,
                    resource_unit: doc.resource_unit,
                    resource_classifier: doc.resource_classifier,
                },
                resource_type: resolution::UNKNOWN.to_string(),
                from: doc.start_date,
                to: doc.end_date,
                period: doc.period,
                readings,
            }
        }
        RawDocument::Canonical(mut series) => {
            let mut by_ts = BTreeMap::new();
            for r in series.readings.drain(..) {
                if by_ts.insert(r.timestamp, r.value).is_some() {
                    report.duplicate_timestamps += 1;
                }
            }
            series.readings = by_ts.into_iter().map(|(t, v)| Reading::new(t, v)).collect();
            series
        }
    };

    if report.dropped_rows > 0 {
        metrics::counter!("normalizer_rows_dropped_total").increment(report.dropped_rows as u64);
        tracing::warn!(
            resource_id = %series.metadata.resource_id,
            dropped = report.dropped_rows,
            "dropped unusable reading rows"
        );
    }
    if report.duplicate_timestamps > 0 {
        tracing::debug!(
            resource_id = %series.metadata.resource_id,
            duplicates = report.duplicate_timestamps,
            "collapsed duplicate timestamps"
        );
    }

    (series, report)
}

/// Rows to ascending, de-duplicated readings. Later rows win on a repeated
/// timestamp.
fn canonical_readings(rows: &[Value], report: &mut NormalizeReport) -> Vec<Reading> {
    let mut by_ts: BTreeMap<i64, f64> = BTreeMap::new();

    for row in rows {
        let Some(pair) = row.as_array().filter(|a| a.len() >= 2) else {
            report.dropped_rows += 1;
            continue;
        };
        let (Some(ts), Some(value)) = (numeric(&pair[0]).and_then(epoch_seconds), numeric(&pair[1])) else {
            report.dropped_rows += 1;
            continue;
        };
        if by_ts.insert(ts, value).is_some() {
            report.duplicate_timestamps += 1;
        }
    }

    by_ts.into_iter().map(|(t, v)| Reading::new(t, v)).collect()
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn api_doc() -> Value {
        json!({
            "resourceId": "7c2d-elec",
            "resourceTypeId": "ea02304a",
            "name": "electricity consumption",
            "classifier": "electricity.consumption",
            "units": "kWh",
            "query": {"from": "2023-01-01T00:00:00", "to": "2023-01-11T00:00:00", "period": "PT30M", "function": "sum"},
            "data": [[1672531200, 0.25], [1672533000, 0.5]]
        })
    }

    #[test]
    fn api_shape_resolves_camel_case_and_query_fields() {
        let series = normalize(RawDocument::from_value(api_doc()).unwrap());

        assert_eq!(series.metadata.resource_id, "7c2d-elec");
        assert_eq!(series.metadata.resource_name, "electricity consumption");
        assert_eq!(series.metadata.resource_unit, "kWh");
        assert_eq!(series.resource_type, "ea02304a");
        assert_eq!(series.from, "2023-01-01T00:00:00");
        assert_eq!(series.to, "2023-01-11T00:00:00");
        assert_eq!(series.period, "PT30M");
        assert_eq!(series.readings, vec![Reading::new(1672531200, 0.25), Reading::new(1672533000, 0.5)]);
    }

    #[test]
    fn persisted_shape_is_typed() {
        let raw = RawDocument::from_value(json!({
            "resource_id": "n3rgy-gas",
            "resource_name": "gas consumption",
            "resource_unit": "kWh",
            "resource_classifier": "gas.consumption",
            "start_date": "2025-02-01T00:00:00",
            "end_date": "2025-02-01T00:30:00",
            "period": "PT30M",
            "timezone_offset": 0,
            "readings": [[1738368000, 1.25], [1738369800, 0.75]]
        }))
        .unwrap();
        assert!(matches!(raw, RawDocument::Persisted(_)));

        let series = normalize(raw);
        assert_eq!(series.metadata.resource_classifier, "gas.consumption");
        assert_eq!(series.from, "2025-02-01T00:00:00");
        assert_eq!(series.readings.len(), 2);
    }

    #[test]
    fn partial_snake_case_document_falls_back_to_defaults() {
        let raw = RawDocument::from_value(json!({"resource_id": "legacy", "readings": [[1620000000, 5.5]]})).unwrap();
        assert!(matches!(raw, RawDocument::Api(_)));

        let series = normalize(raw);
        assert_eq!(series.metadata.resource_id, "legacy");
        assert_eq!(series.metadata.resource_name, "energy consumption");
        assert_eq!(series.metadata.resource_unit, "kWh");
        assert_eq!(series.metadata.resource_classifier, "unknown");
        assert_eq!(series.period, "unknown");
        assert_eq!(series.from, "unknown");
    }

    #[test]
    fn millisecond_and_second_timestamps_land_on_the_same_scale() {
        let series = normalize(
            RawDocument::from_value(json!({"data": [[1620000000000_i64, 5.5], [1620001800, 6.0]]})).unwrap(),
        );
        assert_eq!(series.readings, vec![Reading::new(1620000000, 5.5), Reading::new(1620001800, 6.0)]);
    }

    #[test]
    fn malformed_rows_are_dropped_and_counted() {
        let (series, report) = normalize_with_report(
            RawDocument::from_value(json!({
                "data": [
                    [1620000000, 1.0],
                    [1620001800],
                    "garbage",
                    [1620003600, null],
                    [1620005400, "n/a"],
                    ["not-a-time", 2.0],
                    ["1620007200", "3.5"]
                ]
            }))
            .unwrap(),
        );

        assert_eq!(series.readings, vec![Reading::new(1620000000, 1.0), Reading::new(1620007200, 3.5)]);
        assert_eq!(report.dropped_rows, 5);
    }

    #[test]
    fn duplicate_timestamps_keep_the_last_value_and_sort() {
        let (series, report) = normalize_with_report(
            RawDocument::from_value(json!({"data": [[300, 3.0], [100, 1.0], [300, 3.5], [200, 2.0]]})).unwrap(),
        );

        assert_eq!(
            series.readings,
            vec![Reading::new(100, 1.0), Reading::new(200, 2.0), Reading::new(300, 3.5)]
        );
        assert_eq!(report.duplicate_timestamps, 1);
    }

    #[test]
    fn canonical_documents_pass_through() {
        let series = normalize(RawDocument::from_value(api_doc()).unwrap());
        let value = serde_json::to_value(&series).unwrap();

        let raw = RawDocument::from_value(value).unwrap();
        assert!(matches!(raw, RawDocument::Canonical(_)));
        assert_eq!(normalize(raw), series);
    }

    #[test]
    fn non_object_document_is_malformed() {
        let err = RawDocument::from_value(json!([[1, 2]])).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDocument { .. }));
    }

    #[test]
    fn loading_invalid_json_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = load_raw_document(file.path()).unwrap_err();
        match err {
            PipelineError::MalformedDocument { location, .. } => {
                assert_eq!(location, file.path().display().to_string())
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
