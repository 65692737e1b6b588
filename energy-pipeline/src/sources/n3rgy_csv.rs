use std::fs;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use energy_client::api::{DateParam, ReadingsQuery, DEFAULT_PERIOD};
use energy_client::domain::{row_timestamp, Category, PersistedDocument, ResourceKind, ResourceMetadata};
use serde_json::{json, Value};
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use super::filename::{detect_date_range, detect_resource_type};
use crate::merge::wide::{write_wide_jsonl, WideTable};
use crate::pipeline::batch::parse_iso_instant;
use crate::pipeline::{PipelineError, ReadingSource};
use crate::sinks::{read_document, write_document};
use crate::transform::{self, compact_date, epoch_seconds, format_iso, RawDocument};

/// Consumption cell of a repeated header row.
pub const CONSUMPTION_HEADER_SENTINEL: &str = "energyConsumption (kWh)";
/// Cost cell of a repeated header row.
pub const COST_HEADER_SENTINEL: &str = "current £/day";
/// Exports state cost per day in pounds; documents hold pence.
pub const PENCE_PER_POUND: f64 = 100.0;

/// Fixed metadata of the series produced from an export.
pub fn resource_metadata(kind: ResourceKind, category: Category) -> Option<ResourceMetadata> {
    let kind = match kind {
        ResourceKind::Electricity | ResourceKind::Gas => kind.as_str(),
        _ => return None,
    };
    let meta = match category {
        Category::Consumption => ResourceMetadata {
            resource_id: format!("n3rgy-{kind}"),
            resource_name: format!("{kind} consumption"),
            resource_unit: "kWh".to_string(),
            resource_classifier: format!("{kind}.consumption"),
        },
        Category::Cost => ResourceMetadata {
            resource_id: format!("n3rgy-{kind}-cost"),
            resource_name: format!("{kind} cost"),
            resource_unit: "pence".to_string(),
            resource_classifier: format!("{kind}.consumption.cost"),
        },
    };
    Some(meta)
}

/// Documents written for one export.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub consumption: PathBuf,
    /// `None` when cost extraction was off or the export had no cost column.
    pub cost: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct ParsedExport {
    consumption: Vec<Value>,
    cost: Vec<Value>,
    earliest: Option<OffsetDateTime>,
    latest: Option<OffsetDateTime>,
    skipped: usize,
}

/// Local adapter over half-hourly CSV exports (`timestamp,consumption,cost`).
///
/// Exports are read from `source_dir` and written as single-resource
/// documents to `output_dir`, which is also where [`get_resource_data`]
/// looks them up.
///
/// [`get_resource_data`]: N3rgyCsvSource::get_resource_data
pub struct N3rgyCsvSource {
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl N3rgyCsvSource {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Convert every `*.csv` in the source directory. Files whose type cannot
    /// be told from the name, or that fail to convert, are logged and skipped.
    /// With `combine`, also writes the all-resources JSONL next to them.
    pub fn process_all_files(&self, extract_cost: bool, combine: bool) -> Result<Vec<PathBuf>, PipelineError> {
        let exports = list_files(&self.source_dir, "csv")?;
        if exports.is_empty() {
            tracing::warn!(dir = %self.source_dir.display(), "no csv exports found");
            return Ok(Vec::new());
        }
        tracing::info!(dir = %self.source_dir.display(), files = exports.len(), "processing csv exports");

        let mut produced = Vec::new();
        for export in &exports {
            let stem = export.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let kind = match detect_resource_type(stem) {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!(file = %export.display(), error = %e, "skipping export");
                    metrics::counter!("csv_files_skipped_total").increment(1);
                    continue;
                }
            };
            let destination = self
                .output_dir
                .join(format!("{kind}_consumption_{}.json", detect_date_range(stem)));

            match self.transform_to(export, kind, Some(&destination), extract_cost) {
                Ok(out) => {
                    produced.push(out.consumption);
                    produced.extend(out.cost);
                }
                Err(e) => {
                    tracing::error!(file = %export.display(), error = %e, "failed to convert export, skipping");
                    metrics::counter!("csv_files_skipped_total").increment(1);
                }
            }
        }

        if combine && !produced.is_empty() {
            self.create_jsonl_from_documents(&produced, None)?;
        }
        Ok(produced)
    }

    /// Convert one export, naming the output after the readings it holds.
    pub fn transform(&self, source: &Path, kind: ResourceKind, extract_cost: bool) -> Result<TransformOutput, PipelineError> {
        self.transform_to(source, kind, None, extract_cost)
    }

    /// Convert one export. The cost document, if any, sits beside the
    /// consumption one with `_consumption_` replaced by `_cost_`.
    pub fn transform_to(
        &self,
        source: &Path,
        kind: ResourceKind,
        destination: Option<&Path>,
        extract_cost: bool,
    ) -> Result<TransformOutput, PipelineError> {
        let consumption_meta =
            resource_metadata(kind, Category::Consumption).ok_or_else(|| PipelineError::UnknownResourceType(kind.to_string()))?;
        let cost_meta =
            resource_metadata(kind, Category::Cost).ok_or_else(|| PipelineError::UnknownResourceType(kind.to_string()))?;

        let parsed = parse_export(source, extract_cost)?;
        if parsed.skipped > 0 {
            metrics::counter!("csv_rows_skipped_total").increment(parsed.skipped as u64);
        }

        let consumption_path = match destination {
            Some(p) => p.to_path_buf(),
            None => {
                let range = match (parsed.earliest.and_then(compact_date), parsed.latest.and_then(compact_date)) {
                    (Some(from), Some(to)) => format!("{from}_to_{to}"),
                    _ => detect_date_range(source.file_stem().and_then(|s| s.to_str()).unwrap_or_default()),
                };
                self.output_dir.join(format!("{kind}_consumption_{range}.json"))
            }
        };

        let start_date = parsed.earliest.and_then(format_iso).unwrap_or_default();
        let end_date = parsed.latest.and_then(format_iso).unwrap_or_default();
        let document = |meta: ResourceMetadata, readings: Vec<Value>| PersistedDocument {
            resource_id: meta.resource_id,
            resource_name: meta.resource_name,
            resource_unit: meta.resource_unit,
            resource_classifier: meta.resource_classifier,
            start_date: start_date.clone(),
            end_date: end_date.clone(),
            period: DEFAULT_PERIOD.to_string(),
            timezone_offset: 0,
            readings,
        };

        let consumption_count = parsed.consumption.len();
        write_document(&consumption_path, &document(consumption_meta, parsed.consumption))?;
        tracing::info!(
            source = %source.display(),
            output = %consumption_path.display(),
            readings = consumption_count,
            skipped = parsed.skipped,
            from = %start_date,
            to = %end_date,
            "converted consumption"
        );

        let cost = if extract_cost && !parsed.cost.is_empty() {
            let cost_path = PathBuf::from(consumption_path.to_string_lossy().replace("_consumption_", "_cost_"));
            let cost_count = parsed.cost.len();
            write_document(&cost_path, &document(cost_meta, parsed.cost))?;
            tracing::info!(output = %cost_path.display(), readings = cost_count, "converted cost");
            Some(cost_path)
        } else {
            None
        };

        Ok(TransformOutput {
            consumption: consumption_path,
            cost,
        })
    }

    /// Join documents into one wide JSONL, a column per type and category.
    /// Defaults to `all_resources_{earliest}_to_{latest}.jsonl` in the output
    /// directory, the range taken from the document file names.
    pub fn create_jsonl_from_documents(&self, documents: &[PathBuf], destination: Option<&Path>) -> Result<PathBuf, PipelineError> {
        let destination = match destination {
            Some(p) => p.to_path_buf(),
            None => self.output_dir.join(all_resources_file_name(documents)),
        };

        let mut table = WideTable::new();
        for path in documents {
            let series = transform::normalize(RawDocument::Persisted(read_document(path)?));
            let classifier = series.metadata.resource_classifier.clone();
            let type_token = classifier.split('.').next().unwrap_or_default();
            table.add_series(type_token, Category::from_classifier(&classifier), &series);
        }

        write_wide_jsonl(&destination, &table)?;
        Ok(destination)
    }

    /// The processed document for `resource_id`, its readings limited to the
    /// given calendar dates (inclusive, UTC).
    pub fn get_resource_data(
        &self,
        resource_id: &str,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<PersistedDocument, PipelineError> {
        for path in list_files(&self.output_dir, "json")? {
            let mut doc = match read_document(&path) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "unreadable document, skipping");
                    continue;
                }
            };
            if doc.resource_id != resource_id {
                continue;
            }
            if start.is_some() || end.is_some() {
                doc.readings.retain(|row| within_dates(row, start, end));
            }
            return Ok(doc);
        }
        Err(PipelineError::ResourceNotFound(resource_id.to_string()))
    }
}

#[async_trait::async_trait]
impl ReadingSource for N3rgyCsvSource {
    async fn fetch_readings(&self, query: &ReadingsQuery) -> Result<Value, PipelineError> {
        let start = query.from.as_ref().map(query_date).transpose()?;
        let end = query.to.as_ref().map(query_date).transpose()?;
        let doc = self.get_resource_data(&query.resource_id, start, end)?;
        Ok(serde_json::to_value(doc)?)
    }
}

fn query_date(param: &DateParam) -> Result<Date, PipelineError> {
    match param {
        DateParam::Instant(dt) => Ok(dt.date()),
        DateParam::Text(s) => Ok(parse_iso_instant(s)?.date()),
    }
}

fn within_dates(row: &Value, start: Option<Date>, end: Option<Date>) -> bool {
    let Some(date) = row_timestamp(row)
        .and_then(epoch_seconds)
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        .map(|dt| dt.date())
    else {
        return false;
    };
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}

fn parse_export(source: &Path, extract_cost: bool) -> Result<ParsedExport, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(source)?;

    let mut parsed = ParsedExport::default();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(file = %source.display(), line, error = %e, "unreadable csv row, skipping");
                parsed.skipped += 1;
                continue;
            }
        };
        if let Err(reason) = parse_row(&record, extract_cost, &mut parsed) {
            tracing::warn!(file = %source.display(), line, row = ?record, reason, "could not parse row, skipping");
            parsed.skipped += 1;
        }
    }
    Ok(parsed)
}

/// Blank or header-repeat rows are ignored silently; other unusable rows
/// report why.
fn parse_row(record: &StringRecord, extract_cost: bool, parsed: &mut ParsedExport) -> Result<(), &'static str> {
    if record.len() < 2 {
        return Ok(());
    }
    let consumption = record.get(1).unwrap_or_default();
    if consumption.trim().is_empty() || consumption == CONSUMPTION_HEADER_SENTINEL {
        return Ok(());
    }

    let when = PrimitiveDateTime::parse(record.get(0).unwrap_or_default().trim(), format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .map_err(|_| "timestamp is not YYYY-MM-DD HH:MM")?
        .assume_utc();
    let value: f64 = consumption.trim().parse().map_err(|_| "consumption is not a number")?;

    let ts = when.unix_timestamp();
    parsed.earliest = Some(parsed.earliest.map_or(when, |e| e.min(when)));
    parsed.latest = Some(parsed.latest.map_or(when, |l| l.max(when)));
    parsed.consumption.push(json!([ts, value]));

    if extract_cost {
        let cost = record.get(2).unwrap_or_default().trim();
        if !cost.is_empty() && cost != COST_HEADER_SENTINEL {
            let pounds: f64 = cost.parse().map_err(|_| "cost is not a number")?;
            parsed.cost.push(json!([ts, pounds * PENCE_PER_POUND]));
        }
    }
    Ok(())
}

fn all_resources_file_name(documents: &[PathBuf]) -> String {
    let mut bounds: Vec<String> = documents
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
        .map(detect_date_range)
        .filter_map(|range| {
            range
                .split_once("_to_")
                .map(|(a, b)| [a.to_string(), b.to_string()])
        })
        .flatten()
        .collect();
    bounds.sort();

    match (bounds.first(), bounds.last()) {
        (Some(first), Some(last)) => format!("all_resources_{first}_to_{last}.jsonl"),
        _ => "all_resources_unknown_to_unknown.jsonl".to_string(),
    }
}

/// Regular files in `dir` with the given extension, sorted by name.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    const HEADER: &str = "timestamp,energyConsumption (kWh),current £/day\n";

    fn export(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("{HEADER}{}\n", rows.join("\n"))).unwrap();
        path
    }

    fn readings(path: &Path) -> Vec<(i64, f64)> {
        read_document(path)
            .unwrap()
            .readings
            .iter()
            .map(|r| (r[0].as_i64().unwrap(), r[1].as_f64().unwrap()))
            .collect()
    }

    #[test]
    fn export_becomes_consumption_and_cost_documents() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let csv = export(
            src.path(),
            "electricity_202502.csv",
            &["2025-02-01 00:00,0.25,0.0456", "2025-02-01 00:30,0.5,0.05"],
        );

        let client = N3rgyCsvSource::new(src.path(), out.path());
        let result = client.transform(&csv, ResourceKind::Electricity, true).unwrap();

        assert_eq!(result.consumption, out.path().join("electricity_consumption_20250201_to_20250201.json"));
        assert_eq!(result.cost, Some(out.path().join("electricity_cost_20250201_to_20250201.json")));

        let doc = read_document(&result.consumption).unwrap();
        assert_eq!(doc.resource_id, "n3rgy-electricity");
        assert_eq!(doc.resource_classifier, "electricity.consumption");
        assert_eq!(doc.start_date, "2025-02-01T00:00:00");
        assert_eq!(doc.end_date, "2025-02-01T00:30:00");
        assert_eq!(doc.period, "PT30M");
        assert_eq!(readings(&result.consumption), vec![(1738368000, 0.25), (1738369800, 0.5)]);

        let cost = readings(result.cost.as_ref().unwrap());
        assert_eq!(cost[0].0, 1738368000);
        assert!((cost[0].1 - 4.56).abs() < 1e-9, "cost in pence: {}", cost[0].1);
        assert!((cost[1].1 - 5.0).abs() < 1e-9);

        let cost_doc = read_document(result.cost.as_ref().unwrap()).unwrap();
        assert_eq!(cost_doc.resource_unit, "pence");
        assert_eq!(cost_doc.resource_classifier, "electricity.consumption.cost");
    }

    #[test]
    fn sentinel_blank_and_bad_rows_are_tolerated() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let csv = export(
            src.path(),
            "gas_20250201_to_20250202.csv",
            &[
                "timestamp,energyConsumption (kWh),current £/day",
                "2025-02-01 00:00,,0.01",
                "yesterday,1.0,0.01",
                "2025-02-01 00:30,1.5,current £/day",
                "2025-02-01 01:00,2.0,",
                "2025-02-01 01:30,2.5,n/a",
                "2025-02-01 02:00",
                "2025-02-01 02:30,3.0,0.02",
            ],
        );

        let client = N3rgyCsvSource::new(src.path(), out.path());
        let result = client.transform(&csv, ResourceKind::Gas, true).unwrap();

        let consumption: Vec<f64> = readings(&result.consumption).into_iter().map(|(_, v)| v).collect();
        assert_eq!(consumption, vec![1.5, 2.0, 2.5, 3.0]);
        // only the last row had a usable cost
        assert_eq!(readings(result.cost.as_ref().unwrap()).len(), 1);
    }

    #[test]
    fn cost_extraction_can_be_disabled() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let csv = export(src.path(), "gas_202502.csv", &["2025-02-01 00:00,0.25,0.0456"]);

        let result = N3rgyCsvSource::new(src.path(), out.path())
            .transform(&csv, ResourceKind::Gas, false)
            .unwrap();
        assert_eq!(result.cost, None);
    }

    #[test]
    fn empty_export_is_named_from_its_file_name() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let csv = export(src.path(), "gas_202402.csv", &[]);

        let result = N3rgyCsvSource::new(src.path(), out.path())
            .transform(&csv, ResourceKind::Gas, true)
            .unwrap();

        assert_eq!(result.consumption, out.path().join("gas_consumption_20240201_to_20240229.json"));
        let doc = read_document(&result.consumption).unwrap();
        assert_eq!(doc.start_date, "");
        assert!(doc.readings.is_empty());
    }

    #[test]
    fn water_exports_are_rejected() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let csv = export(src.path(), "water_202402.csv", &["2024-02-01 00:00,1,0.1"]);

        let err = N3rgyCsvSource::new(src.path(), out.path())
            .transform(&csv, ResourceKind::Water, true)
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownResourceType(_)));
    }

    #[test]
    fn process_all_skips_unknown_types_and_combines() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        export(src.path(), "electricity_202502.csv", &["2025-02-01 00:00,0.25,0.0456"]);
        export(src.path(), "gas_202502.csv", &["2025-02-01 00:30,1.5,0.02"]);
        export(src.path(), "solar_202502.csv", &["2025-02-01 00:30,9,0"]);
        fs::write(src.path().join("notes.txt"), "ignore me").unwrap();

        let client = N3rgyCsvSource::new(src.path(), out.path());
        let produced = client.process_all_files(true, true).unwrap();

        assert_eq!(
            produced,
            vec![
                out.path().join("electricity_consumption_20250201_to_20250228.json"),
                out.path().join("electricity_cost_20250201_to_20250228.json"),
                out.path().join("gas_consumption_20250201_to_20250228.json"),
                out.path().join("gas_cost_20250201_to_20250228.json"),
            ]
        );

        let combined = out.path().join("all_resources_20250201_to_20250228.jsonl");
        let lines: Vec<Value> = fs::read_to_string(&combined)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["timestamp"], json!(1738368000));
        assert_eq!(lines[0]["electricity_consumption"], json!(0.25));
        assert_eq!(lines[0]["gas_consumption"], json!(0.0));
        assert_eq!(lines[1]["gas_consumption"], json!(1.5));
        assert_eq!(lines[1]["electricity_cost"], json!(0.0));
        assert_eq!(lines[1]["gas_consumption_id"], json!("n3rgy-gas"));
    }

    #[test]
    fn resource_data_is_filtered_by_calendar_date() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let csv = export(
            src.path(),
            "electricity_202502.csv",
            &["2025-02-01 23:30,1.0,0.1", "2025-02-02 00:00,2.0,0.1", "2025-02-03 00:00,3.0,0.1"],
        );
        let client = N3rgyCsvSource::new(src.path(), out.path());
        client.transform(&csv, ResourceKind::Electricity, true).unwrap();

        let doc = client
            .get_resource_data("n3rgy-electricity", Some(date!(2025 - 02 - 02)), Some(date!(2025 - 02 - 02)))
            .unwrap();
        assert_eq!(doc.readings, vec![json!([1738454400, 2.0])]);

        let all = client.get_resource_data("n3rgy-electricity-cost", None, None).unwrap();
        assert_eq!(all.readings.len(), 3);

        assert!(matches!(
            client.get_resource_data("n3rgy-gas", None, None),
            Err(PipelineError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn local_source_answers_readings_queries() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let csv = export(
            src.path(),
            "gas_202502.csv",
            &["2025-02-01 00:00,1.0,0.1", "2025-02-05 00:00,2.0,0.1"],
        );
        let client = N3rgyCsvSource::new(src.path(), out.path());
        client.transform(&csv, ResourceKind::Gas, false).unwrap();

        let query = ReadingsQuery::new("n3rgy-gas").with_range(datetime!(2025-02-04 00:00 UTC), datetime!(2025-02-06 00:00 UTC));
        let doc = client.fetch_readings(&query).await.unwrap();

        assert_eq!(doc["readings"], json!([[1738713600, 2.0]]));
    }
}
