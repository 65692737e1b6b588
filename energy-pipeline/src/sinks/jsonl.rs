use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use energy_client::domain::ResourceSeries;
use serde::{Deserialize, Serialize};

use super::document::ensure_parent;
use crate::pipeline::PipelineError;
use crate::transform::{self, timestamp_iso};

/// Write one JSON object per line. Returns the number of lines written.
pub fn write_jsonl<T, I>(path: &Path, records: I) -> Result<usize, PipelineError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut count = 0usize;
    for record in records {
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n").map_err(|e| PipelineError::io(path, e))?;
        count += 1;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;

    tracing::info!(path = %path.display(), records = count, "wrote jsonl");
    Ok(count)
}

/// One reading flattened together with its resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub resource_id: String,
    pub resource_name: String,
    pub resource_type: String,
    pub classifier: String,
    pub units: String,
    pub period: String,
    pub from_date: String,
    pub to_date: String,
    pub timestamp: i64,
    pub timestamp_iso: String,
    pub value: f64,
}

pub fn canonical_records(series: &ResourceSeries) -> Vec<CanonicalRecord> {
    series
        .readings
        .iter()
        .map(|r| CanonicalRecord {
            resource_id: series.metadata.resource_id.clone(),
            resource_name: series.metadata.resource_name.clone(),
            resource_type: series.resource_type.clone(),
            classifier: series.metadata.resource_classifier.clone(),
            units: series.metadata.resource_unit.clone(),
            period: series.period.clone(),
            from_date: series.from.clone(),
            to_date: series.to.clone(),
            timestamp: r.timestamp,
            timestamp_iso: timestamp_iso(r.timestamp).into_string(),
            value: r.value,
        })
        .collect()
}

/// Converts readings documents of any known shape to canonical JSONL.
pub struct JsonlConverter {
    output_dir: PathBuf,
}

impl JsonlConverter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Convert one document. Output defaults to `{output_dir}/{stem}.jsonl`.
    pub fn convert_file(&self, input: &Path, output: Option<&Path>) -> Result<PathBuf, PipelineError> {
        let series = transform::normalize(transform::load_raw_document(input)?);
        let output = match output {
            Some(p) => p.to_path_buf(),
            None => self.output_dir.join(jsonl_name(input)),
        };

        let count = write_jsonl(&output, canonical_records(&series))?;
        tracing::info!(input = %input.display(), output = %output.display(), records = count, "converted to jsonl");
        Ok(output)
    }

    /// Convert many documents; a file that fails is logged and skipped.
    pub fn convert_batch(&self, inputs: &[PathBuf]) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for input in inputs {
            match self.convert_file(input, None) {
                Ok(path) => written.push(path),
                Err(e) => {
                    tracing::error!(input = %input.display(), error = %e, "jsonl conversion failed, skipping file");
                    metrics::counter!("jsonl_files_skipped_total").increment(1);
                }
            }
        }
        written
    }
}

pub fn convert_batch_to_jsonl(inputs: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
    JsonlConverter::new(output_dir).convert_batch(inputs)
}

fn jsonl_name(input: &Path) -> String {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("readings");
    format!("{stem}.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;

    fn read_lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn api_document_becomes_flat_records() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("electricity_20230101.json");
        fs::write(
            &input,
            json!({
                "resourceId": "r-1",
                "resourceTypeId": "t-1",
                "name": "electricity consumption",
                "classifier": "electricity.consumption",
                "units": "kWh",
                "query": {"from": "2023-01-01T00:00:00", "to": "2023-01-02T00:00:00", "period": "PT30M"},
                "data": [[1672531200000_i64, 0.25], [1672533000000_i64, 0.5]]
            })
            .to_string(),
        )
        .unwrap();

        let out = JsonlConverter::new(dir.path().join("jsonl")).convert_file(&input, None).unwrap();

        assert_eq!(out, dir.path().join("jsonl").join("electricity_20230101.jsonl"));
        let lines = read_lines(&out);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            json!({
                "resource_id": "r-1",
                "resource_name": "electricity consumption",
                "resource_type": "t-1",
                "classifier": "electricity.consumption",
                "units": "kWh",
                "period": "PT30M",
                "from_date": "2023-01-01T00:00:00",
                "to_date": "2023-01-02T00:00:00",
                "timestamp": 1672531200,
                "timestamp_iso": "2023-01-01T00:00:00",
                "value": 0.25
            })
        );
    }

    #[test]
    fn batch_conversion_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        fs::write(&good, json!({"readings": [[1620000000, 1.0]]}).to_string()).unwrap();
        fs::write(&bad, "{ truncated").unwrap();

        let out_dir = dir.path().join("out");
        let written = convert_batch_to_jsonl(&[bad, good.clone(), dir.path().join("missing.json")], &out_dir);

        assert_eq!(written, vec![out_dir.join("good.jsonl")]);
        assert_eq!(read_lines(&written[0])[0]["resource_id"], json!("unknown"));
    }
}
