use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};

use crate::pipeline::PipelineError;
use crate::sinks::document::ensure_parent;

/// One flat row handed to a columnar writer.
pub type FlatRecord = Map<String, Value>;

/// Consumer of flat records that writes a compressed columnar file.
pub trait ColumnarWriter {
    fn write_table(&mut self, records: &[FlatRecord]) -> Result<(), PipelineError>;
}

/// Columns coerced to numbers before the hand-off; values that do not parse
/// become null.
pub const NUMERIC_COLUMNS: &[&str] = &[
    "timestamp",
    "value",
    "consumption_value",
    "cost_value",
    "electricity_consumption",
    "electricity_cost",
    "gas_consumption",
    "gas_cost",
    "water_consumption",
    "water_cost",
];

/// Object lines of a JSONL file. Blank lines are ignored; lines that are not
/// a JSON object are logged and skipped.
pub fn load_jsonl_rows(path: &Path) -> Result<Vec<FlatRecord>, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut rows = Vec::new();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| PipelineError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(map)) => rows.push(map),
            Ok(_) => {
                tracing::warn!(path = %path.display(), line = idx + 1, "jsonl line is not an object, skipping");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), line = idx + 1, error = %e, "invalid jsonl line, skipping");
                metrics::counter!("columnar_invalid_lines_total").increment(1);
            }
        }
    }
    Ok(rows)
}

pub fn coerce_numeric_columns(rows: &mut [FlatRecord]) {
    for row in rows.iter_mut() {
        for column in NUMERIC_COLUMNS {
            if let Some(cell) = row.get_mut(*column) {
                *cell = coerce(cell);
            }
        }
    }
}

fn coerce(cell: &Value) -> Value {
    match cell {
        Value::Number(_) => cell.clone(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Value::Number(i.into())
            } else {
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        _ => Value::Null,
    }
}

/// Load `path`, coerce numeric columns and hand the rows to `writer`.
/// Returns the row count.
pub fn convert_jsonl_to_columnar<W: ColumnarWriter + ?Sized>(path: &Path, writer: &mut W) -> Result<usize, PipelineError> {
    let mut rows = load_jsonl_rows(path)?;
    coerce_numeric_columns(&mut rows);
    writer.write_table(&rows)?;

    tracing::info!(path = %path.display(), rows = rows.len(), "handed rows to columnar writer");
    Ok(rows.len())
}

/// Writes a table as CSV: one column per key seen in any record, in first
/// seen order. Missing and null cells are empty.
pub struct CsvTableWriter {
    path: PathBuf,
}

impl CsvTableWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ColumnarWriter for CsvTableWriter {
    fn write_table(&mut self, records: &[FlatRecord]) -> Result<(), PipelineError> {
        let mut columns: Vec<&str> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }

        ensure_parent(&self.path)?;
        let mut wtr = csv::Writer::from_path(&self.path)?;
        wtr.write_record(&columns)?;
        for record in records {
            wtr.write_record(columns.iter().map(|c| match record.get(*c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            }))?;
        }
        wtr.flush().map_err(|e| PipelineError::io(&self.path, e))?;
        Ok(())
    }
}
