use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use energy_client::domain::PersistedDocument;

use crate::pipeline::PipelineError;

/// Write a single-resource document as pretty JSON, creating parent
/// directories as needed.
pub fn write_document(path: &Path, doc: &PersistedDocument) -> Result<(), PipelineError> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, doc)?;
    writer.flush().map_err(|e| PipelineError::io(path, e))?;

    tracing::info!(path = %path.display(), readings = doc.readings.len(), "wrote document");
    Ok(())
}

pub fn read_document(path: &Path) -> Result<PersistedDocument, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| PipelineError::MalformedDocument {
        location: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), PipelineError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_is_written_into_missing_directories_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw").join("electricity_consumption_20250201_to_20250202.json");
        let doc = PersistedDocument {
            resource_id: "n3rgy-electricity".to_string(),
            resource_name: "electricity consumption".to_string(),
            resource_unit: "kWh".to_string(),
            resource_classifier: "electricity.consumption".to_string(),
            start_date: "2025-02-01T00:00:00".to_string(),
            end_date: "2025-02-02T00:00:00".to_string(),
            period: "PT30M".to_string(),
            timezone_offset: 0,
            readings: vec![json!([1738368000, 0.5])],
        };

        write_document(&path, &doc).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"resource_id\""), "expected indented JSON: {text}");
        assert_eq!(read_document(&path).unwrap(), doc);
    }

    #[test]
    fn reading_a_non_document_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(matches!(read_document(&path), Err(PipelineError::MalformedDocument { .. })));
    }
}
