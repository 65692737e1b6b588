use std::path::{Path, PathBuf};

use energy_client::api::{ApiError, ReadingsQuery};
use serde_json::Value;

pub mod batch;

pub use batch::{get_historical_readings, split_windows, BatchRetriever, DateInput, HistoricalRequest, DEFAULT_WINDOW_DAYS};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },
    #[error("invalid date '{input}': {reason}")]
    InvalidDate { input: String, reason: String },
    #[error("window size must be at least one day, got {0}")]
    InvalidWindow(i64),
    #[error("cannot determine resource type of '{0}'")]
    UnknownResourceType(String),
    #[error("malformed document {location}: {reason}")]
    MalformedDocument { location: String, reason: String },
    #[error("resource {0} not found")]
    ResourceNotFound(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Anything that can answer a single readings query with a raw document.
///
/// The document is returned as the source shaped it; turning it into
/// canonical readings is the normalizer's job.
#[async_trait::async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch_readings(&self, query: &ReadingsQuery) -> Result<Value, PipelineError>;
}
