pub mod pipeline;
pub mod config;
pub mod sources;
pub mod sinks;
pub mod transform;
pub mod merge;
pub mod observability;

pub use pipeline::{get_historical_readings, BatchRetriever, HistoricalRequest, PipelineError, ReadingSource};
