pub mod document;
pub mod reading;
pub mod resource;

pub use document::{row_timestamp, PersistedDocument};
pub use reading::{DailyAggregate, MergedRecord, Reading, TimestampIso, WideRecord};
pub use resource::{Category, ResourceKind, ResourceMetadata, ResourceSeries};
