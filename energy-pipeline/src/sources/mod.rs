pub mod filename;
pub mod glowmarkt;
pub mod n3rgy_csv;

pub use filename::{detect_date_range, detect_resource_type, UNKNOWN_DATE_RANGE};
pub use glowmarkt::{calendar_month_range, document_file_name, persisted_document, select_resource};
pub use n3rgy_csv::{list_files, N3rgyCsvSource, TransformOutput};
