pub mod columnar;
pub mod document;
pub mod jsonl;

pub use columnar::{coerce_numeric_columns, convert_jsonl_to_columnar, load_jsonl_rows, ColumnarWriter, CsvTableWriter, FlatRecord};
pub use document::{read_document, write_document};
pub use jsonl::{canonical_records, convert_batch_to_jsonl, write_jsonl, CanonicalRecord, JsonlConverter};
