use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use energy_client::domain::{Category, MergedRecord, ResourceKind, ResourceSeries};
use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineError;
use crate::sinks::write_jsonl;
use crate::sources::n3rgy_csv::list_files;
use crate::transform::{self, timestamp_iso};

pub mod rollup;
pub mod wide;

pub use rollup::{group_by_day, to_yearly, DayBoundary};
pub use wide::{combine_all, write_wide_jsonl, WideMetadata, WideTable};

/// Full outer join of a consumption and a cost series on timestamp.
///
/// Every timestamp of either side appears once; the side without a reading
/// there is `None`.
pub fn merge(consumption: &ResourceSeries, cost: &ResourceSeries) -> BTreeMap<i64, MergedRecord> {
    let mut merged: BTreeMap<i64, MergedRecord> = BTreeMap::new();

    for r in &consumption.readings {
        merged.insert(
            r.timestamp,
            MergedRecord {
                timestamp: r.timestamp,
                timestamp_iso: timestamp_iso(r.timestamp).into_string(),
                consumption_value: Some(r.value),
                cost_value: None,
            },
        );
    }
    for r in &cost.readings {
        merged
            .entry(r.timestamp)
            .or_insert_with(|| MergedRecord {
                timestamp: r.timestamp,
                timestamp_iso: timestamp_iso(r.timestamp).into_string(),
                consumption_value: None,
                cost_value: None,
            })
            .cost_value = Some(r.value);
    }

    merged
}

/// Metadata repeated on every line of a combined consumption/cost file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairMetadata {
    /// First word of the consumption resource's name.
    pub resource_type: String,
    pub consumption_id: String,
    pub consumption_name: String,
    pub consumption_classifier: String,
    pub consumption_unit: String,
    pub cost_id: String,
    pub cost_name: String,
    pub cost_classifier: String,
    pub cost_unit: String,
    pub period: String,
    pub from_date: String,
    pub to_date: String,
}

impl PairMetadata {
    /// Period and range are taken from the consumption side.
    pub fn from_series(consumption: &ResourceSeries, cost: &ResourceSeries) -> Self {
        Self {
            resource_type: ResourceKind::from_resource_name(&consumption.metadata.resource_name).to_string(),
            consumption_id: consumption.metadata.resource_id.clone(),
            consumption_name: consumption.metadata.resource_name.clone(),
            consumption_classifier: consumption.metadata.resource_classifier.clone(),
            consumption_unit: consumption.metadata.resource_unit.clone(),
            cost_id: cost.metadata.resource_id.clone(),
            cost_name: cost.metadata.resource_name.clone(),
            cost_classifier: cost.metadata.resource_classifier.clone(),
            cost_unit: cost.metadata.resource_unit.clone(),
            period: consumption.period.clone(),
            from_date: consumption.from.clone(),
            to_date: consumption.to.clone(),
        }
    }

    /// `{type}_combined_{YYYYMMDD}_to_{YYYYMMDD}.jsonl`
    pub fn combined_file_name(&self) -> String {
        format!(
            "{}_combined_{}_to_{}.jsonl",
            self.resource_type,
            compact_iso_date(&self.from_date),
            compact_iso_date(&self.to_date)
        )
    }
}

/// `2023-01-01T00:00:00` -> `20230101`
fn compact_iso_date(iso: &str) -> String {
    iso.split('T').next().unwrap_or(iso).replace('-', "")
}

#[derive(Serialize)]
struct CombinedLine<'a> {
    #[serde(flatten)]
    metadata: &'a PairMetadata,
    #[serde(flatten)]
    record: &'a MergedRecord,
}

/// A consumption document and the cost document for the same type and range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePair {
    pub resource_type: String,
    pub date_range: String,
    pub consumption: PathBuf,
    pub cost: PathBuf,
}

/// Pair `*.json` documents in `dir` by type and date range.
///
/// Type is `electricity`, `gas` or `water` by substring of the file name,
/// else `unknown`; the range is every `_`-separated token after the second.
/// Pairs come back ordered by type, then range.
pub fn find_matching_resource_files(dir: &Path) -> Result<Vec<ResourcePair>, PipelineError> {
    let mut consumption: BTreeMap<(String, String), PathBuf> = BTreeMap::new();
    let mut cost: BTreeMap<(String, String), PathBuf> = BTreeMap::new();

    for path in list_files(dir, "json")? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let lower = name.to_lowercase();
        let resource_type = ["electricity", "gas", "water"]
            .into_iter()
            .find(|t| lower.contains(t))
            .unwrap_or("unknown");

        let parts: Vec<&str> = name.split('_').collect();
        if parts.len() < 3 {
            continue;
        }
        let date_range = parts[2..].join("_").replace(".json", "");
        let key = (resource_type.to_string(), date_range);

        if lower.contains("consumption") {
            consumption.insert(key, path);
        } else if lower.contains("cost") {
            cost.insert(key, path);
        }
    }

    let pairs: Vec<ResourcePair> = consumption
        .into_iter()
        .filter_map(|(key, consumption)| {
            cost.remove(&key).map(|cost| ResourcePair {
                resource_type: key.0,
                date_range: key.1,
                consumption,
                cost,
            })
        })
        .collect();

    tracing::info!(dir = %dir.display(), pairs = pairs.len(), "matched consumption/cost documents");
    Ok(pairs)
}

pub fn load_series(path: &Path) -> Result<ResourceSeries, PipelineError> {
    Ok(transform::normalize(transform::load_raw_document(path)?))
}

/// Load a document known to hold `category` readings.
pub fn load_series_as(path: &Path, category: Category) -> Result<ResourceSeries, PipelineError> {
    Ok(transform::normalize_as(transform::load_raw_document(path)?, Some(category)).0)
}

/// Load, normalise and merge a consumption/cost document pair.
pub fn merge_files(consumption: &Path, cost: &Path) -> Result<(BTreeMap<i64, MergedRecord>, PairMetadata), PipelineError> {
    let consumption = load_series_as(consumption, Category::Consumption)?;
    let cost = load_series_as(cost, Category::Cost)?;
    Ok((merge(&consumption, &cost), PairMetadata::from_series(&consumption, &cost)))
}

/// Writes merged and aggregated views of persisted documents.
pub struct ResourceCombiner {
    output_dir: PathBuf,
}

impl ResourceCombiner {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Merge one pair into a combined JSONL file, named after the pair when no
    /// output path is given.
    pub fn combine_resource_files(
        &self,
        consumption: &Path,
        cost: &Path,
        output: Option<&Path>,
    ) -> Result<PathBuf, PipelineError> {
        let (merged, metadata) = merge_files(consumption, cost)?;
        let output = match output {
            Some(p) => p.to_path_buf(),
            None => self.output_dir.join(metadata.combined_file_name()),
        };

        let count = write_jsonl(
            &output,
            merged.values().map(|record| CombinedLine {
                metadata: &metadata,
                record,
            }),
        )?;
        tracing::info!(
            resource_type = %metadata.resource_type,
            output = %output.display(),
            records = count,
            "combined consumption and cost"
        );
        Ok(output)
    }

    /// Combine every matched pair in `dir`; a pair that fails is logged and
    /// skipped.
    pub fn combine_batch_resources(&self, dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let mut written = Vec::new();
        for pair in find_matching_resource_files(dir)? {
            tracing::info!(consumption = %pair.consumption.display(), cost = %pair.cost.display(), "combining pair");
            match self.combine_resource_files(&pair.consumption, &pair.cost, None) {
                Ok(path) => written.push(path),
                Err(e) => {
                    tracing::error!(
                        consumption = %pair.consumption.display(),
                        cost = %pair.cost.display(),
                        error = %e,
                        "failed to combine pair, skipping"
                    );
                    metrics::counter!("combine_pairs_skipped_total").increment(1);
                }
            }
        }
        Ok(written)
    }

    /// All matched pairs of `dir` in one wide JSONL file.
    pub fn combine_all_resources(&self, dir: &Path, output: Option<&Path>) -> Result<PathBuf, PipelineError> {
        let table = wide::build_wide_table(dir)?;
        let output = match output {
            Some(p) => p.to_path_buf(),
            None => self.output_dir.join(table.file_name()),
        };
        write_wide_jsonl(&output, &table)?;
        Ok(output)
    }

    /// Daily totals of the given pairs, one file per calendar year.
    pub fn to_yearly(&self, pairs: &[ResourcePair], boundary: DayBoundary) -> Result<Vec<PathBuf>, PipelineError> {
        to_yearly(pairs, &self.output_dir, boundary)
    }
}
