use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use energy_client::api::DEFAULT_PERIOD;
use energy_client::domain::{Category, MergedRecord, ResourceKind, ResourceMetadata, ResourceSeries, WideRecord};
use serde::{Deserialize, Serialize};

use super::{find_matching_resource_files, merge_files, PairMetadata};
use crate::pipeline::batch::parse_iso_instant;
use crate::pipeline::PipelineError;
use crate::sinks::write_jsonl;
use crate::transform::resolution::default_for;
use crate::transform::{compact_date, timestamp_iso, Field};

/// `{type}_{category}`, the value column of one series in a wide record.
pub fn column(resource_type: &str, category: Category) -> String {
    format!("{resource_type}_{category}")
}

/// Metadata shared by every line of a wide file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideMetadata {
    pub period: String,
    pub from_date: String,
    pub to_date: String,
    /// `{type}_{category}_{id,name,unit,classifier}` for every column.
    #[serde(flatten)]
    pub resources: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct WideLine<'a> {
    #[serde(flatten)]
    metadata: &'a WideMetadata,
    #[serde(flatten)]
    record: &'a WideRecord,
}

/// Several series joined on timestamp, one column per type and category.
///
/// Every record carries every column of the known types plus any other type
/// that was added; a series with no reading at a timestamp reads as zero.
#[derive(Debug, Default)]
pub struct WideTable {
    rows: BTreeMap<i64, BTreeMap<String, f64>>,
    types: BTreeSet<String>,
    resources: BTreeMap<String, ResourceMetadata>,
    period: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

impl WideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn add_series(&mut self, resource_type: &str, category: Category, series: &ResourceSeries) {
        let col = column(resource_type, category);
        self.types.insert(resource_type.to_string());
        self.resources.insert(col.clone(), series.metadata.clone());
        self.note_range(&series.period, &series.from, &series.to);

        for r in &series.readings {
            self.rows.entry(r.timestamp).or_default().insert(col.clone(), r.value);
        }
    }

    /// Add a merged consumption/cost pair. Missing sides stay absent and are
    /// zero-filled on output.
    pub fn add_merged(&mut self, pair: &PairMetadata, merged: &BTreeMap<i64, MergedRecord>) {
        let resource_type = pair.resource_type.as_str();
        let consumption_col = column(resource_type, Category::Consumption);
        let cost_col = column(resource_type, Category::Cost);

        self.types.insert(resource_type.to_string());
        self.resources.insert(
            consumption_col.clone(),
            ResourceMetadata {
                resource_id: pair.consumption_id.clone(),
                resource_name: pair.consumption_name.clone(),
                resource_unit: pair.consumption_unit.clone(),
                resource_classifier: pair.consumption_classifier.clone(),
            },
        );
        self.resources.insert(
            cost_col.clone(),
            ResourceMetadata {
                resource_id: pair.cost_id.clone(),
                resource_name: pair.cost_name.clone(),
                resource_unit: pair.cost_unit.clone(),
                resource_classifier: pair.cost_classifier.clone(),
            },
        );
        self.note_range(&pair.period, &pair.from_date, &pair.to_date);

        for (ts, record) in merged {
            let row = self.rows.entry(*ts).or_default();
            if let Some(v) = record.consumption_value {
                row.insert(consumption_col.clone(), v);
            }
            if let Some(v) = record.cost_value {
                row.insert(cost_col.clone(), v);
            }
        }
    }

    fn note_range(&mut self, period: &str, from: &str, to: &str) {
        if self.period.is_none() && is_known(period) {
            self.period = Some(period.to_string());
        }
        if is_known(from) && self.from.as_deref().map_or(true, |f| from < f) {
            self.from = Some(from.to_string());
        }
        if is_known(to) && self.to.as_deref().map_or(true, |t| to > t) {
            self.to = Some(to.to_string());
        }
    }

    /// Types with columns on every record: the known ones first, then the rest.
    fn all_types(&self) -> Vec<String> {
        let mut types: Vec<String> = ResourceKind::KNOWN.iter().map(|k| k.as_str().to_string()).collect();
        let extra: Vec<String> = self.types.iter().filter(|t| !types.contains(*t)).cloned().collect();
        types.extend(extra);
        types
    }

    pub fn metadata(&self) -> WideMetadata {
        let mut resources = BTreeMap::new();
        for resource_type in self.all_types() {
            for category in Category::ALL {
                let col = column(&resource_type, category);
                let meta = self
                    .resources
                    .get(&col)
                    .cloned()
                    .unwrap_or_else(|| placeholder(&resource_type, category));
                resources.insert(format!("{col}_id"), meta.resource_id);
                resources.insert(format!("{col}_name"), meta.resource_name);
                resources.insert(format!("{col}_unit"), meta.resource_unit);
                resources.insert(format!("{col}_classifier"), meta.resource_classifier);
            }
        }

        WideMetadata {
            period: self.period.clone().unwrap_or_else(|| DEFAULT_PERIOD.to_string()),
            from_date: self.from.clone().unwrap_or_default(),
            to_date: self.to.clone().unwrap_or_default(),
            resources,
        }
    }

    /// Ascending by timestamp, every column present.
    pub fn records(&self) -> Vec<WideRecord> {
        let columns: Vec<String> = self
            .all_types()
            .iter()
            .flat_map(|t| Category::ALL.map(|c| column(t, c)))
            .collect();

        self.rows
            .iter()
            .map(|(ts, values)| {
                let mut values = values.clone();
                for col in &columns {
                    values.entry(col.clone()).or_insert(0.0);
                }
                WideRecord {
                    timestamp: *ts,
                    timestamp_iso: timestamp_iso(*ts).into_string(),
                    values,
                }
            })
            .collect()
    }

    /// `all_resources_{YYYYMMDD}_to_{YYYYMMDD}.jsonl` from the covered range.
    pub fn file_name(&self) -> String {
        let compact = |iso: &Option<String>| {
            iso.as_deref()
                .and_then(|s| parse_iso_instant(s).ok())
                .and_then(compact_date)
                .unwrap_or_else(|| "unknown".to_string())
        };
        format!("all_resources_{}_to_{}.jsonl", compact(&self.from), compact(&self.to))
    }
}

fn is_known(value: &str) -> bool {
    !value.is_empty() && value != "unknown"
}

fn placeholder(resource_type: &str, category: Category) -> ResourceMetadata {
    let unit = default_for(Field::Units, category);
    let classifier = match category {
        Category::Consumption => format!("{resource_type}.consumption"),
        Category::Cost => format!("{resource_type}.consumption.cost"),
    };
    ResourceMetadata {
        resource_id: format!("unknown-{resource_type}-{category}"),
        resource_name: format!("{resource_type} {category}"),
        resource_unit: unit.to_string(),
        resource_classifier: classifier,
    }
}

/// Write every record of `table` with the shared metadata merged in.
pub fn write_wide_jsonl(path: &Path, table: &WideTable) -> Result<usize, PipelineError> {
    let metadata = table.metadata();
    let records = table.records();
    let count = write_jsonl(
        path,
        records.iter().map(|record| WideLine {
            metadata: &metadata,
            record,
        }),
    )?;
    tracing::info!(
        path = %path.display(),
        records = count,
        from = %metadata.from_date,
        to = %metadata.to_date,
        "wrote all-resources jsonl"
    );
    Ok(count)
}

/// Merge every consumption/cost pair in `dir` and join them across types.
/// A pair that fails to load is logged and left out.
pub fn build_wide_table(dir: &Path) -> Result<WideTable, PipelineError> {
    let mut table = WideTable::new();
    for pair in find_matching_resource_files(dir)? {
        match merge_files(&pair.consumption, &pair.cost) {
            Ok((merged, mut metadata)) => {
                // the file name decides which columns a pair fills
                metadata.resource_type = pair.resource_type.clone();
                table.add_merged(&metadata, &merged);
            }
            Err(e) => {
                tracing::error!(
                    consumption = %pair.consumption.display(),
                    cost = %pair.cost.display(),
                    error = %e,
                    "failed to merge pair, leaving it out"
                );
                metrics::counter!("combine_pairs_skipped_total").increment(1);
            }
        }
    }
    Ok(table)
}

/// Wide records for all pairs in `dir`, ascending by timestamp.
pub fn combine_all(dir: &Path) -> Result<Vec<WideRecord>, PipelineError> {
    Ok(build_wide_table(dir)?.records())
}
