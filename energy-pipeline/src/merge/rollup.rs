use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use energy_client::domain::{DailyAggregate, MergedRecord};
use serde::Deserialize;
use time::macros::format_description;
use time::error::IndeterminateOffset;
use time::{Date, OffsetDateTime, UtcOffset};

use super::{merge_files, ResourcePair};
use crate::pipeline::PipelineError;
use crate::sinks::write_jsonl;

/// Which clock decides the calendar day a reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum DayBoundary {
    #[default]
    Utc,
    /// The machine's offset in force at each reading's instant.
    Local,
    Offset(UtcOffset),
}

impl DayBoundary {
    /// Offset that decides the calendar day of `instant`.
    pub fn offset_at(self, instant: OffsetDateTime) -> Result<UtcOffset, IndeterminateOffset> {
        match self {
            DayBoundary::Utc => Ok(UtcOffset::UTC),
            DayBoundary::Offset(offset) => Ok(offset),
            DayBoundary::Local => UtcOffset::local_offset_at(instant),
        }
    }
}

impl FromStr for DayBoundary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" | "z" => Ok(DayBoundary::Utc),
            "local" => Ok(DayBoundary::Local),
            other => UtcOffset::parse(other, format_description!("[offset_hour sign:mandatory]:[offset_minute]"))
                .map(DayBoundary::Offset)
                .map_err(|_| format!("day boundary must be 'utc', 'local' or an offset like '+01:00', got '{s}'")),
        }
    }
}

impl TryFrom<String> for DayBoundary {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Per-day sums of a merged series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyTotals {
    pub consumption: f64,
    pub cost: f64,
    pub count: u64,
}

impl DailyTotals {
    fn absorb(&mut self, other: DailyTotals) {
        self.consumption += other.consumption;
        self.cost += other.cost;
        self.count += other.count;
    }

    fn into_aggregate(self, date: Date) -> DailyAggregate {
        DailyAggregate {
            date: date.to_string(),
            consumption_total: self.consumption,
            cost_total: self.cost,
            reading_count: self.count,
        }
    }
}

/// Daily sums of a merged series. Absent sides add nothing; every record
/// counts once. A local offset that cannot be determined falls back to UTC.
pub fn group_by_day(merged: &BTreeMap<i64, MergedRecord>, boundary: DayBoundary) -> BTreeMap<Date, DailyTotals> {
    let mut days: BTreeMap<Date, DailyTotals> = BTreeMap::new();
    let mut warned = false;
    for (ts, record) in merged {
        let Ok(instant) = OffsetDateTime::from_unix_timestamp(*ts) else {
            tracing::warn!(ts, "timestamp outside calendar range, left out of rollup");
            continue;
        };
        let offset = boundary.offset_at(instant).unwrap_or_else(|e| {
            if !warned {
                tracing::warn!(error = %e, "local offset unavailable, grouping days in UTC");
                warned = true;
            }
            UtcOffset::UTC
        });
        let day = days.entry(instant.to_offset(offset).date()).or_default();
        day.consumption += record.consumption_value.unwrap_or(0.0);
        day.cost += record.cost_value.unwrap_or(0.0);
        day.count += 1;
    }
    days
}

/// `{year}_energy_data.jsonl`
pub fn yearly_file_name(year: i32) -> String {
    format!("{year}_energy_data.jsonl")
}

/// Merge each pair, sum by day across all pairs and write one file per
/// calendar year. Returns the files in year order. A pair that fails to load
/// is logged and left out.
pub fn to_yearly(pairs: &[ResourcePair], output_dir: &Path, boundary: DayBoundary) -> Result<Vec<PathBuf>, PipelineError> {
    let mut years: BTreeMap<i32, BTreeMap<Date, DailyTotals>> = BTreeMap::new();

    for pair in pairs {
        let merged = match merge_files(&pair.consumption, &pair.cost) {
            Ok((merged, _)) => merged,
            Err(e) => {
                tracing::error!(
                    consumption = %pair.consumption.display(),
                    cost = %pair.cost.display(),
                    error = %e,
                    "failed to merge pair, leaving it out of the rollup"
                );
                metrics::counter!("rollup_pairs_skipped_total").increment(1);
                continue;
            }
        };
        for (date, totals) in group_by_day(&merged, boundary) {
            years
                .entry(date.year())
                .or_default()
                .entry(date)
                .or_default()
                .absorb(totals);
        }
    }

    let mut written = Vec::with_capacity(years.len());
    for (year, days) in years {
        let path = output_dir.join(yearly_file_name(year));
        let count = write_jsonl(&path, days.into_iter().map(|(date, totals)| totals.into_aggregate(date)))?;
        tracing::info!(year, days = count, path = %path.display(), "wrote yearly rollup");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use time::macros::{date, offset};

    fn record(ts: i64, consumption: Option<f64>, cost: Option<f64>) -> (i64, MergedRecord) {
        (
            ts,
            MergedRecord {
                timestamp: ts,
                timestamp_iso: String::new(),
                consumption_value: consumption,
                cost_value: cost,
            },
        )
    }

    fn write_doc(dir: &Path, name: &str, resource_name: &str, readings: Value) -> PathBuf {
        let path = dir.join(name);
        fs::write(
            &path,
            json!({"resource_id": format!("{resource_name}-id"), "resource_name": resource_name, "readings": readings}).to_string(),
        )
        .unwrap();
        path
    }

    /// Two days in 2025 and one in 2026 for electricity, with cost.
    fn fixture(dir: &Path) -> ResourcePair {
        ResourcePair {
            resource_type: "electricity".to_string(),
            date_range: "20250201_to_20260201".to_string(),
            consumption: write_doc(
                dir,
                "electricity_consumption_20250201_to_20260201.json",
                "electricity consumption",
                json!([[1738368000, 0.047], [1738454400, 0.059], [1769980800, 0.039]]),
            ),
            cost: write_doc(
                dir,
                "electricity_cost_20250201_to_20260201.json",
                "electricity cost",
                json!([[1738368000, 0.78773], [1738454400, 0.44709], [1769980800, 0.5123]]),
            ),
        }
    }

    fn lines(path: &Path) -> Vec<DailyAggregate> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn day_boundary_parses_from_config_strings() {
        assert_eq!("utc".parse::<DayBoundary>().unwrap(), DayBoundary::Utc);
        assert_eq!("Local".parse::<DayBoundary>().unwrap(), DayBoundary::Local);
        assert_eq!("+01:00".parse::<DayBoundary>().unwrap(), DayBoundary::Offset(offset!(+1)));
        assert_eq!("-05:30".parse::<DayBoundary>().unwrap(), DayBoundary::Offset(offset!(-5:30)));
        assert!("tomorrow".parse::<DayBoundary>().is_err());
    }

    #[test]
    fn grouping_sums_present_sides_and_counts_records() {
        let merged: BTreeMap<i64, MergedRecord> = [
            record(1738368000, Some(1.0), Some(10.0)),
            record(1738369800, None, Some(5.0)),
            record(1738371600, Some(2.0), None),
            record(1738454400, Some(4.0), Some(1.0)),
        ]
        .into_iter()
        .collect();

        let days = group_by_day(&merged, DayBoundary::Utc);

        let first = days[&date!(2025 - 02 - 01)];
        assert_eq!(first.consumption, 3.0);
        assert_eq!(first.cost, 15.0);
        assert_eq!(first.count, 3);
        assert_eq!(days[&date!(2025 - 02 - 02)].count, 1);
    }

    #[test]
    fn same_day_of_year_lands_in_separate_yearly_files_utc() {
        let dir = tempfile::tempdir().unwrap();
        let pair = fixture(dir.path());
        let out = dir.path().join("yearly");

        let files = to_yearly(&[pair], &out, DayBoundary::Utc).unwrap();

        assert_eq!(files, vec![out.join("2025_energy_data.jsonl"), out.join("2026_energy_data.jsonl")]);

        let y2025 = lines(&files[0]);
        let dates: Vec<&str> = y2025.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-02-01", "2025-02-02"]);
        assert!((y2025[0].consumption_total - 0.047).abs() < 1e-12);
        assert!((y2025[0].cost_total - 0.78773).abs() < 1e-12);
        assert_eq!(y2025[0].reading_count, 1);

        let y2026 = lines(&files[1]);
        assert_eq!(y2026.len(), 1);
        assert_eq!(y2026[0].date, "2026-02-01");
    }

    #[test]
    fn fixed_offset_moves_readings_across_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let pair = fixture(dir.path());
        let out = dir.path().join("yearly");

        // 1738368000 is midnight UTC, so an hour behind it is still the 31st
        let files = to_yearly(&[pair], &out, DayBoundary::Offset(offset!(-1))).unwrap();

        let dates: Vec<String> = lines(&files[0]).into_iter().map(|d| d.date).collect();
        assert_eq!(dates, vec!["2025-01-31", "2025-02-01"]);
        assert_eq!(lines(&files[1])[0].date, "2026-02-01");

        // three hours ahead pushes the 21:20 UTC reading into the next day
        let files = to_yearly(&[fixture(dir.path())], &out, DayBoundary::Offset(offset!(+3))).unwrap();
        assert_eq!(lines(&files[1])[0].date, "2026-02-02");
    }

    #[test]
    fn pairs_on_the_same_day_are_summed() {
        let dir = tempfile::tempdir().unwrap();
        let elec = fixture(dir.path());
        let gas = ResourcePair {
            resource_type: "gas".to_string(),
            date_range: "x".to_string(),
            consumption: write_doc(dir.path(), "gas_consumption_x.json", "gas consumption", json!([[1738368000, 1.0]])),
            cost: write_doc(dir.path(), "gas_cost_x.json", "gas cost", json!([[1738368000, 2.0]])),
        };

        let files = to_yearly(&[elec, gas], dir.path(), DayBoundary::Utc).unwrap();

        let first = &lines(&files[0])[0];
        assert!((first.consumption_total - 1.047).abs() < 1e-12);
        assert_eq!(first.reading_count, 2);
    }

    /// Late-evening readings in winter and in summer.
    fn both_seasons() -> BTreeMap<i64, MergedRecord> {
        [
            record(1736983800, Some(1.0), Some(10.0)), // 2025-01-15T23:30Z
            record(1752622200, Some(2.0), Some(20.0)), // 2025-07-15T23:30Z
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn fixed_offset_applies_to_every_season() {
        let days = group_by_day(&both_seasons(), DayBoundary::Offset(offset!(+1)));

        let dates: Vec<Date> = days.keys().copied().collect();
        assert_eq!(dates, vec![date!(2025 - 01 - 16), date!(2025 - 07 - 16)]);
    }

    #[test]
    fn local_boundary_uses_the_offset_in_force_at_each_reading() {
        let merged = both_seasons();
        let days = group_by_day(&merged, DayBoundary::Local);

        // whatever the machine's zone, each reading lands on the day its own
        // instant has locally, not the day under today's offset
        let mut expected: Vec<Date> = merged
            .keys()
            .map(|ts| {
                let instant = OffsetDateTime::from_unix_timestamp(*ts).unwrap();
                let offset = UtcOffset::local_offset_at(instant).unwrap_or(UtcOffset::UTC);
                instant.to_offset(offset).date()
            })
            .collect();
        expected.dedup();
        assert_eq!(days.keys().copied().collect::<Vec<_>>(), expected);
        assert_eq!(days.values().map(|d| d.count).sum::<u64>(), 2);
    }

    #[test]
    fn offset_at_reports_fixed_offsets_unchanged() {
        let instant = OffsetDateTime::from_unix_timestamp(1736983800).unwrap();
        assert_eq!(DayBoundary::Utc.offset_at(instant).unwrap(), UtcOffset::UTC);
        assert_eq!(DayBoundary::Offset(offset!(-5)).offset_at(instant).unwrap(), offset!(-5));
    }
}
