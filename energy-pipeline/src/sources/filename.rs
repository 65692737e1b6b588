//! Resource type and date range encoded in export file names.

use energy_client::domain::ResourceKind;
use once_cell::sync::Lazy;
use regex::Regex;
use time::{util, Month};

use crate::pipeline::PipelineError;

pub const UNKNOWN_DATE_RANGE: &str = "unknown_date_range";

#[derive(Debug, Clone, Copy)]
enum RangePattern {
    /// `20240501_to_20240531`
    Explicit,
    /// `202405`, `2024-05`
    YearMonth,
}

/// Tried in order; first usable match wins.
static RANGE_PATTERNS: Lazy<Vec<(RangePattern, Regex)>> = Lazy::new(|| {
    [
        (RangePattern::Explicit, r"(\d{8})_to_(\d{8})"),
        (RangePattern::YearMonth, r"(\d{4})(\d{2})"),
        (RangePattern::YearMonth, r"(\d{4})-(\d{2})"),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
    .collect()
});

/// `electricity` or `gas` by case-insensitive substring, electricity first.
pub fn detect_resource_type(name: &str) -> Result<ResourceKind, PipelineError> {
    let lower = name.to_lowercase();
    if lower.contains("electricity") {
        Ok(ResourceKind::Electricity)
    } else if lower.contains("gas") {
        Ok(ResourceKind::Gas)
    } else {
        Err(PipelineError::UnknownResourceType(name.to_string()))
    }
}

/// `YYYYMMDD_to_YYYYMMDD` for the range a file name describes. A bare month
/// expands to the whole calendar month. No match gives [`UNKNOWN_DATE_RANGE`].
pub fn detect_date_range(name: &str) -> String {
    for (kind, re) in RANGE_PATTERNS.iter() {
        let Some(caps) = re.captures(name) else {
            continue;
        };
        let range = match kind {
            RangePattern::Explicit => Some(format!("{}_to_{}", &caps[1], &caps[2])),
            RangePattern::YearMonth => month_range(&caps[1], &caps[2]),
        };
        if let Some(range) = range {
            return range;
        }
    }
    UNKNOWN_DATE_RANGE.to_string()
}

fn month_range(year: &str, month: &str) -> Option<String> {
    let y: i32 = year.parse().ok()?;
    let m = Month::try_from(month.parse::<u8>().ok()?).ok()?;
    let last = util::days_in_year_month(y, m);
    Some(format!("{year}{month}01_to_{year}{month}{last:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_from_filename() {
        assert_eq!(detect_resource_type("Electricity_202405").unwrap(), ResourceKind::Electricity);
        assert_eq!(detect_resource_type("n3rgy_GAS_export").unwrap(), ResourceKind::Gas);
        assert!(matches!(
            detect_resource_type("water_202405"),
            Err(PipelineError::UnknownResourceType(name)) if name == "water_202405"
        ));
    }

    #[test]
    fn explicit_range_wins() {
        assert_eq!(detect_date_range("electricity_20240501_to_20240531"), "20240501_to_20240531");
    }

    #[test]
    fn bare_month_expands_to_calendar_month() {
        assert_eq!(detect_date_range("electricity_202405"), "20240501_to_20240531");
        assert_eq!(detect_date_range("gas_202402"), "20240201_to_20240229");
        assert_eq!(detect_date_range("gas_202302"), "20230201_to_20230228");
        assert_eq!(detect_date_range("gas_2024-04_export"), "20240401_to_20240430");
    }

    #[test]
    fn no_pattern_is_unknown() {
        assert_eq!(detect_date_range("electricity_latest"), UNKNOWN_DATE_RANGE);
    }

    #[test]
    fn impossible_month_falls_through() {
        assert_eq!(detect_date_range("gas_202413"), UNKNOWN_DATE_RANGE);
        assert_eq!(detect_date_range("gas_202413_2024-06"), "20240601_to_20240630");
    }
}
