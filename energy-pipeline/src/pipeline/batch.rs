use std::cmp::Ordering;

use energy_client::api::{ReadingsQuery, DEFAULT_FUNCTION, DEFAULT_PERIOD};
use energy_client::domain::row_timestamp;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime};

use super::{PipelineError, ReadingSource};

pub const DEFAULT_WINDOW_DAYS: i64 = 10;

/// Start or end of a historical request: an instant, or an ISO-8601 string
/// parsed on use. A trailing `Z` is read as `+00:00`; strings without an
/// offset are taken as UTC.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Instant(OffsetDateTime),
    Iso(String),
}

impl DateInput {
    pub fn resolve(&self) -> Result<OffsetDateTime, PipelineError> {
        match self {
            DateInput::Instant(dt) => Ok(*dt),
            DateInput::Iso(s) => parse_iso_instant(s),
        }
    }
}

impl From<OffsetDateTime> for DateInput {
    fn from(dt: OffsetDateTime) -> Self {
        DateInput::Instant(dt)
    }
}

impl From<&str> for DateInput {
    fn from(s: &str) -> Self {
        DateInput::Iso(s.to_string())
    }
}

impl From<String> for DateInput {
    fn from(s: String) -> Self {
        DateInput::Iso(s)
    }
}

pub fn parse_iso_instant(input: &str) -> Result<OffsetDateTime, PipelineError> {
    let normalized = input.trim().replace('Z', "+00:00");

    if let Ok(dt) = OffsetDateTime::parse(&normalized, &Rfc3339) {
        return Ok(dt);
    }
    if let Ok(dt) = OffsetDateTime::parse(
        &normalized,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"),
    ) {
        return Ok(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(&normalized, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]")) {
        return Ok(dt.assume_utc());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(&normalized, format_description!("[year]-[month]-[day]T[hour]:[minute]")) {
        return Ok(dt.assume_utc());
    }
    if let Ok(date) = Date::parse(&normalized, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }

    Err(PipelineError::InvalidDate {
        input: input.to_string(),
        reason: "expected an ISO-8601 date or date-time".to_string(),
    })
}

/// Consecutive `[start, end)` windows of `window_days`, the last one clipped
/// to `end`. Adjacent windows share their boundary instant. `start == end`
/// yields the single window `(start, end)`.
pub fn split_windows(start: OffsetDateTime, end: OffsetDateTime, window_days: i64) -> Vec<(OffsetDateTime, OffsetDateTime)> {
    if start == end {
        return vec![(start, end)];
    }

    let step = Duration::seconds(window_days.max(1).saturating_mul(86_400));
    let mut windows = Vec::new();
    let mut window_start = start;
    while window_start < end {
        let window_end = window_start.checked_add(step).map_or(end, |e| e.min(end));
        windows.push((window_start, window_end));
        if window_end == end {
            break;
        }
        window_start = window_end;
    }
    windows
}

/// A long-range readings request, split into windows by [`BatchRetriever`].
#[derive(Debug, Clone)]
pub struct HistoricalRequest {
    pub resource_id: String,
    pub start: DateInput,
    pub end: DateInput,
    pub period: String,
    pub function: String,
    pub offset: Option<i32>,
    pub window_days: i64,
}

impl HistoricalRequest {
    pub fn new(resource_id: impl Into<String>, start: impl Into<DateInput>, end: impl Into<DateInput>) -> Self {
        Self {
            resource_id: resource_id.into(),
            start: start.into(),
            end: end.into(),
            period: DEFAULT_PERIOD.to_string(),
            function: DEFAULT_FUNCTION.to_string(),
            offset: None,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = period.into();
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    pub fn with_offset(mut self, offset: Option<i32>) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_window_days(mut self, window_days: i64) -> Self {
        self.window_days = window_days;
        self
    }
}

/// Fetches a date range window by window from a [`ReadingSource`].
///
/// Windows are requested strictly one after another. A window that fails is
/// logged and skipped; whatever the other windows returned is kept.
pub struct BatchRetriever<'a, S: ReadingSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: ReadingSource + ?Sized> BatchRetriever<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// All raw `[timestamp, value]` rows for the request, sorted ascending by
    /// timestamp (stable, rows without a numeric timestamp last).
    pub async fn fetch(&self, request: &HistoricalRequest) -> Result<Vec<Value>, PipelineError> {
        let start = request.start.resolve()?;
        let end = request.end.resolve()?;
        if start > end {
            return Err(PipelineError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        if request.window_days < 1 {
            return Err(PipelineError::InvalidWindow(request.window_days));
        }

        let windows = split_windows(start, end, request.window_days);
        let total = windows.len();
        tracing::info!(
            resource_id = %request.resource_id,
            %start,
            %end,
            period = %request.period,
            window_days = request.window_days,
            windows = total,
            "retrieving readings"
        );

        let mut rows = Vec::new();
        for (idx, (window_start, window_end)) in windows.into_iter().enumerate() {
            let window = idx + 1;
            tracing::info!(window, total, from = %window_start.date(), to = %window_end.date(), "fetching window");

            let query = ReadingsQuery::new(request.resource_id.clone())
                .with_range(window_start, window_end)
                .with_period(request.period.clone())
                .with_function(request.function.clone())
                .with_offset(request.offset);

            match self.source.fetch_readings(&query).await {
                Ok(doc) => {
                    let batch = extract_rows(doc);
                    tracing::info!(window, count = batch.len(), "received readings");
                    metrics::counter!("batch_windows_fetched_total").increment(1);
                    rows.extend(batch);
                }
                Err(e) => {
                    tracing::error!(error = %e, window, total, "window fetch failed, continuing with next window");
                    metrics::counter!("batch_window_failures_total").increment(1);
                }
            }
        }

        sort_rows(&mut rows);
        tracing::info!(resource_id = %request.resource_id, count = rows.len(), "retrieval finished");
        Ok(rows)
    }
}

/// One-shot form of [`BatchRetriever::fetch`].
pub async fn get_historical_readings<S: ReadingSource + ?Sized>(
    source: &S,
    request: &HistoricalRequest,
) -> Result<Vec<Value>, PipelineError> {
    BatchRetriever::new(source).fetch(request).await
}

/// Readings array of a response: `data`, else `readings`, else nothing.
fn extract_rows(doc: Value) -> Vec<Value> {
    let Value::Object(mut map) = doc else {
        return Vec::new();
    };
    for key in ["data", "readings"] {
        if let Some(Value::Array(rows)) = map.remove(key) {
            return rows;
        }
    }
    Vec::new()
}

fn sort_rows(rows: &mut [Value]) {
    rows.sort_by(|a, b| match (row_timestamp(a), row_timestamp(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
