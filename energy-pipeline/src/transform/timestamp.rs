use energy_client::domain::TimestampIso;
use time::macros::format_description;
use time::OffsetDateTime;

/// Raw timestamps above this are milliseconds, at or below it whole seconds.
pub const MILLISECOND_THRESHOLD: f64 = 9_999_999_999.0;

/// Epoch seconds of a raw numeric timestamp. `None` for NaN/infinite input.
pub fn epoch_seconds(raw: f64) -> Option<i64> {
    if !raw.is_finite() {
        return None;
    }
    let seconds = if raw > MILLISECOND_THRESHOLD { raw / 1000.0 } else { raw };
    Some(seconds.floor() as i64)
}

/// `YYYY-MM-DDTHH:MM:SS` in UTC, or the raw value when the instant is out of range.
pub fn timestamp_iso(ts: i64) -> TimestampIso {
    match OffsetDateTime::from_unix_timestamp(ts) {
        Ok(dt) => match format_iso(dt) {
            Some(s) => TimestampIso::Resolved(s),
            None => TimestampIso::DegradedTimestamp(ts.to_string()),
        },
        Err(_) => {
            metrics::counter!("normalizer_degraded_timestamps_total").increment(1);
            tracing::debug!(ts, "timestamp outside representable range, keeping raw value");
            TimestampIso::DegradedTimestamp(ts.to_string())
        }
    }
}

pub fn format_iso(dt: OffsetDateTime) -> Option<String> {
    dt.format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]")).ok()
}

/// `YYYYMMDD` of an instant, for file names.
pub fn compact_date(dt: OffsetDateTime) -> Option<String> {
    dt.format(format_description!("[year][month][day]")).ok()
}
