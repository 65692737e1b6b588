use energy_client::api::{GlowmarktClient, ReadingsQuery, Resource};
use energy_client::domain::PersistedDocument;
use serde_json::Value;
use time::{Date, Duration, Month, OffsetDateTime};

use crate::pipeline::{HistoricalRequest, PipelineError, ReadingSource};
use crate::transform::{compact_date, format_iso};

#[async_trait::async_trait]
impl ReadingSource for GlowmarktClient {
    async fn fetch_readings(&self, query: &ReadingsQuery) -> Result<Value, PipelineError> {
        Ok(self.get_readings(query).await?)
    }
}

/// Pick a consumption resource from the account.
///
/// `entity` matches a virtual entity id or name; `resource` matches a
/// resource id, name or classifier. Without a hint the first candidate is
/// taken.
pub async fn select_resource(
    client: &GlowmarktClient,
    entity: Option<&str>,
    resource: Option<&str>,
) -> Result<Resource, PipelineError> {
    let entities = client.list_entities().await?;
    let chosen = match entity {
        Some(hint) => entities
            .iter()
            .find(|e| e.ve_id == hint || e.name.as_deref() == Some(hint)),
        None => entities.first(),
    }
    .ok_or_else(|| PipelineError::ResourceNotFound(entity.unwrap_or("<any entity>").to_string()))?;

    tracing::info!(ve_id = %chosen.ve_id, name = chosen.name.as_deref().unwrap_or("unnamed"), "selected virtual entity");

    let detailed = client.list_entity_resources(&chosen.ve_id).await?;
    let candidates = detailed.consumption_resources();
    let picked = match resource {
        Some(hint) => candidates
            .into_iter()
            .find(|r| r.resource_id == hint || r.name == hint || r.classifier == hint),
        None => candidates.into_iter().next(),
    }
    .ok_or_else(|| PipelineError::ResourceNotFound(resource.unwrap_or("<consumption resource>").to_string()))?;

    tracing::info!(resource_id = %picked.resource_id, name = %picked.name, classifier = %picked.classifier, "selected resource");
    Ok(picked.clone())
}

/// Whole calendar month `months_back` months before the one containing
/// `today`: first instant to the last second.
pub fn calendar_month_range(today: Date, months_back: u32) -> Result<(OffsetDateTime, OffsetDateTime), PipelineError> {
    let mut year = today.year();
    let mut month = today.month();
    for _ in 0..months_back {
        if month == Month::January {
            year -= 1;
        }
        month = month.previous();
    }

    let invalid = |reason: String| PipelineError::InvalidDate {
        input: format!("{year}-{:02}", u8::from(month)),
        reason,
    };
    let start = Date::from_calendar_date(year, month, 1).map_err(|e| invalid(e.to_string()))?;
    let (next_year, next_month) = if month == Month::December {
        (year + 1, Month::January)
    } else {
        (year, month.next())
    };
    let next = Date::from_calendar_date(next_year, next_month, 1).map_err(|e| invalid(e.to_string()))?;

    Ok((
        start.midnight().assume_utc(),
        next.midnight().assume_utc() - Duration::seconds(1),
    ))
}

/// `{resource name, lower-case, underscored}_{YYYYMMDD}_to_{YYYYMMDD}.json`
pub fn document_file_name(resource_name: &str, start: OffsetDateTime, end: OffsetDateTime) -> String {
    let safe = resource_name.to_lowercase().replace(' ', "_");
    let from = compact_date(start).unwrap_or_else(|| "unknown".to_string());
    let to = compact_date(end).unwrap_or_else(|| "unknown".to_string());
    format!("{safe}_{from}_to_{to}.json")
}

/// Document persisted after a remote retrieval.
pub fn persisted_document(
    resource: &Resource,
    request: &HistoricalRequest,
    start: OffsetDateTime,
    end: OffsetDateTime,
    readings: Vec<Value>,
) -> PersistedDocument {
    PersistedDocument {
        resource_id: resource.resource_id.clone(),
        resource_name: resource.name.clone(),
        resource_unit: resource.base_unit.clone(),
        resource_classifier: resource.classifier.clone(),
        start_date: format_iso(start).unwrap_or_default(),
        end_date: format_iso(end).unwrap_or_default(),
        period: request.period.clone(),
        timezone_offset: request.offset.unwrap_or(0),
        readings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::{date, datetime};

    fn resource() -> Resource {
        Resource {
            resource_id: "r-elec".to_string(),
            name: "Electricity consumption".to_string(),
            classifier: "electricity.consumption".to_string(),
            base_unit: "kWh".to_string(),
        }
    }

    #[test]
    fn month_ranges_cover_whole_months_across_year_boundaries() {
        assert_eq!(
            calendar_month_range(date!(2024 - 03 - 15), 0).unwrap(),
            (datetime!(2024-03-01 00:00 UTC), datetime!(2024-03-31 23:59:59 UTC))
        );
        assert_eq!(
            calendar_month_range(date!(2024 - 03 - 15), 1).unwrap(),
            (datetime!(2024-02-01 00:00 UTC), datetime!(2024-02-29 23:59:59 UTC))
        );
        assert_eq!(
            calendar_month_range(date!(2024 - 01 - 31), 2).unwrap(),
            (datetime!(2023-11-01 00:00 UTC), datetime!(2023-11-30 23:59:59 UTC))
        );
        assert_eq!(
            calendar_month_range(date!(2024 - 01 - 10), 1).unwrap().1,
            datetime!(2023-12-31 23:59:59 UTC)
        );
    }

    #[test]
    fn document_name_uses_resource_name_and_compact_dates() {
        assert_eq!(
            document_file_name("Electricity consumption", datetime!(2023-01-01 00:00 UTC), datetime!(2023-01-31 23:59:59 UTC)),
            "electricity_consumption_20230101_to_20230131.json"
        );
    }

    #[test]
    fn persisted_document_carries_request_settings() {
        let request = HistoricalRequest::new("r-elec", "2023-01-01", "2023-01-02").with_offset(Some(-60));
        let doc = persisted_document(
            &resource(),
            &request,
            datetime!(2023-01-01 00:00 UTC),
            datetime!(2023-01-02 00:00 UTC),
            vec![json!([1672531200, 0.5])],
        );

        assert_eq!(doc.resource_unit, "kWh");
        assert_eq!(doc.start_date, "2023-01-01T00:00:00");
        assert_eq!(doc.period, "PT30M");
        assert_eq!(doc.timezone_offset, -60);
        assert_eq!(doc.readings.len(), 1);
    }
}
