//! Where each canonical field is looked up in a raw document, and what it
//! falls back to. The remote API uses camelCase keys with the query echoed
//! under `query`; persisted and legacy documents use snake_case at the top.

use energy_client::domain::Category;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ResourceId,
    ResourceName,
    Units,
    Classifier,
    ResourceType,
    Period,
    From,
    To,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKey {
    Top(&'static str),
    /// `object.key`
    Nested(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: Field,
    /// First present, non-null key wins.
    pub keys: &'static [SourceKey],
    pub default: &'static str,
}

pub const UNKNOWN: &str = "unknown";
pub const DEFAULT_RESOURCE_NAME: &str = "energy consumption";
pub const DEFAULT_UNIT: &str = "kWh";
pub const DEFAULT_COST_NAME: &str = "energy cost";
pub const DEFAULT_COST_UNIT: &str = "pence";

/// Defaults that replace a rule's own for cost series.
pub const COST_DEFAULTS: &[(Field, &str)] = &[(Field::ResourceName, DEFAULT_COST_NAME), (Field::Units, DEFAULT_COST_UNIT)];

pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: Field::ResourceId,
        keys: &[SourceKey::Top("resourceId"), SourceKey::Top("resource_id")],
        default: UNKNOWN,
    },
    FieldRule {
        field: Field::ResourceName,
        keys: &[SourceKey::Top("name"), SourceKey::Top("resource_name")],
        default: DEFAULT_RESOURCE_NAME,
    },
    FieldRule {
        field: Field::Units,
        keys: &[SourceKey::Top("units"), SourceKey::Top("resource_unit")],
        default: DEFAULT_UNIT,
    },
    FieldRule {
        field: Field::Classifier,
        keys: &[SourceKey::Top("classifier"), SourceKey::Top("resource_classifier")],
        default: UNKNOWN,
    },
    FieldRule {
        field: Field::ResourceType,
        keys: &[SourceKey::Top("resourceTypeId"), SourceKey::Top("resource_type")],
        default: UNKNOWN,
    },
    FieldRule {
        field: Field::Period,
        keys: &[SourceKey::Nested("query", "period"), SourceKey::Top("period")],
        default: UNKNOWN,
    },
    FieldRule {
        field: Field::From,
        keys: &[SourceKey::Nested("query", "from"), SourceKey::Top("start_date")],
        default: UNKNOWN,
    },
    FieldRule {
        field: Field::To,
        keys: &[SourceKey::Nested("query", "to"), SourceKey::Top("end_date")],
        default: UNKNOWN,
    },
];

pub const READINGS_KEYS: [&str; 2] = ["data", "readings"];

/// Keys that only the remote API shape uses.
pub const API_ONLY_KEYS: [&str; 6] = ["resourceId", "name", "units", "classifier", "query", "data"];

pub fn rule(field: Field) -> &'static FieldRule {
    FIELD_RULES
        .iter()
        .find(|r| r.field == field)
        .unwrap_or(&FIELD_RULES[0])
}

impl SourceKey {
    fn lookup<'a>(&self, doc: &'a Map<String, Value>) -> Option<&'a Value> {
        let value = match self {
            SourceKey::Top(key) => doc.get(*key),
            SourceKey::Nested(outer, key) => doc.get(*outer).and_then(|o| o.get(*key)),
        }?;
        (!value.is_null()).then_some(value)
    }
}

pub fn default_for(field: Field, category: Category) -> &'static str {
    let overrides: &[(Field, &str)] = match category {
        Category::Consumption => &[],
        Category::Cost => COST_DEFAULTS,
    };
    overrides
        .iter()
        .find(|(f, _)| *f == field)
        .map_or(rule(field).default, |(_, d)| *d)
}

/// Resolved string value of `field` in `doc`.
pub fn resolve(doc: &Map<String, Value>, field: Field) -> String {
    resolve_as(doc, field, Category::Consumption)
}

/// Like [`resolve`], falling back to the defaults of `category`.
pub fn resolve_as(doc: &Map<String, Value>, field: Field, category: Category) -> String {
    rule(field)
        .keys
        .iter()
        .find_map(|key| key.lookup(doc))
        .map(scalar_to_string)
        .unwrap_or_else(|| default_for(field, category).to_string())
}

/// The raw readings rows of `doc`, empty when neither key holds an array.
pub fn readings(doc: &Map<String, Value>) -> &[Value] {
    READINGS_KEYS
        .iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
