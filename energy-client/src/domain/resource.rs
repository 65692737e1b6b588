use std::fmt;

use serde::{Deserialize, Serialize};

use super::reading::Reading;

/// Utility type of a resource, taken from the first word of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Electricity,
    Gas,
    Water,
    /// Fallback for empty or unrecognised names.
    Energy,
}

impl ResourceKind {
    /// Kinds that every wide (all-resources) record carries columns for.
    pub const KNOWN: [ResourceKind; 2] = [ResourceKind::Electricity, ResourceKind::Gas];

    /// `"Electricity consumption"` -> `Electricity`; anything else -> `Energy`.
    pub fn from_resource_name(name: &str) -> Self {
        name.split_whitespace()
            .next()
            .and_then(|word| Self::parse(&word.to_lowercase()))
            .unwrap_or(ResourceKind::Energy)
    }

    /// Exact, lower-case match on a type token.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "electricity" => Some(ResourceKind::Electricity),
            "gas" => Some(ResourceKind::Gas),
            "water" => Some(ResourceKind::Water),
            "energy" => Some(ResourceKind::Energy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Electricity => "electricity",
            ResourceKind::Gas => "gas",
            ResourceKind::Water => "water",
            ResourceKind::Energy => "energy",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a series measures usage or what the usage cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Consumption,
    Cost,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Consumption, Category::Cost];

    /// A classifier containing `cost` anywhere marks a cost series.
    pub fn from_classifier(classifier: &str) -> Self {
        if classifier.contains("cost") {
            Category::Cost
        } else {
            Category::Consumption
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Consumption => "consumption",
            Category::Cost => "cost",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub resource_id: String,
    pub resource_name: String,
    pub resource_unit: String,
    /// Dotted path such as `electricity.consumption.cost`.
    pub resource_classifier: String,
}

impl ResourceMetadata {
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::from_resource_name(&self.resource_name)
    }

    pub fn category(&self) -> Category {
        Category::from_classifier(&self.resource_classifier)
    }
}

/// One resource's readings over a queried range, in canonical form.
///
/// `from`, `to` and `period` are kept as the strings the source reported
/// (`"unknown"` when it reported nothing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSeries {
    pub metadata: ResourceMetadata,
    pub resource_type: String,
    pub from: String,
    pub to: String,
    pub period: String,
    /// Ascending, one reading per timestamp.
    pub readings: Vec<Reading>,
}
