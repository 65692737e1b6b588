use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// Credentials for the remote API. A token, when present, is used as is.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl Credentials {
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            token: None,
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub(crate) fn login_pair(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A virtual entity (a metered site) and, when listed in detail, its resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "veId", default)]
    pub ve_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "resourceId", default)]
    pub resource_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub classifier: String,
    #[serde(rename = "baseUnit", default)]
    pub base_unit: String,
}

impl Entity {
    /// Resources whose classifier marks them as consumption (cost series included).
    pub fn consumption_resources(&self) -> Vec<&Resource> {
        self.resources
            .iter()
            .filter(|r| r.classifier.contains("consumption"))
            .collect()
    }
}

const QUERY_DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// A `from`/`to` query value: instants are rendered without an offset
/// suffix, strings are sent untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum DateParam {
    Instant(OffsetDateTime),
    Text(String),
}

impl DateParam {
    pub fn to_query_value(&self) -> String {
        match self {
            DateParam::Instant(dt) => dt.format(QUERY_DATE_FORMAT).unwrap_or_else(|_| dt.to_string()),
            DateParam::Text(s) => s.clone(),
        }
    }
}

impl From<OffsetDateTime> for DateParam {
    fn from(dt: OffsetDateTime) -> Self {
        DateParam::Instant(dt)
    }
}

impl From<&str> for DateParam {
    fn from(s: &str) -> Self {
        DateParam::Text(s.to_string())
    }
}

impl From<String> for DateParam {
    fn from(s: String) -> Self {
        DateParam::Text(s)
    }
}

pub const DEFAULT_PERIOD: &str = "PT30M";
pub const DEFAULT_FUNCTION: &str = "sum";

/// Parameters of one `resource/{id}/readings` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingsQuery {
    pub resource_id: String,
    /// When absent the API is asked for the seven days ending now.
    pub from: Option<DateParam>,
    pub to: Option<DateParam>,
    /// ISO-8601 duration, e.g. `PT30M`, `P1D`.
    pub period: String,
    pub function: String,
    /// Minutes, sign-inverted from the usual UTC offset (UTC+1 is `-60`).
    pub offset: Option<i32>,
}

impl ReadingsQuery {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            from: None,
            to: None,
            period: DEFAULT_PERIOD.to_string(),
            function: DEFAULT_FUNCTION.to_string(),
            offset: None,
        }
    }

    pub fn with_range(mut self, from: impl Into<DateParam>, to: impl Into<DateParam>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
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
}
