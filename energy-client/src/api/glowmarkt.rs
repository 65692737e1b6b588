use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;

use super::error::ApiError;
use super::types::{Credentials, DateParam, Entity, ReadingsQuery};

pub const DEFAULT_BASE_URL: &str = "https://api.glowmarkt.com/api/v0-1";
pub const DEFAULT_APPLICATION_ID: &str = "b0f1b774-a586-4f72-9edd-27ead8aa7a8d";

/// Connection settings for [`GlowmarktClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub application_id: String,
    /// `None` leaves requests without a deadline.
    pub timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            timeout: None,
        }
    }
}

/// Client for the remote metering API.
///
/// Every data call authenticates first when no token is held yet. The token
/// is cached for the lifetime of the client.
pub struct GlowmarktClient {
    http: Client,
    base_url: String,
    application_id: String,
    credentials: Credentials,
    token: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: Option<String>,
}

impl GlowmarktClient {
    pub fn new(options: ClientOptions, credentials: Credentials) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ApiError::Client)?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            application_id: options.application_id,
            token: Mutex::new(credentials.token.clone()),
            credentials,
        })
    }

    /// The currently held bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    fn store_token(&self, token: &str) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(token.to_string());
        }
    }

    /// Exchange username/password for a bearer token and keep it.
    pub async fn authenticate(&self) -> Result<String, ApiError> {
        let (username, password) = self.credentials.login_pair().ok_or(ApiError::MissingCredentials)?;
        let url = format!("{}/auth", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("applicationId", &self.application_id)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|source| ApiError::Connection { url: url.clone(), source })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "authentication rejected");
            return Err(ApiError::Authentication { status: status.as_u16() });
        }

        let body: AuthResponse = decode_body(&url, resp).await?;
        let token = body.token.filter(|t| !t.is_empty()).ok_or_else(|| ApiError::InvalidResponse {
            url: url.clone(),
            message: "response carries no token".to_string(),
        })?;

        self.store_token(&token);
        tracing::info!("authenticated with metering API");
        Ok(token)
    }

    async fn ensure_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self.token() {
            return Ok(token);
        }
        if self.credentials.login_pair().is_none() {
            return Err(ApiError::MissingCredentials);
        }
        self.authenticate().await
    }

    fn authorized(&self, req: RequestBuilder, token: &str) -> RequestBuilder {
        req.header("Content-Type", "application/json")
            .header("applicationId", &self.application_id)
            .header("token", token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, params: &[(&str, String)]) -> Result<T, ApiError> {
        let token = self.ensure_token().await?;
        let mut req = self.authorized(self.http.get(&url), &token);
        if !params.is_empty() {
            req = req.query(params);
        }

        let resp = req
            .send()
            .await
            .map_err(|source| ApiError::Connection { url: url.clone(), source })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::RequestFailed {
                url,
                status: status.as_u16(),
            });
        }

        decode_body(&url, resp).await
    }

    /// All virtual entities visible to the account.
    pub async fn list_entities(&self) -> Result<Vec<Entity>, ApiError> {
        self.get_json(format!("{}/virtualentity", self.base_url), &[]).await
    }

    /// One entity with its detailed resource list.
    pub async fn list_entity_resources(&self, ve_id: &str) -> Result<Entity, ApiError> {
        self.get_json(format!("{}/virtualentity/{ve_id}/resources", self.base_url), &[])
            .await
    }

    /// Raw readings document for one resource.
    pub async fn get_readings(&self, query: &ReadingsQuery) -> Result<Value, ApiError> {
        let (from, to) = match (&query.from, &query.to) {
            (Some(from), Some(to)) => (from.clone(), to.clone()),
            (Some(from), None) => (from.clone(), DateParam::Instant(OffsetDateTime::now_utc())),
            (None, _) => {
                let end = OffsetDateTime::now_utc();
                (DateParam::Instant(end - time::Duration::days(7)), DateParam::Instant(end))
            }
        };

        let mut params = vec![
            ("from", from.to_query_value()),
            ("to", to.to_query_value()),
            ("period", query.period.clone()),
            ("function", query.function.clone()),
        ];
        if let Some(offset) = query.offset {
            params.push(("offset", offset.to_string()));
        }

        let url = format!("{}/resource/{}/readings", self.base_url, query.resource_id);
        tracing::debug!(resource_id = %query.resource_id, from = %params[0].1, to = %params[1].1, "requesting readings");
        self.get_json(url, &params).await
    }
}

async fn decode_body<T: DeserializeOwned>(url: &str, resp: reqwest::Response) -> Result<T, ApiError> {
    let text = resp.text().await.map_err(|e| ApiError::InvalidResponse {
        url: url.to_string(),
        message: format!("failed to read body: {e}"),
    })?;

    if text.trim().is_empty() {
        return Err(ApiError::InvalidResponse {
            url: url.to_string(),
            message: "empty body".to_string(),
        });
    }

    serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse {
        url: url.to_string(),
        message: format!("invalid JSON: {e}"),
    })
}
