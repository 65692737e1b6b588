use serde::Deserialize;
use std::{fs, io, path::PathBuf, time::Duration};

use anyhow::Context;
use energy_client::api::{ClientOptions, DEFAULT_APPLICATION_ID, DEFAULT_BASE_URL, DEFAULT_FUNCTION, DEFAULT_PERIOD};

use crate::merge::DayBoundary;
use crate::pipeline::DEFAULT_WINDOW_DAYS;

pub const CONFIG_ENV: &str = "ENERGY_PIPELINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "energy-pipeline.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub application_id: String,
    /// Unset means no request deadline.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub period: String,
    pub function: String,
    pub offset: Option<i32>,
    pub window_days: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD.to_string(),
            function: DEFAULT_FUNCTION.to_string(),
            offset: None,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub csv_source_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            csv_source_dir: PathBuf::from("data/n3rgy"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    pub day_boundary: DayBoundary,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub retrieval: RetrievalConfig,
    pub paths: PathsConfig,
    pub rollup: RollupConfig,
}

impl AppConfig {
    /// Load from `ENERGY_PIPELINE_CONFIG`, else `energy-pipeline.toml`. Only the
    /// default file may be absent, in which case built-in defaults apply.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let (path, explicit) = match env::var(CONFIG_ENV) {
            Ok(path) => (path, true),
            Err(_) => (DEFAULT_CONFIG_PATH.to_string(), false),
        };
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                tracing::debug!(path = %path, "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("reading config {path}")),
        };
        Self::from_toml_str(&contents).with_context(|| format!("parsing config {path}"))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.retrieval.window_days < 1 {
            anyhow::bail!("retrieval.window_days must be at least 1, got {}", cfg.retrieval.window_days);
        }
        Ok(cfg)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.api.base_url.clone(),
            application_id: self.api.application_id.clone(),
            timeout: self.api.request_timeout_secs.map(Duration::from_secs),
        }
    }
}
