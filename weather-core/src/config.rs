use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, model::UnitSystem};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Settings consumed by the pipeline. Built by the caller; the core never
/// reads files or the environment itself.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// ttl_seconds = 300
/// max_concurrency = 4
/// unit_system = "metric"
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub ttl_seconds: u64,
    pub max_concurrency: usize,
    pub unit_system: UnitSystem,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            ttl_seconds: 300,
            max_concurrency: 4,
            unit_system: UnitSystem::Metric,
            request_timeout_seconds: 10,
            max_retries: 3,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("Config")
            .field("api_key", &key)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_concurrency", &self.max_concurrency)
            .field("unit_system", &self.unit_system)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Config {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
