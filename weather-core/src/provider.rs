use crate::{
    Config,
    error::{ConfigError, FetchError},
    model::CityQuery,
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};

pub mod openweather;

/// Undecoded provider answer for one city: an instantaneous reading and a
/// multi-point forecast. Either part may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPayload {
    pub current: Option<Value>,
    pub forecast: Option<Value>,
}

/// One logical "get weather for this city" round trip. No retries here.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, query: &CityQuery) -> Result<RawPayload, FetchError>;
}

/// Construct the OpenWeatherMap provider from a validated config.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn WeatherProvider>, ConfigError> {
    config.validate()?;
    Ok(Arc::new(OpenWeatherProvider::new(config)?))
}
