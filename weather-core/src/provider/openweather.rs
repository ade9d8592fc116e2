use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::{
    Config,
    error::{ConfigError, FetchError},
    model::{CityQuery, UnitSystem},
};

use super::{RawPayload, WeatherProvider};

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    units: UnitSystem,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            units: config.unit_system,
            http,
        })
    }

    fn query_params(&self, query: &CityQuery) -> Vec<(&'static str, String)> {
        let mut params = match query.coordinates() {
            Some(c) if query.name().is_empty() => {
                vec![("lat", c.lat.to_string()), ("lon", c.lon.to_string())]
            }
            _ => vec![("q", query.provider_query())],
        };
        params.push(("appid", self.api_key.clone()));
        params.push(("units", self.units.as_str().to_string()));
        params
    }

    async fn get_json(
        &self,
        endpoint: &str,
        params: &[(&'static str, String)],
    ) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let res = self.http.get(&url).query(params).send().await.map_err(|e| {
            FetchError::Network(format!("Failed to send request to OpenWeather ({endpoint}): {e}"))
        })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            FetchError::Network(format!("Failed to read OpenWeather {endpoint} response body: {e}"))
        })?;

        if !status.is_success() {
            return Err(FetchError::Provider {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            FetchError::Decode(format!("OpenWeather {endpoint} response is not JSON: {e}"))
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch(&self, query: &CityQuery) -> Result<RawPayload, FetchError> {
        query.validate()?;
        let params = self.query_params(query);

        tracing::debug!(city = %query, "requesting OpenWeather current + forecast");

        let (current, forecast) = tokio::try_join!(
            self.get_json("weather", &params),
            self.get_json("forecast", &params),
        )?;

        Ok(RawPayload {
            current: Some(current),
            forecast: Some(forecast),
        })
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
