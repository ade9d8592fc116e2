//! Canned provider payloads and a scripted provider for unit tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    error::FetchError,
    model::CityQuery,
    provider::{RawPayload, WeatherProvider},
};

/// 2024-07-01T00:00:00Z
pub const BASE_TS: i64 = 1_719_792_000;

/// Current reading at `base_ts` plus `forecast_points` 3-hourly forecast entries.
pub fn payload(name: &str, country: &str, base_ts: i64, forecast_points: usize) -> RawPayload {
    let current = json!({
        "dt": base_ts,
        "name": name,
        "timezone": 7200,
        "sys": { "country": country },
        "main": { "temp": 20.0, "feels_like": 19.5, "humidity": 55.0, "pressure": 1012.0 },
        "wind": { "speed": 3.0, "deg": 180.0 },
        "weather": [ { "id": 800, "main": "Clear", "description": "clear sky" } ]
    });

    let list: Vec<Value> = (0..forecast_points)
        .map(|i| {
            let i = i as i64;
            let condition_id = if i % 2 == 0 { 500 } else { 801 };
            json!({
                "dt": base_ts + (i + 1) * 3 * 3600,
                "main": {
                    "temp": 20.0 + i as f64,
                    "feels_like": 19.0 + i as f64,
                    "humidity": 60.0 - i as f64,
                    "pressure": 1010.0 + i as f64
                },
                "wind": { "speed": 2.0 + i as f64 * 0.5, "deg": 90.0 },
                "pop": 0.1,
                "weather": [ { "id": condition_id, "main": "Rain", "description": "light rain" } ]
            })
        })
        .collect();

    let forecast = json!({
        "city": { "name": name, "country": country, "timezone": 7200 },
        "list": list
    });

    RawPayload {
        current: Some(current),
        forecast: Some(forecast),
    }
}

/// Provider that answers from a fixed table and counts calls.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: HashMap<String, Result<RawPayload, FetchError>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    per_city: parking_lot::Mutex<HashMap<String, usize>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_city(mut self, name: &str) -> Self {
        self.responses
            .insert(name.to_string(), Ok(payload(name, "XX", BASE_TS, 8)));
        self
    }

    pub fn with_failure(mut self, name: &str, err: FetchError) -> Self {
        self.responses.insert(name.to_string(), Err(err));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.per_city.lock().get(name).copied().unwrap_or(0)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl WeatherProvider for ScriptedProvider {
    async fn fetch(&self, query: &CityQuery) -> Result<RawPayload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.per_city.lock().entry(query.name().to_string()).or_default() += 1;
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.responses
            .get(query.name())
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Provider {
                    status: 404,
                    message: "city not found".to_string(),
                })
            })
    }
}
