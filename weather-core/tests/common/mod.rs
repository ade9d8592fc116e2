#![allow(dead_code)]

use serde_json::{Value, json};
use weather_core::Config;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

/// 2024-07-01T00:00:00Z
pub const BASE_TS: i64 = 1_719_792_000;

pub fn current_body(name: &str, country: &str) -> Value {
    json!({
        "dt": BASE_TS,
        "name": name,
        "timezone": 3600,
        "sys": { "country": country },
        "main": { "temp": 21.0, "feels_like": 20.5, "humidity": 48, "pressure": 1016 },
        "wind": { "speed": 2.5, "deg": 200 },
        "weather": [ { "id": 800, "main": "Clear", "description": "clear sky" } ]
    })
}

/// `points` 3-hourly entries starting three hours after [`BASE_TS`].
pub fn forecast_body(name: &str, country: &str, points: usize) -> Value {
    let list: Vec<Value> = (0..points)
        .map(|i| {
            json!({
                "dt": BASE_TS + (i as i64 + 1) * 3 * 3600,
                "main": { "temp": 18.0 + i as f64, "humidity": 60, "pressure": 1012 },
                "wind": { "speed": 4.0 },
                "pop": 0.4,
                "weather": [ { "id": 500, "description": "light rain" } ]
            })
        })
        .collect();

    json!({
        "city": { "name": name, "country": country, "timezone": 3600 },
        "list": list
    })
}

/// Serve both endpoints for `city` with the given status and body.
pub async fn mount_city(
    server: &MockServer,
    city: &str,
    current: ResponseTemplate,
    forecast: ResponseTemplate,
) {
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", city))
        .respond_with(current)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("q", city))
        .respond_with(forecast)
        .mount(server)
        .await;
}

pub async fn mount_ok(server: &MockServer, city: &str, country: &str, points: usize) {
    mount_city(
        server,
        city,
        ResponseTemplate::new(200).set_body_json(current_body(city, country)),
        ResponseTemplate::new(200).set_body_json(forecast_body(city, country, points)),
    )
    .await;
}

pub async fn mount_not_found(server: &MockServer, city: &str) {
    let body = json!({ "cod": "404", "message": "city not found" });
    mount_city(
        server,
        city,
        ResponseTemplate::new(404).set_body_json(body.clone()),
        ResponseTemplate::new(404).set_body_json(body),
    )
    .await;
}

pub fn config_for(server: &MockServer) -> Config {
    Config {
        base_url: server.uri(),
        max_retries: 0,
        ..Config::with_api_key("TEST_KEY")
    }
}
