//! Maps OpenWeatherMap payloads onto [`WeatherSeries`].
//!
//! Every measured field is optional on the wire; a missing field stays `None`
//! in the series and is never replaced by zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::FetchError,
    model::{
        CityQuery, ConditionCode, ObservationKind, UnitSystem, Variable, WeatherObservation,
        WeatherSeries,
    },
    provider::RawPayload,
};

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: Option<u16>,
    main: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    country: Option<String>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: i64,
    name: Option<String>,
    sys: Option<OwSys>,
    timezone: Option<i32>,
    main: Option<OwMain>,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: Option<OwWind>,
    visibility: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    name: Option<String>,
    country: Option<String>,
    timezone: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: Option<OwMain>,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: Option<OwWind>,
    pop: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: Option<OwCity>,
    #[serde(default)]
    list: Vec<OwForecastEntry>,
}

/// Reconcile the current reading and the forecast into one ordered series.
///
/// Where both parts report the same instant, the current reading is kept.
/// Pure: the same payload always yields the same series.
pub fn normalize(
    query: &CityQuery,
    unit_system: UnitSystem,
    raw: &RawPayload,
) -> Result<WeatherSeries, FetchError> {
    if raw.current.is_none() && raw.forecast.is_none() {
        return Err(FetchError::Decode(
            "payload contains neither current nor forecast data".to_string(),
        ));
    }

    let current = raw.current.as_ref().map(parse::<OwCurrentResponse>).transpose()?;
    let forecast = raw.forecast.as_ref().map(parse::<OwForecastResponse>).transpose()?;

    let mut observations = Vec::new();
    let mut location_name = None;
    let mut utc_offset = None;
    let (mut sunrise, mut sunset) = (None, None);

    if let Some(cur) = &current {
        let mut obs = observation(
            cur.dt,
            ObservationKind::Current,
            cur.main.as_ref(),
            cur.wind.as_ref(),
            &cur.weather,
        )?;
        obs.visibility = finite(cur.visibility);
        observations.push(obs);

        let country = cur.sys.as_ref().and_then(|s| s.country.as_deref());
        location_name = display_name(cur.name.as_deref(), country);
        utc_offset = cur.timezone;
        if let Some(sys) = &cur.sys {
            sunrise = sys.sunrise.and_then(unix_to_utc);
            sunset = sys.sunset.and_then(unix_to_utc);
        }
    }

    if let Some(fc) = &forecast {
        for entry in &fc.list {
            let mut obs = observation(
                entry.dt,
                ObservationKind::Forecast,
                entry.main.as_ref(),
                entry.wind.as_ref(),
                &entry.weather,
            )?;
            obs.precipitation_probability = finite(entry.pop).map(|p| p.clamp(0.0, 1.0));
            observations.push(obs);
        }

        if let Some(city) = &fc.city {
            if location_name.is_none() {
                location_name = display_name(city.name.as_deref(), city.country.as_deref());
            }
            utc_offset = utc_offset.or(city.timezone);
        }
    }

    if observations.is_empty() {
        return Err(FetchError::Decode(format!(
            "no observations in provider payload for {query}"
        )));
    }

    let location_name = location_name.unwrap_or_else(|| query.to_string());

    Ok(WeatherSeries::new(
        query.clone(),
        location_name,
        utc_offset,
        unit_system,
        observations,
    )
    .with_sun_times(sunrise, sunset))
}

fn parse<T: DeserializeOwned>(value: &Value) -> Result<T, FetchError> {
    T::deserialize(value).map_err(FetchError::from)
}

fn observation(
    dt: i64,
    kind: ObservationKind,
    main: Option<&OwMain>,
    wind: Option<&OwWind>,
    weather: &[OwWeather],
) -> Result<WeatherObservation, FetchError> {
    let timestamp = unix_to_utc(dt)
        .ok_or_else(|| FetchError::Decode(format!("timestamp {dt} is out of range")))?;

    let mut obs = WeatherObservation::empty(timestamp, kind);

    if let Some(main) = main {
        obs.set(Variable::Temperature, main.temp);
        obs.set(Variable::FeelsLike, main.feels_like);
        obs.set(Variable::Humidity, main.humidity);
        obs.set(Variable::Pressure, main.pressure);
    }
    if let Some(wind) = wind {
        obs.set(Variable::WindSpeed, wind.speed);
        obs.set(Variable::WindDirection, wind.deg);
    }
    if let Some(w) = weather.first() {
        obs.condition = w.id.map(ConditionCode::from_owm_id);
        obs.condition_label = w.description.clone().or_else(|| w.main.clone());
    }

    Ok(obs)
}

fn display_name(name: Option<&str>, country: Option<&str>) -> Option<String> {
    let name = name.filter(|n| !n.is_empty())?;
    Some(match country.filter(|c| !c.is_empty()) {
        Some(country) => format!("{name}, {country}"),
        None => name.to_string(),
    })
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
}
