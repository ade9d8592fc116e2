//! Simple comfort, rain and clothing heuristics for a single reading.
//!
//! The thresholds are defined in metric units; readings in other unit
//! systems are converted first.

use serde::Serialize;

use crate::model::{UnitSystem, WeatherObservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RainLikelihood {
    High,
    Medium,
    Low,
    VeryLow,
}

impl RainLikelihood {
    /// From relative humidity (%) and pressure (hPa).
    pub fn estimate(humidity: f64, pressure: f64) -> Self {
        if humidity > 80.0 && pressure < 1013.0 {
            RainLikelihood::High
        } else if humidity > 60.0 && pressure < 1015.0 {
            RainLikelihood::Medium
        } else if humidity > 40.0 {
            RainLikelihood::Low
        } else {
            RainLikelihood::VeryLow
        }
    }

    pub fn for_observation(obs: &WeatherObservation) -> Option<Self> {
        Some(Self::estimate(obs.humidity?, obs.pressure?))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RainLikelihood::High => "High",
            RainLikelihood::Medium => "Medium",
            RainLikelihood::Low => "Low",
            RainLikelihood::VeryLow => "Very Low",
        }
    }
}

/// What to wear, from the wind-chilled temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClothingAdvice {
    WinterGear,
    WarmJacket,
    LightJacket,
    TShirt,
    LightClothing,
}

impl ClothingAdvice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClothingAdvice::WinterGear => "Heavy winter coat, gloves, hat, and warm boots",
            ClothingAdvice::WarmJacket => "Warm jacket, long pants, and closed shoes",
            ClothingAdvice::LightJacket => "Light jacket or sweater, long pants",
            ClothingAdvice::TShirt => "T-shirt or light shirt, comfortable pants",
            ClothingAdvice::LightClothing => "Light clothing, shorts, and sandals",
        }
    }
}

/// Chill is approximated as two degrees per m/s of wind.
pub fn clothing_recommendation(temperature_c: f64, wind_speed_mps: f64) -> ClothingAdvice {
    let chilled = temperature_c - wind_speed_mps * 2.0;

    if chilled < 0.0 {
        ClothingAdvice::WinterGear
    } else if chilled < 10.0 {
        ClothingAdvice::WarmJacket
    } else if chilled < 20.0 {
        ClothingAdvice::LightJacket
    } else if chilled < 25.0 {
        ClothingAdvice::TShirt
    } else {
        ClothingAdvice::LightClothing
    }
}

pub fn clothing_for(obs: &WeatherObservation, units: UnitSystem) -> Option<ClothingAdvice> {
    let temperature = to_celsius(obs.temperature?, units);
    let wind = to_mps(obs.wind_speed?, units);
    Some(clothing_recommendation(temperature, wind))
}

/// Comfort score in 0..=100. Ideal is 22.5 °C, 50 % humidity, wind at most 5 m/s.
pub fn comfort_score(temperature_c: f64, humidity: f64, wind_speed_mps: f64) -> f64 {
    let temp_score = (100.0 - (temperature_c - 22.5).abs() * 4.0).max(0.0);
    let humidity_score = (100.0 - (humidity - 50.0).abs() * 2.0).max(0.0);
    let wind_score = (100.0 - (wind_speed_mps - 5.0).max(0.0) * 10.0).max(0.0);

    (temp_score + humidity_score + wind_score) / 3.0
}

/// Comfort score for a reading, or `None` when any input is absent.
pub fn comfort_score_for(obs: &WeatherObservation, units: UnitSystem) -> Option<f64> {
    let temperature = to_celsius(obs.temperature?, units);
    let wind = to_mps(obs.wind_speed?, units);
    Some(comfort_score(temperature, obs.humidity?, wind))
}

fn to_celsius(value: f64, units: UnitSystem) -> f64 {
    match units {
        UnitSystem::Metric => value,
        UnitSystem::Imperial => (value - 32.0) * 5.0 / 9.0,
        UnitSystem::Standard => value - 273.15,
    }
}

fn to_mps(value: f64, units: UnitSystem) -> f64 {
    match units {
        UnitSystem::Imperial => value * 0.447_04,
        UnitSystem::Metric | UnitSystem::Standard => value,
    }
}
