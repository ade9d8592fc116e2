use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FetchError};

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl PartialEq for Coordinates {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lon.to_bits() == other.lon.to_bits()
    }
}

impl Eq for Coordinates {}

impl Hash for Coordinates {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lat.to_bits().hash(state);
        self.lon.to_bits().hash(state);
    }
}

/// Identifies a requested location. Used as the cache and result key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CityQuery {
    name: String,
    country: Option<String>,
    coordinates: Option<Coordinates>,
}

impl CityQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            country: None,
            coordinates: None,
        }
    }

    /// Query by position only; the provider resolves the place name.
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            name: String::new(),
            country: None,
            coordinates: Some(Coordinates { lat, lon }),
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        let country = country.into().trim().to_string();
        self.country = (!country.is_empty()).then_some(country);
        self
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.coordinates = Some(Coordinates { lat, lon });
        self
    }

    /// Parse `"Paris"` or `"Paris,FR"`.
    pub fn parse(input: &str) -> Self {
        match input.split_once(',') {
            Some((name, country)) => Self::new(name).with_country(country),
            None => Self::new(input),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    /// A query is resolvable when it has a name or finite coordinates.
    pub fn validate(&self) -> Result<(), FetchError> {
        let coords_ok = self
            .coordinates
            .is_some_and(|c| c.lat.is_finite() && c.lon.is_finite());

        if self.name.is_empty() && !coords_ok {
            return Err(FetchError::Decode(
                "city query needs a name or finite coordinates".to_string(),
            ));
        }
        Ok(())
    }

    /// Value for the provider's `q` parameter.
    pub fn provider_query(&self) -> String {
        match &self.country {
            Some(country) => format!("{},{}", self.name, country),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for CityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.coordinates) {
            (name, Some(c)) if name.is_empty() => write!(f, "({:.4}, {:.4})", c.lat, c.lon),
            _ => f.write_str(&self.provider_query()),
        }
    }
}

/// Unit system requested from the provider. Values are stored as delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
            UnitSystem::Standard => "standard",
        }
    }

    pub const fn all() -> &'static [UnitSystem] {
        &[UnitSystem::Metric, UnitSystem::Imperial, UnitSystem::Standard]
    }

    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "°C",
            UnitSystem::Imperial => "°F",
            UnitSystem::Standard => "K",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitSystem {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            "standard" => Ok(UnitSystem::Standard),
            _ => Err(ConfigError::UnknownUnitSystem(value.to_string())),
        }
    }
}

/// Condition category derived from OpenWeatherMap condition ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionCode {
    Thunderstorm,
    Drizzle,
    Rain,
    Snow,
    Atmosphere,
    Clear,
    Clouds,
    Unknown,
}

impl ConditionCode {
    /// See https://openweathermap.org/weather-conditions
    pub fn from_owm_id(id: u16) -> Self {
        match id {
            200..=299 => Self::Thunderstorm,
            300..=399 => Self::Drizzle,
            500..=599 => Self::Rain,
            600..=699 => Self::Snow,
            700..=799 => Self::Atmosphere,
            800 => Self::Clear,
            801..=899 => Self::Clouds,
            _ => Self::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Thunderstorm => "Thunderstorm",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Atmosphere => "Mist/Haze",
            Self::Clear => "Clear",
            Self::Clouds => "Clouds",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Current,
    Forecast,
}

/// Numeric variables carried by an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    FeelsLike,
    Humidity,
    Pressure,
    WindSpeed,
    WindDirection,
    PrecipitationProbability,
}

impl Variable {
    pub const fn all() -> &'static [Variable] {
        &[
            Variable::Temperature,
            Variable::FeelsLike,
            Variable::Humidity,
            Variable::Pressure,
            Variable::WindSpeed,
            Variable::WindDirection,
            Variable::PrecipitationProbability,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::FeelsLike => "feels_like",
            Variable::Humidity => "humidity",
            Variable::Pressure => "pressure",
            Variable::WindSpeed => "wind_speed",
            Variable::WindDirection => "wind_direction",
            Variable::PrecipitationProbability => "precipitation_probability",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point in time for one city. `None` means the provider did not report it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherObservation {
    pub timestamp: DateTime<Utc>,
    /// Wall-clock label at the location; never used for ordering.
    pub local_time: NaiveDateTime,
    pub kind: ObservationKind,
    pub temperature: Option<f64>,
    pub feels_like: Option<f64>,
    /// Relative humidity, percent.
    pub humidity: Option<f64>,
    /// Sea-level pressure, hPa.
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    /// Meteorological degrees.
    pub wind_direction: Option<f64>,
    /// Fraction in 0.0..=1.0.
    pub precipitation_probability: Option<f64>,
    /// Metres; only the current reading reports it.
    pub visibility: Option<f64>,
    pub condition: Option<ConditionCode>,
    pub condition_label: Option<String>,
}

impl WeatherObservation {
    /// An observation with every measured field absent.
    pub fn empty(timestamp: DateTime<Utc>, kind: ObservationKind) -> Self {
        Self {
            timestamp,
            local_time: timestamp.naive_utc(),
            kind,
            temperature: None,
            feels_like: None,
            humidity: None,
            pressure: None,
            wind_speed: None,
            wind_direction: None,
            precipitation_probability: None,
            visibility: None,
            condition: None,
            condition_label: None,
        }
    }

    pub fn value(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::Temperature => self.temperature,
            Variable::FeelsLike => self.feels_like,
            Variable::Humidity => self.humidity,
            Variable::Pressure => self.pressure,
            Variable::WindSpeed => self.wind_speed,
            Variable::WindDirection => self.wind_direction,
            Variable::PrecipitationProbability => self.precipitation_probability,
        }
    }

    pub fn set(&mut self, variable: Variable, value: Option<f64>) {
        let value = value.filter(|v| v.is_finite());
        match variable {
            Variable::Temperature => self.temperature = value,
            Variable::FeelsLike => self.feels_like = value,
            Variable::Humidity => self.humidity = value,
            Variable::Pressure => self.pressure = value,
            Variable::WindSpeed => self.wind_speed = value,
            Variable::WindDirection => self.wind_direction = value,
            Variable::PrecipitationProbability => self.precipitation_probability = value,
        }
    }
}

/// Chronological, duplicate-free observations for a single city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSeries {
    query: CityQuery,
    location_name: String,
    utc_offset_seconds: Option<i32>,
    unit_system: UnitSystem,
    observations: Vec<WeatherObservation>,
    sunrise: Option<DateTime<Utc>>,
    sunset: Option<DateTime<Utc>>,
}

impl WeatherSeries {
    /// Builds a series, sorting by timestamp and keeping the first observation
    /// for any repeated timestamp. Local time labels are derived from the offset.
    pub fn new(
        query: CityQuery,
        location_name: impl Into<String>,
        utc_offset_seconds: Option<i32>,
        unit_system: UnitSystem,
        mut observations: Vec<WeatherObservation>,
    ) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        observations.dedup_by_key(|o| o.timestamp);

        let offset = utc_offset_seconds.and_then(FixedOffset::east_opt);
        for obs in &mut observations {
            obs.local_time = match offset {
                Some(offset) => obs.timestamp.with_timezone(&offset).naive_local(),
                None => obs.timestamp.naive_utc(),
            };
        }

        Self {
            query,
            location_name: location_name.into(),
            utc_offset_seconds,
            unit_system,
            observations,
            sunrise: None,
            sunset: None,
        }
    }

    pub fn with_sun_times(
        mut self,
        sunrise: Option<DateTime<Utc>>,
        sunset: Option<DateTime<Utc>>,
    ) -> Self {
        self.sunrise = sunrise;
        self.sunset = sunset;
        self
    }

    pub fn query(&self) -> &CityQuery {
        &self.query
    }

    pub fn location_name(&self) -> &str {
        &self.location_name
    }

    pub fn utc_offset_seconds(&self) -> Option<i32> {
        self.utc_offset_seconds
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    /// Today's sunrise as reported with the current reading.
    pub fn sunrise(&self) -> Option<DateTime<Utc>> {
        self.sunrise
    }

    pub fn sunset(&self) -> Option<DateTime<Utc>> {
        self.sunset
    }

    /// Wall-clock label for `ts` at the location.
    pub fn local_time(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        match self.utc_offset_seconds.and_then(FixedOffset::east_opt) {
            Some(offset) => ts.with_timezone(&offset).naive_local(),
            None => ts.naive_utc(),
        }
    }

    pub fn observations(&self) -> &[WeatherObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.observations.iter().map(|o| o.timestamp)
    }

    /// The instantaneous reading, if the payload contained one.
    pub fn current(&self) -> Option<&WeatherObservation> {
        self.observations
            .iter()
            .find(|o| o.kind == ObservationKind::Current)
    }
}

/// Outcome of one fetch for one city.
pub type FetchResult = Result<std::sync::Arc<WeatherSeries>, FetchError>;
