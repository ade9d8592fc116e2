//! Core library for the `weather-report` CLI.
//!
//! This crate defines:
//! - Configuration and error types
//! - The provider abstraction and the OpenWeatherMap client
//! - Normalization of provider payloads into a canonical series
//! - A single-flight TTL cache and a bounded, cancellable batch orchestrator
//! - Pure aggregations: rollups, cross-city comparison, correlation
//!
//! It is used by `weather-report-cli`, but can also be reused by other binaries or services.

pub mod aggregate;
pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod provider;

#[cfg(test)]
mod fixtures;

pub use aggregate::{AggregateReport, Bucket, CityReport, Correlation, Stats};
pub use analytics::{ClothingAdvice, RainLikelihood};
pub use cache::{CacheEntry, FetchCache};
pub use config::Config;
pub use error::{ConfigError, ErrorKind, FetchError};
pub use model::{
    CityQuery, ConditionCode, FetchResult, ObservationKind, UnitSystem, Variable,
    WeatherObservation, WeatherSeries,
};
pub use orchestrator::{BatchEvent, BatchHandle, BatchOptions, BatchResults, Orchestrator};
pub use provider::{RawPayload, WeatherProvider};
