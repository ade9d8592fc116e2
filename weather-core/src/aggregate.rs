//! Derived, read-only views over normalized series.
//!
//! Everything here is a pure function of its input series. Missing data is
//! carried through as absent cells or [`Correlation::Undefined`], never as an
//! error or a stand-in number.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    model::{CityQuery, UnitSystem, Variable, WeatherObservation, WeatherSeries},
    orchestrator::BatchResults,
};

pub mod compare;
pub mod conditions;
pub mod correlate;
pub mod rollup;

pub use compare::{CitySnapshot, ComparisonRow, ComparisonTable, compare, snapshot};
pub use conditions::{ConditionCount, condition_frequencies};
pub use correlate::{Correlation, CorrelationMatrix, correlate};
pub use rollup::{HourProfile, RollupBucket, diurnal_profile, rollup};

/// Aggregation window. Buckets are aligned to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Hourly,
    #[default]
    Daily,
}

impl Bucket {
    pub fn width_seconds(&self) -> i64 {
        match self {
            Bucket::Hourly => 3_600,
            Bucket::Daily => 86_400,
        }
    }

    /// Start of the bucket containing `ts`.
    pub fn start_of(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let floored = secs - secs.rem_euclid(self.width_seconds());
        DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(ts)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Hourly => "hourly",
            Bucket::Daily => "daily",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "hourly" => Ok(Bucket::Hourly),
            "daily" => Ok(Bucket::Daily),
            _ => Err(format!("unknown bucket '{value}', expected hourly or daily")),
        }
    }
}

/// Summary of one variable over a set of observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

impl Stats {
    /// `None` when no value is present.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }

        (count > 0).then(|| Stats {
            min,
            max,
            mean: sum / count as f64,
            count,
        })
    }
}

/// Per-variable statistics over `observations`, skipping absent values.
pub(crate) fn variable_stats(observations: &[WeatherObservation]) -> BTreeMap<Variable, Stats> {
    Variable::all()
        .iter()
        .filter_map(|&var| {
            Stats::from_values(observations.iter().filter_map(|o| o.value(var)))
                .map(|stats| (var, stats))
        })
        .collect()
}

/// Everything derived for a single city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityReport {
    pub query: CityQuery,
    pub location_name: String,
    pub unit_system: UnitSystem,
    pub observations: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub daily: Vec<RollupBucket>,
    pub hourly: Vec<RollupBucket>,
    pub diurnal: Vec<HourProfile>,
    pub conditions: Vec<ConditionCount>,
    pub correlation: CorrelationMatrix,
}

impl CityReport {
    pub fn build(series: &WeatherSeries) -> Self {
        Self {
            query: series.query().clone(),
            location_name: series.location_name().to_string(),
            unit_system: series.unit_system(),
            observations: series.len(),
            first: series.timestamps().next(),
            last: series.timestamps().last(),
            daily: rollup(series, Bucket::Daily),
            hourly: rollup(series, Bucket::Hourly),
            diurnal: diurnal_profile(series),
            conditions: condition_frequencies(series),
            correlation: correlate(series),
        }
    }
}

/// The finished model handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub cities: Vec<CityReport>,
    pub comparison: ComparisonTable,
    pub snapshot: Vec<CitySnapshot>,
}

impl AggregateReport {
    /// Derive the report from a set of series, keeping their order.
    pub fn build<'a, I>(series: I, comparison_bucket: Bucket) -> Self
    where
        I: IntoIterator<Item = &'a WeatherSeries>,
    {
        let series: Vec<&WeatherSeries> = series.into_iter().collect();

        Self {
            cities: series.iter().map(|s| CityReport::build(s)).collect(),
            comparison: compare(series.iter().copied(), comparison_bucket),
            snapshot: snapshot(series.iter().copied()),
        }
    }

    /// Build from a batch, using successful cities only, ordered by location name.
    pub fn from_results(results: &BatchResults, comparison_bucket: Bucket) -> Self {
        let mut series: Vec<&WeatherSeries> = results
            .values()
            .filter_map(|r| r.as_ref().ok())
            .map(|s| s.as_ref())
            .collect();
        series.sort_by(|a, b| {
            a.location_name()
                .cmp(b.location_name())
                .then_with(|| a.query().to_string().cmp(&b.query().to_string()))
        });
        Self::build(series, comparison_bucket)
    }

    pub fn city(&self, query: &CityQuery) -> Option<&CityReport> {
        self.cities.iter().find(|c| &c.query == query)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::model::{
        CityQuery, ConditionCode, ObservationKind, UnitSystem, WeatherObservation, WeatherSeries,
    };

    /// 2024-07-01T00:00:00Z plus `hours`.
    pub fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    pub fn obs(hours: i64, temp: Option<f64>, humidity: Option<f64>) -> WeatherObservation {
        let mut o = WeatherObservation::empty(at(hours), ObservationKind::Forecast);
        o.temperature = temp;
        o.humidity = humidity;
        o
    }

    pub fn with_condition(mut o: WeatherObservation, c: ConditionCode) -> WeatherObservation {
        o.condition = Some(c);
        o
    }

    pub fn series(name: &str, observations: Vec<WeatherObservation>) -> WeatherSeries {
        WeatherSeries::new(
            CityQuery::new(name),
            name,
            None,
            UnitSystem::Metric,
            observations,
        )
    }
}
