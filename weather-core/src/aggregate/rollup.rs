use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::model::{ConditionCode, Variable, WeatherObservation, WeatherSeries};

use super::{Bucket, Stats, conditions::tally, variable_stats};

/// Summary of the observations falling into one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupBucket {
    pub start: DateTime<Utc>,
    pub observations: usize,
    /// Only variables with at least one value in the window.
    pub stats: BTreeMap<Variable, Stats>,
    /// Most frequent condition, earliest occurrence winning ties.
    pub dominant_condition: Option<ConditionCode>,
}

impl RollupBucket {
    pub(crate) fn summarize(start: DateTime<Utc>, observations: &[WeatherObservation]) -> Self {
        Self {
            start,
            observations: observations.len(),
            stats: variable_stats(observations),
            dominant_condition: tally(observations).first().map(|c| c.condition),
        }
    }

    pub fn stats(&self, variable: Variable) -> Option<&Stats> {
        self.stats.get(&variable)
    }

    pub fn mean(&self, variable: Variable) -> Option<f64> {
        self.stats(variable).map(|s| s.mean)
    }
}

/// Group the series into consecutive UTC-aligned windows. Windows with no
/// observations do not appear.
pub fn rollup(series: &WeatherSeries, bucket: Bucket) -> Vec<RollupBucket> {
    series
        .observations()
        .chunk_by(|a, b| bucket.start_of(a.timestamp) == bucket.start_of(b.timestamp))
        .map(|chunk| RollupBucket::summarize(bucket.start_of(chunk[0].timestamp), chunk))
        .collect()
}

/// Mean of each variable by UTC hour of day, pooled across days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourProfile {
    pub hour: u32,
    pub observations: usize,
    pub means: BTreeMap<Variable, f64>,
}

pub fn diurnal_profile(series: &WeatherSeries) -> Vec<HourProfile> {
    let mut by_hour: BTreeMap<u32, Vec<WeatherObservation>> = BTreeMap::new();
    for obs in series.observations() {
        by_hour
            .entry(obs.timestamp.hour())
            .or_default()
            .push(obs.clone());
    }

    by_hour
        .into_iter()
        .map(|(hour, observations)| HourProfile {
            hour,
            observations: observations.len(),
            means: variable_stats(&observations)
                .into_iter()
                .map(|(var, stats)| (var, stats.mean))
                .collect(),
        })
        .collect()
}
