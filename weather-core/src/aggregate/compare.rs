use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    analytics::{ClothingAdvice, RainLikelihood, clothing_for, comfort_score_for},
    model::{CityQuery, Variable, WeatherObservation, WeatherSeries},
};

use super::{Bucket, RollupBucket, rollup};

/// Cities as rows, aligned bucket starts as columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTable {
    pub bucket: Bucket,
    /// Union of every city's bucket starts, ascending.
    pub buckets: Vec<DateTime<Utc>>,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub query: CityQuery,
    pub location_name: String,
    /// One cell per column; `None` where the city has no data in that window.
    pub cells: Vec<Option<RollupBucket>>,
}

impl ComparisonTable {
    pub fn row(&self, query: &CityQuery) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| &r.query == query)
    }

    pub fn mean(&self, row: usize, column: usize, variable: Variable) -> Option<f64> {
        self.rows
            .get(row)?
            .cells
            .get(column)?
            .as_ref()?
            .mean(variable)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Align several cities on a shared bucket axis. Input order is kept for rows.
pub fn compare<'a>(
    series: impl IntoIterator<Item = &'a WeatherSeries>,
    bucket: Bucket,
) -> ComparisonTable {
    let rolled: Vec<(&WeatherSeries, Vec<RollupBucket>)> = series
        .into_iter()
        .map(|s| (s, rollup(s, bucket)))
        .collect();

    let buckets: Vec<DateTime<Utc>> = rolled
        .iter()
        .flat_map(|(_, r)| r.iter().map(|b| b.start))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rows = rolled
        .into_iter()
        .map(|(s, rollups)| {
            let mut by_start: BTreeMap<DateTime<Utc>, RollupBucket> =
                rollups.into_iter().map(|b| (b.start, b)).collect();

            ComparisonRow {
                query: s.query().clone(),
                location_name: s.location_name().to_string(),
                cells: buckets.iter().map(|start| by_start.remove(start)).collect(),
            }
        })
        .collect();

    ComparisonTable {
        bucket,
        buckets,
        rows,
    }
}

/// The reading closest to "now" for each city, with comfort and rain estimates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitySnapshot {
    pub query: CityQuery,
    pub location_name: String,
    pub observation: WeatherObservation,
    pub comfort_score: Option<f64>,
    pub rain_likelihood: Option<RainLikelihood>,
    pub clothing: Option<ClothingAdvice>,
}

/// Uses the current reading when present, otherwise the earliest forecast.
/// Series without observations are skipped.
pub fn snapshot<'a>(series: impl IntoIterator<Item = &'a WeatherSeries>) -> Vec<CitySnapshot> {
    series
        .into_iter()
        .filter_map(|s| {
            let observation = s.current().or_else(|| s.observations().first())?;
            Some(CitySnapshot {
                query: s.query().clone(),
                location_name: s.location_name().to_string(),
                comfort_score: comfort_score_for(observation, s.unit_system()),
                rain_likelihood: RainLikelihood::for_observation(observation),
                clothing: clothing_for(observation, s.unit_system()),
                observation: observation.clone(),
            })
        })
        .collect()
}
