use serde::Serialize;

use crate::model::{ConditionCode, WeatherObservation, WeatherSeries};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConditionCount {
    pub condition: ConditionCode,
    pub count: usize,
    /// Fraction of observations that reported a condition.
    pub share: f64,
}

/// How often each condition occurs in the series, most frequent first.
/// Ties keep the order of first occurrence.
pub fn condition_frequencies(series: &WeatherSeries) -> Vec<ConditionCount> {
    tally(series.observations())
}

pub(crate) fn tally(observations: &[WeatherObservation]) -> Vec<ConditionCount> {
    let mut counts: Vec<ConditionCount> = Vec::new();

    for condition in observations.iter().filter_map(|o| o.condition) {
        match counts.iter_mut().find(|c| c.condition == condition) {
            Some(entry) => entry.count += 1,
            None => counts.push(ConditionCount {
                condition,
                count: 1,
                share: 0.0,
            }),
        }
    }

    let total: usize = counts.iter().map(|c| c.count).sum();
    for entry in &mut counts {
        entry.share = entry.count as f64 / total as f64;
    }

    // stable sort keeps first-occurrence order among equal counts
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}
