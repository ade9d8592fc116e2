use std::fmt::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use weather_core::{
    AggregateReport, CityQuery, FetchError, UnitSystem, Variable, WeatherObservation,
    WeatherSeries,
    aggregate::{CityReport, ComparisonTable, RollupBucket},
    analytics::clothing_for,
};

/// A city that could not be fetched, as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub city: String,
    pub error: String,
}

impl Failure {
    pub fn new(query: &CityQuery, err: &FetchError) -> Self {
        Self {
            city: query.to_string(),
            error: err.to_string(),
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a AggregateReport,
    failures: &'a [Failure],
}

pub fn json(report: &AggregateReport, failures: &[Failure]) -> Result<String> {
    serde_json::to_string_pretty(&JsonOutput { report, failures })
        .context("Failed to serialize report to JSON")
}

pub fn text(report: &AggregateReport, failures: &[Failure]) -> String {
    let mut out = String::new();

    if !report.snapshot.is_empty() {
        let _ = writeln!(out, "== Current conditions ==");
        for snap in &report.snapshot {
            let units = unit_system_of(report, &snap.query);
            let _ = writeln!(
                out,
                "{:<24} {}  comfort {}  rain {}",
                snap.location_name,
                observation_line(&snap.observation, units),
                snap.comfort_score
                    .map(|s| format!("{s:.0}/100"))
                    .unwrap_or_else(|| "-".into()),
                snap.rain_likelihood.map(|r| r.as_str()).unwrap_or("-"),
            );
            if let Some(clothing) = snap.clothing {
                let _ = writeln!(out, "{:<24} wear: {}", "", clothing.as_str());
            }
        }
        out.push('\n');
    }

    for city in &report.cities {
        city_section(&mut out, city);
    }

    if report.comparison.rows.len() > 1 {
        comparison_section(&mut out, &report.comparison);
    }

    if !failures.is_empty() {
        let _ = writeln!(out, "== Failed ==");
        for f in failures {
            let _ = writeln!(out, "{:<24} {}", f.city, f.error);
        }
    }

    out
}

/// Current reading plus daily summary for a single city.
pub fn city_text(city: &CityReport, series: &WeatherSeries) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Weather for {}", city.location_name);
    if let Some(obs) = series.current() {
        let _ = writeln!(
            out,
            "  now ({}): {}",
            obs.local_time.format("%Y-%m-%d %H:%M"),
            observation_line(obs, city.unit_system)
        );
        if let Some(visibility) = obs.visibility {
            let _ = writeln!(out, "  visibility: {:.1} km", visibility / 1000.0);
        }
        if let Some(clothing) = clothing_for(obs, city.unit_system) {
            let _ = writeln!(out, "  wear: {}", clothing.as_str());
        }
    }
    if let (Some(sunrise), Some(sunset)) = (series.sunrise(), series.sunset()) {
        let _ = writeln!(
            out,
            "  sunrise {}  sunset {}",
            series.local_time(sunrise).format("%H:%M"),
            series.local_time(sunset).format("%H:%M")
        );
    }
    out.push('\n');
    daily_table(&mut out, &city.daily, city.unit_system);
    out
}

fn city_section(out: &mut String, city: &CityReport) {
    let _ = writeln!(
        out,
        "== {} ({} observations) ==",
        city.location_name, city.observations
    );
    daily_table(out, &city.daily, city.unit_system);

    if !city.conditions.is_empty() {
        let summary: Vec<String> = city
            .conditions
            .iter()
            .map(|c| format!("{} {:.0}%", c.condition.description(), c.share * 100.0))
            .collect();
        let _ = writeln!(out, "  conditions: {}", summary.join(", "));
    }

    let humidity_vs_temp = city
        .correlation
        .get(Variable::Temperature, Variable::Humidity)
        .value();
    let _ = writeln!(
        out,
        "  temperature/humidity correlation: {}",
        humidity_vs_temp
            .map(|r| format!("{r:+.2}"))
            .unwrap_or_else(|| "n/a".into())
    );
    out.push('\n');
}

fn daily_table(out: &mut String, days: &[RollupBucket], units: UnitSystem) {
    let suffix = units.temperature_suffix();
    let _ = writeln!(
        out,
        "  {:<12} {:>8} {:>8} {:>8} {:>6} {:>6}  {}",
        "day (UTC)", "min", "mean", "max", "hum%", "pop%", "condition"
    );

    for day in days {
        let temp = day.stats(Variable::Temperature);
        let _ = writeln!(
            out,
            "  {:<12} {:>8} {:>8} {:>8} {:>6} {:>6}  {}",
            day.start.format("%Y-%m-%d"),
            fmt_opt(temp.map(|s| s.min), suffix),
            fmt_opt(temp.map(|s| s.mean), suffix),
            fmt_opt(temp.map(|s| s.max), suffix),
            fmt_opt(day.mean(Variable::Humidity), ""),
            fmt_opt(
                day.mean(Variable::PrecipitationProbability).map(|p| p * 100.0),
                ""
            ),
            day.dominant_condition.map(|c| c.description()).unwrap_or("-"),
        );
    }
}

fn comparison_section(out: &mut String, table: &ComparisonTable) {
    let _ = writeln!(out, "== Mean temperature by {} bucket ==", table.bucket);

    let header: Vec<String> = table
        .buckets
        .iter()
        .map(|b| format!("{:>11}", b.format("%m-%d %H:%M")))
        .collect();
    let _ = writeln!(out, "  {:<20} {}", "", header.join(" "));

    for (row_idx, row) in table.rows.iter().enumerate() {
        let cells: Vec<String> = (0..table.buckets.len())
            .map(|col| {
                let mean = table.mean(row_idx, col, Variable::Temperature);
                format!("{:>11}", fmt_opt(mean, ""))
            })
            .collect();
        let _ = writeln!(out, "  {:<20} {}", row.location_name, cells.join(" "));
    }
    out.push('\n');
}

fn observation_line(obs: &WeatherObservation, units: UnitSystem) -> String {
    format!(
        "{} (feels {}), {}% hum, {} hPa, wind {}, {}",
        fmt_opt(obs.temperature, units.temperature_suffix()),
        fmt_opt(obs.feels_like, units.temperature_suffix()),
        fmt_opt(obs.humidity, ""),
        fmt_opt(obs.pressure, ""),
        fmt_opt(obs.wind_speed, ""),
        obs.condition_label.as_deref().unwrap_or("-"),
    )
}

fn unit_system_of(report: &AggregateReport, query: &CityQuery) -> UnitSystem {
    report
        .city(query)
        .map(|c| c.unit_system)
        .unwrap_or_default()
}

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{v:.1}{suffix}"),
        None => "-".to_string(),
    }
}
