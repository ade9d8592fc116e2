use std::pin::pin;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use inquire::{CustomType, Password, PasswordDisplayMode, Select, Text};
use weather_core::{
    AggregateReport, BatchEvent, Bucket, CityQuery, Orchestrator, UnitSystem,
    aggregate::CityReport,
};

use crate::{
    render::{self, Failure},
    settings::Settings,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-report", version, about = "Multi-city weather reports")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively edit the API key, units, cache and default cities.
    Configure,

    /// Fetch several cities concurrently and print an aggregated report.
    Report {
        /// Cities, optionally with a country code, e.g. `London` or `Paris,FR`.
        /// Falls back to the configured default cities.
        cities: Vec<String>,

        /// Bucket width for the cross-city comparison.
        #[arg(long, value_enum, default_value_t = BucketArg::Daily)]
        bucket: BucketArg,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Show the current reading and daily summary for one city.
    Show {
        city: String,

        #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BucketArg {
    Daily,
    Hourly,
}

impl From<BucketArg> for Bucket {
    fn from(arg: BucketArg) -> Self {
        match arg {
            BucketArg::Daily => Bucket::Daily,
            BucketArg::Hourly => Bucket::Hourly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Report {
                cities,
                bucket,
                format,
                api_key,
            } => report(cities, bucket.into(), format, api_key).await,
            Command::Show { city, api_key } => show(city, api_key).await,
        }
    }
}

fn configure() -> Result<()> {
    let mut settings = Settings::load()?;

    let prompt = if settings.weather.api_key.is_empty() {
        "OpenWeatherMap API key:"
    } else {
        "OpenWeatherMap API key (leave empty to keep current):"
    };
    let api_key = Password::new(prompt)
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()
        .context("Failed to read API key")?;
    if !api_key.trim().is_empty() {
        settings.weather.api_key = api_key.trim().to_string();
    }

    let units = UnitSystem::all().to_vec();
    let current = units
        .iter()
        .position(|u| *u == settings.weather.unit_system)
        .unwrap_or(0);
    settings.weather.unit_system = Select::new("Units:", units)
        .with_starting_cursor(current)
        .prompt()
        .context("Failed to read unit system")?;

    settings.weather.ttl_seconds = CustomType::<u64>::new("Cache TTL (seconds):")
        .with_default(settings.weather.ttl_seconds)
        .prompt()
        .context("Failed to read cache TTL")?;

    let concurrency = CustomType::<usize>::new("Max concurrent requests:")
        .with_default(settings.weather.max_concurrency)
        .prompt()
        .context("Failed to read concurrency")?;
    settings.weather.max_concurrency = concurrency.max(1);

    let current_cities = settings
        .default_cities
        .iter()
        .map(|c| c.replace(',', ":"))
        .collect::<Vec<_>>()
        .join(", ");
    let cities = Text::new("Default cities (comma separated, use City:CC for a country):")
        .with_default(&current_cities)
        .prompt()
        .context("Failed to read default cities")?;
    settings.default_cities = parse_city_list(&cities);

    settings.save()?;
    println!(
        "Saved settings to {}",
        Settings::config_file_path()?.display()
    );
    Ok(())
}

async fn report(
    cities: Vec<String>,
    bucket: Bucket,
    format: OutputFormat,
    api_key: Option<String>,
) -> Result<()> {
    let settings = Settings::load()?;
    let config = settings.resolve(api_key)?;
    let queries = settings.cities_or_default(&cities)?;
    tracing::debug!(?config, cities = queries.len(), "starting report");
    let orchestrator = Orchestrator::from_config(&config)?;

    let mut handle = orchestrator.spawn_many(queries);
    let total = handle.queries().len();
    let mut done = 0usize;
    let mut interrupted = false;
    let mut ctrl_c = pin!(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("Interrupted, cancelling remaining cities...");
                handle.cancel();
            }
            event = handle.next_event() => match event {
                Some(BatchEvent::Completed { query, result }) => {
                    done += 1;
                    let status = match &result {
                        Ok(series) => format!("ok ({} observations)", series.len()),
                        Err(err) => format!("failed: {err}"),
                    };
                    eprintln!("[{done}/{total}] {query}: {status}");
                }
                Some(BatchEvent::Finished { .. }) | None => break,
            },
        }
    }

    let results = handle.join().await;

    let mut failures: Vec<Failure> = results
        .iter()
        .filter_map(|(query, result)| result.as_ref().err().map(|e| Failure::new(query, e)))
        .collect();
    failures.sort_by(|a, b| a.city.cmp(&b.city));

    let report = AggregateReport::from_results(&results, bucket);

    match format {
        OutputFormat::Text => print!("{}", render::text(&report, &failures)),
        OutputFormat::Json => println!("{}", render::json(&report, &failures)?),
    }

    if report.cities.is_empty() {
        return Err(anyhow!("No city could be fetched."));
    }
    Ok(())
}

async fn show(city: String, api_key: Option<String>) -> Result<()> {
    let settings = Settings::load()?;
    let config = settings.resolve(api_key)?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let query = CityQuery::parse(&city);
    let series = orchestrator
        .fetch_one(&query)
        .await
        .with_context(|| format!("Failed to fetch weather for {query}"))?;

    let city_report = CityReport::build(&series);
    print!("{}", render::city_text(&city_report, &series));
    Ok(())
}

/// `"London, Paris:FR"` -> `["London", "Paris,FR"]`.
fn parse_city_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|c| c.trim().replace(':', ","))
        .filter(|c| !c.is_empty())
        .collect()
}
