use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};
use weather_core::{CityQuery, Config};

/// Settings stored on disk.
///
/// Example TOML:
/// ```toml
/// default_cities = ["London", "Paris,FR"]
///
/// [weather]
/// api_key = "..."
/// unit_system = "metric"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub default_cities: Vec<String>,
    pub weather: Config,
}

impl Settings {
    /// Load settings from the platform config dir, or defaults on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save settings, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-report", "weather-report")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Core config with the API key override applied, if any.
    pub fn resolve(&self, api_key: Option<String>) -> Result<Config> {
        let mut config = self.weather.clone();
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            config.api_key = key;
        }

        config.validate().map_err(|e| {
            anyhow!(
                "{e}\nHint: run `weather-report configure` \
                 or pass --api-key / set OPENWEATHER_API_KEY."
            )
        })?;

        Ok(config)
    }

    /// Explicit cities win; otherwise the configured defaults.
    pub fn cities_or_default(&self, cities: &[String]) -> Result<Vec<CityQuery>> {
        let source = if cities.is_empty() { &self.default_cities } else { cities };

        let queries: Vec<CityQuery> = source
            .iter()
            .map(|c| CityQuery::parse(c))
            .filter(|q| !q.name().is_empty())
            .collect();

        if queries.is_empty() {
            return Err(anyhow!(
                "No cities given and no default cities configured.\n\
                 Hint: pass cities, e.g. `weather-report report London Paris,FR`."
            ));
        }
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weather_core::UnitSystem;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.weather.api_key = "KEY".into();
        settings.weather.unit_system = UnitSystem::Imperial;
        settings.default_cities = vec!["London".into(), "Paris,FR".into()];

        settings.save_to(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_cities = [\"Oslo\"]\n[weather]\nttl_seconds = 60\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(settings.default_cities, vec!["Oslo".to_string()]);
        assert_eq!(settings.weather.ttl_seconds, 60);
        assert_eq!(settings.weather.max_concurrency, 4);
    }

    #[test]
    fn garbage_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "not = [valid").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn flag_key_overrides_file_key() {
        let mut settings = Settings::default();
        settings.weather.api_key = "FILE".into();

        assert_eq!(settings.resolve(Some("FLAG".into())).unwrap().api_key, "FLAG");
        assert_eq!(settings.resolve(None).unwrap().api_key, "FILE");
    }

    #[test]
    fn resolve_without_any_key_fails_with_hint() {
        let err = Settings::default().resolve(None).unwrap_err();
        assert!(err.to_string().contains("weather-report configure"));
    }

    #[test]
    fn explicit_cities_win_over_defaults() {
        let settings = Settings {
            default_cities: vec!["Oslo".into()],
            ..Settings::default()
        };

        let explicit = settings.cities_or_default(&["Paris,FR".into()]).unwrap();
        assert_eq!(explicit, vec![CityQuery::new("Paris").with_country("FR")]);

        let fallback = settings.cities_or_default(&[]).unwrap();
        assert_eq!(fallback, vec![CityQuery::new("Oslo")]);

        assert!(Settings::default().cities_or_default(&[]).is_err());
    }
}
