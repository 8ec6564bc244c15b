//! Configuration loading.
//!
//! Values are layered: built-in defaults, then the TOML file given with
//! `--config`, then environment variables, then command-line flags. The
//! merged result is validated before any work starts.

use std::path::{Path, PathBuf};

use accident_harvest_models::config::HarvestConfig;

/// Environment variable overriding the upstream proxy.
pub const PROXY_ENV: &str = "ACCIDENT_HARVEST_PROXY";

/// Environment variable overriding the staging database path.
pub const DATABASE_ENV: &str = "ACCIDENT_HARVEST_DB";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Could not read config {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`HarvestConfig`].
    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Parses a TOML document. Missing values take their defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the document is malformed.
pub fn from_toml_str(toml_str: &str) -> Result<HarvestConfig, ConfigError> {
    Ok(toml::from_str(toml_str)?)
}

/// Loads the file at `path`, or the defaults when no path is given.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load_file(path: Option<&Path>) -> Result<HarvestConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(HarvestConfig::default());
    };

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    log::debug!("Loaded config from {}", path.display());
    from_toml_str(&contents)
}

/// Applies environment overrides using `lookup` to read variables.
pub fn apply_env(config: &mut HarvestConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(proxy) = lookup(PROXY_ENV).filter(|v| !v.trim().is_empty()) {
        config.proxy = Some(proxy);
    }

    if let Some(db) = lookup(DATABASE_ENV).filter(|v| !v.trim().is_empty()) {
        config.database_path = PathBuf::from(db);
    }
}

/// Settings given on the command line. Unset fields keep the value from
/// the lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub proxy: Option<String>,
    pub database_path: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, config: &mut HarvestConfig) {
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(proxy) = self.proxy {
            config.proxy = Some(proxy);
        }
        if let Some(database_path) = self.database_path {
            config.database_path = database_path;
        }
    }
}

fn check_range(name: &str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::Invalid(format!(
            "{name}: minimum {min} is greater than maximum {max}"
        )));
    }
    Ok(())
}

fn check_years(name: &str, start: i32, end: i32) -> Result<(), ConfigError> {
    if start > end {
        return Err(ConfigError::Invalid(format!(
            "{name}: start year {start} is after end year {end}"
        )));
    }
    Ok(())
}

/// Checks that every bound pair is ordered and the probability is in range.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the first offending value.
pub fn validate(config: &HarvestConfig) -> Result<(), ConfigError> {
    check_range("delay", config.delay.min_ms, config.delay.max_ms)?;
    check_range(
        "delay.long_pause",
        config.delay.long_pause_min_ms,
        config.delay.long_pause_max_ms,
    )?;
    check_range("cool_down", config.cool_down.min_ms, config.cool_down.max_ms)?;

    let p = config.delay.long_pause_probability;
    if !(0.0..=1.0).contains(&p) {
        return Err(ConfigError::Invalid(format!(
            "delay.long_pause_probability must be within [0, 1], got {p}"
        )));
    }

    check_years(
        "aviation_safety",
        config.aviation_safety.start_year,
        config.aviation_safety.end_year,
    )?;
    check_years("ntsb", config.ntsb.start_year, config.ntsb.end_year)?;

    if config.aviation_safety.timeout_secs == 0 || config.ntsb.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "request timeouts must be at least one second".to_owned(),
        ));
    }

    if !config.aviation_safety.listing_path.contains("{page}") {
        return Err(ConfigError::Invalid(
            "aviation_safety.listing_path must contain a {page} placeholder".to_owned(),
        ));
    }

    Ok(())
}

/// Loads, layers and validates the configuration.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file is unreadable or the merged values
/// are invalid.
pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<HarvestConfig, ConfigError> {
    let mut config = load_file(path)?;
    apply_env(&mut config, |key| std::env::var(key).ok());
    overrides.apply(&mut config);
    validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use accident_harvest_models::config::ResumeGranularity;

    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = from_toml_str("").unwrap();
        assert_eq!(config, HarvestConfig::default());
        assert_eq!(config.aviation_safety.resume, ResumeGranularity::Run);
        assert_eq!(config.ntsb.resume, ResumeGranularity::Window);
        assert_eq!(config.delay.min_ms, 200);
        assert_eq!(config.cool_down.max_ms, 20_000);
    }

    #[test]
    fn partial_document_overrides_only_given_values() {
        let config = from_toml_str(
            r#"
output_dir = "out"

[aviation_safety]
start_year = 2015
end_year = 2016
resume = "window"

[delay]
min_ms = 0
max_ms = 0
long_pause_probability = 0.0
"#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.aviation_safety.start_year, 2015);
        assert_eq!(config.aviation_safety.resume, ResumeGranularity::Window);
        assert_eq!(config.aviation_safety.detail_marker, "/wikibase/");
        assert_eq!(config.delay.max_ms, 0);
        assert_eq!(config.ntsb.result_set_size, 500);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            from_toml_str("output_dir = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_file_and_flags_override_env() {
        let mut config = from_toml_str(r#"proxy = "http://file:8080""#).unwrap();

        apply_env(&mut config, |key| match key {
            PROXY_ENV => Some("http://env:8080".to_owned()),
            DATABASE_ENV => Some("env.duckdb".to_owned()),
            _ => None,
        });
        assert_eq!(config.proxy.as_deref(), Some("http://env:8080"));
        assert_eq!(config.database_path, PathBuf::from("env.duckdb"));

        Overrides {
            proxy: Some("http://flag:8080".to_owned()),
            ..Overrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.proxy.as_deref(), Some("http://flag:8080"));
        assert_eq!(config.database_path, PathBuf::from("env.duckdb"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = HarvestConfig::default();
        apply_env(&mut config, |_| Some("  ".to_owned()));
        assert_eq!(config.proxy, None);
        assert_eq!(config.database_path, PathBuf::from("data/staging.duckdb"));
    }

    #[test]
    fn defaults_are_valid() {
        validate(&HarvestConfig::default()).unwrap();
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut config = HarvestConfig::default();
        config.delay.min_ms = 900;
        config.delay.max_ms = 100;
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));

        let mut config = HarvestConfig::default();
        config.ntsb.start_year = 2030;
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));

        let mut config = HarvestConfig::default();
        config.delay.long_pause_probability = 1.5;
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_file(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
