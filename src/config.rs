//! Configuration management for the Clairity service
//!
//! Handles loading configuration from an optional TOML file and environment
//! variables, and validates the result once at startup. The loaded value is
//! immutable and handed to the components that need it.

use std::collections::HashSet;
use std::path::PathBuf;

use ::config::{Config, Environment, File, FileFormat};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ClairityError;

/// Root configuration structure for the Clairity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClairityConfig {
    /// WAQI API configuration
    #[serde(default)]
    pub waqi: WaqiConfig,
    /// Historical lookback configuration
    #[serde(default)]
    pub history: HistoryConfig,
    /// Cities in processing order
    #[serde(default = "default_cities")]
    pub cities: Vec<CityConfig>,
    /// Optional local sensor store
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// WAQI API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaqiConfig {
    /// API token appended to every request
    #[serde(default = "default_waqi_token")]
    pub token: String,
    /// Base URL of the station feed
    #[serde(default = "default_feed_base_url")]
    pub feed_base_url: String,
    /// Base URL of the historical timeseries API
    #[serde(default = "default_timeseries_base_url")]
    pub timeseries_base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_waqi_timeout")]
    pub timeout_seconds: u32,
    /// Retries of transient failures per request
    #[serde(default)]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Days of history fed to the trend model
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

/// One configured city
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityConfig {
    /// Key of the city in the aggregate response
    pub key: String,
    /// External station identifier; unused for aliases
    #[serde(default)]
    pub code: String,
    /// Display name
    pub name: String,
    /// Key of an earlier city whose result this one mirrors
    #[serde(default)]
    pub alias_of: Option<String>,
}

impl CityConfig {
    pub fn new(key: &str, code: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            alias_of: None,
        }
    }

    pub fn alias(key: &str, name: &str, target: &str) -> Self {
        Self {
            key: key.to_string(),
            code: String::new(),
            name: name.to_string(),
            alias_of: Some(target.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of the fjall sensor database
    pub path: Option<String>,
    /// City key whose data comes from the store instead of the feed
    pub city: Option<String>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// OTLP/HTTP endpoint for span export
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

// Default value functions
fn default_waqi_token() -> String {
    "demo".to_string()
}

fn default_feed_base_url() -> String {
    "https://api.waqi.info/feed".to_string()
}

fn default_timeseries_base_url() -> String {
    "https://api.waqi.info/api/timeseries".to_string()
}

fn default_waqi_timeout() -> u32 {
    10
}

fn default_lookback_days() -> u32 {
    30
}

fn default_cities() -> Vec<CityConfig> {
    vec![
        CityConfig::new("mexico", "mexico", "Ciudad de México"),
        CityConfig::new("monterrey", "monterrey", "Monterrey"),
        CityConfig::new("guadalajara", "guadalajara", "Guadalajara"),
        CityConfig::new("queretaro", "guanajuato", "Querétaro"),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for WaqiConfig {
    fn default() -> Self {
        Self {
            token: default_waqi_token(),
            feed_base_url: default_feed_base_url(),
            timeseries_base_url: default_timeseries_base_url(),
            timeout_seconds: default_waqi_timeout(),
            max_retries: 0,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            otlp_endpoint: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ClairityConfig {
    fn default() -> Self {
        Self {
            waqi: WaqiConfig::default(),
            history: HistoryConfig::default(),
            cities: default_cities(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl ClairityConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var("CLAIRITY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("clairity.toml"));
        Self::load_from_path(path)
    }

    /// Load configuration from the specified path
    pub fn load_from_path(config_file: PathBuf) -> Result<Self> {
        let mut builder = Config::builder();

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        // Environment overrides such as CLAIRITY_WAQI__TOKEN
        builder = builder.add_source(
            Environment::with_prefix("CLAIRITY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: ClairityConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        // The deployment platform hands out the port through PORT
        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got '{port}'"))?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_waqi()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        self.validate_cities()?;
        Ok(())
    }

    fn validate_waqi(&self) -> Result<()> {
        if self.waqi.token.trim().is_empty() {
            return Err(ClairityError::config("WAQI token cannot be empty").into());
        }

        for (label, url) in [
            ("feed", &self.waqi.feed_base_url),
            ("timeseries", &self.waqi.timeseries_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ClairityError::config(format!(
                    "WAQI {label} base URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.waqi.timeout_seconds == 0 || self.waqi.timeout_seconds > 120 {
            return Err(
                ClairityError::config("WAQI timeout must be between 1 and 120 seconds").into(),
            );
        }

        if self.waqi.max_retries > 5 {
            return Err(ClairityError::config("WAQI max retries cannot exceed 5").into());
        }

        if self.history.lookback_days == 0 || self.history.lookback_days > 365 {
            return Err(
                ClairityError::config("History lookback must be between 1 and 365 days").into(),
            );
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(ClairityError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(ClairityError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        Ok(())
    }

    fn validate_cities(&self) -> Result<()> {
        if self.cities.is_empty() {
            return Err(ClairityError::config("At least one city must be configured").into());
        }

        let mut keys = HashSet::new();
        for city in &self.cities {
            if !keys.insert(city.key.as_str()) {
                return Err(
                    ClairityError::config(format!("Duplicate city key '{}'", city.key)).into(),
                );
            }
            if city.alias_of.is_none() && city.code.trim().is_empty() {
                return Err(ClairityError::config(format!(
                    "City '{}' needs a station code or an alias target",
                    city.key
                ))
                .into());
            }
        }

        if self.store.path.is_some() && self.store.city.is_none() {
            return Err(
                ClairityError::config("store.path is set but store.city is missing").into(),
            );
        }

        if let Some(store_city) = &self.store.city {
            if self.store.path.is_none() {
                return Err(
                    ClairityError::config("store.city is set but store.path is missing").into(),
                );
            }
            let bound = self
                .cities
                .iter()
                .find(|city| &city.key == store_city)
                .ok_or_else(|| {
                    ClairityError::config(format!("Store city '{store_city}' is not configured"))
                })?;
            if bound.alias_of.is_some() {
                return Err(ClairityError::config(format!(
                    "Store city '{store_city}' cannot be an alias"
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Aliases that cannot be resolved in declaration order.
    ///
    /// The aggregator skips such aliases at runtime; this lists them so tests
    /// and startup logs can point at the offending entries.
    #[must_use]
    pub fn alias_problems(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut problems = Vec::new();

        for city in &self.cities {
            if let Some(target) = &city.alias_of {
                if !seen.contains(target.as_str()) {
                    let reason = if self.cities.iter().any(|c| &c.key == target) {
                        "is declared after it"
                    } else {
                        "is not configured"
                    };
                    problems.push(format!(
                        "alias '{}' points at '{}', which {}",
                        city.key, target, reason
                    ));
                }
            }
            seen.insert(city.key.as_str());
        }

        problems
    }

    /// Address the HTTP server binds to
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
