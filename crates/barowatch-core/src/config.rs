use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable prefix, e.g. `BAROWATCH_CACHE__CLIENT_TTL_MINUTES=10`.
const ENV_PREFIX: &str = "BAROWATCH";

/// Fallback environment variable for the provider key.
const API_KEY_ENV: &str = "OPENWEATHERMAP_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application configuration directory
    #[serde(skip, default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Region used when none is requested explicitly
    pub default_region: String,

    /// Weather provider settings
    pub upstream: UpstreamConfig,

    /// Server and client cache tiers
    pub cache: CacheConfig,

    /// Severity classification policy
    pub classification: ClassificationConfig,

    /// Regions added on top of the built-in prefecture table
    pub regions: Vec<RegionConfig>,
}

/// Time step between upstream forecast points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStep {
    /// One point per hour, 24-point window.
    #[default]
    Hourly,
    /// One point every three hours, 9-point window (24h ahead).
    ThreeHourly,
}

impl ForecastStep {
    /// Number of leading points kept from a series with this step.
    pub fn window_size(&self) -> usize {
        match self {
            ForecastStep::Hourly => 24,
            ForecastStep::ThreeHourly => 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// One Call endpoint
    pub base_url: String,

    /// Provider API key (can be set via OPENWEATHERMAP_API_KEY)
    pub api_key: String,

    /// Upper bound for a single upstream call
    pub timeout_secs: u64,

    /// Step size of the upstream series
    pub step: ForecastStep,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/3.0/onecall".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
            step: ForecastStep::Hourly,
        }
    }
}

impl UpstreamConfig {
    /// Check if a key is configured (not empty or a placeholder)
    pub fn has_api_key(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && !key.starts_with("YOUR_")
    }
}

/// Backing store for the server cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerStore {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Server tier TTL in minutes
    pub server_ttl_minutes: u64,

    /// Client tier TTL in minutes
    pub client_ttl_minutes: u64,

    /// Serve an expired entry (flagged degraded) when a refresh fails transiently
    pub serve_stale_on_error: bool,

    /// Where the server tier keeps its entries
    pub server_store: ServerStore,

    /// SQLite file for `server_store = "sqlite"`; defaults to the config dir
    pub sqlite_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            server_ttl_minutes: 360,
            client_ttl_minutes: 5,
            serve_stale_on_error: false,
            server_store: ServerStore::Memory,
            sqlite_path: None,
        }
    }
}

/// Named classification policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// hPa delta with absolute-level fallback (3 / 1.5 hPa, 1005 / 1010 hPa)
    #[default]
    AbsoluteDelta,
    /// |percent delta| (3% / 1.5%), no level fallback
    PercentSymmetric,
    /// Falling percent delta only (-2% / -1%), no level fallback
    PercentFalling,
    /// Absolute pressure level only (1005 / 1010 hPa)
    AbsoluteLevel,
}

/// Which neighbour the "current" point is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LookDirection {
    /// Compare against the next forecast point ("what's about to happen").
    #[default]
    Ahead,
    /// Compare against the latest reading before the current one ("what just happened").
    Behind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub mode: ClassificationMode,
    pub look_direction: LookDirection,

    /// Overrides for the mode's defaults
    pub high_threshold: Option<f64>,
    pub low_threshold: Option<f64>,
    pub danger_level: Option<f64>,
    pub caution_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("barowatch")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            default_region: "東京都".to_string(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            classification: ClassificationConfig::default(),
            regions: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file, layered under `BAROWATCH_*` variables
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .context("Failed to read config file")?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .context("Failed to parse config file")?;

        if let Some(parent) = path.parent() {
            config.config_dir = parent.to_path_buf();
        }
        config.apply_api_key_env();
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    fn apply_api_key_env(&mut self) {
        if self.upstream.has_api_key() {
            return;
        }
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            self.upstream.api_key = key;
        }
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.upstream.base_url, "upstream.base_url", &mut result);

        if self.upstream.timeout_secs == 0 {
            result.add_error("upstream.timeout_secs", "Timeout must be greater than 0");
        } else if self.upstream.timeout_secs > 120 {
            result.add_warning("upstream.timeout_secs", "Timeout is unusually long (>120s)");
        }

        if !self.upstream.has_api_key() {
            result.add_warning(
                "upstream.api_key",
                "API key not configured - upstream fetches will fail",
            );
        }

        if self.cache.server_ttl_minutes == 0 {
            result.add_error("cache.server_ttl_minutes", "TTL must be greater than 0");
        }
        if self.cache.client_ttl_minutes == 0 {
            result.add_error("cache.client_ttl_minutes", "TTL must be greater than 0");
        }
        if self.cache.client_ttl_minutes > self.cache.server_ttl_minutes {
            result.add_warning(
                "cache.client_ttl_minutes",
                "Client TTL is longer than server TTL",
            );
        }

        self.validate_classification(&mut result);
        self.validate_regions(&mut result);

        if self.default_region.trim().is_empty() {
            result.add_error("default_region", "Default region must not be empty");
        }

        result
    }

    fn validate_classification(&self, result: &mut ValidationResult) {
        let c = &self.classification;
        let thresholds = [
            ("classification.high_threshold", c.high_threshold),
            ("classification.low_threshold", c.low_threshold),
            ("classification.danger_level", c.danger_level),
            ("classification.caution_level", c.caution_level),
        ];
        for (field, value) in thresholds {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    result.add_error(field, "Threshold must be a finite, non-negative number");
                }
            }
        }

        if let (Some(low), Some(high)) = (c.low_threshold, c.high_threshold) {
            if low >= high {
                result.add_error(
                    "classification.low_threshold",
                    "Low threshold must be below high threshold",
                );
            }
        }

        if let (Some(danger), Some(caution)) = (c.danger_level, c.caution_level) {
            if danger > caution {
                result.add_error(
                    "classification.danger_level",
                    "Danger level must not exceed caution level",
                );
            }
        }
    }

    fn validate_regions(&self, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for region in &self.regions {
            let field = format!("regions.{}", region.id);
            if region.id.trim().is_empty() {
                result.add_error("regions", "Region id must not be empty");
            }
            if !seen.insert(region.id.as_str()) {
                result.add_error(field.clone(), "Duplicate region id");
            }
            if !region.latitude.is_finite() || !(-90.0..=90.0).contains(&region.latitude) {
                result.add_error(field.clone(), "Latitude must be within -90..=90");
            }
            if !region.longitude.is_finite() || !(-180.0..=180.0).contains(&region.longitude) {
                result.add_error(field, "Longitude must be within -180..=180");
            }
        }
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// SQLite file used by the server tier when `server_store = "sqlite"`
    pub fn sqlite_path(&self) -> PathBuf {
        self.cache
            .sqlite_path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("weather_cache.db"))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("barowatch");

        Ok(config_dir.join("config.toml"))
    }
}
