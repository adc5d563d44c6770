//! Error types for Barowatch.
//!
//! Client errors (bad region, unusable data) stay distinguishable from
//! transient upstream failures, and every error carries a UI-safe message.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a UI-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Weather(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Failures of the pressure pipeline.
///
/// `Clone` because a single upstream failure is handed to every caller
/// waiting on the same region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    /// The region id is not in the coordinate table. Not retryable.
    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    /// The upstream returned an empty or malformed series.
    #[error("Insufficient pressure data: {0}")]
    InsufficientData(String),

    /// Transport failure, rate limit, 5xx or timeout.
    #[error("Weather upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Missing, placeholder or rejected API key.
    #[error("Weather API credentials misconfigured: {0}")]
    MisconfiguredCredentials(String),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::UnknownRegion(_) => "Region not recognised. Please pick another region.",
            WeatherError::InsufficientData(_) => {
                "Pressure data is unavailable for this region right now."
            }
            WeatherError::UpstreamUnavailable(_) => {
                "Weather service unavailable. Please try again later."
            }
            WeatherError::MisconfiguredCredentials(_) => {
                "Weather API key is invalid. Check settings."
            }
        }
    }

    /// Whether a caller may retry (with backoff) and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WeatherError::UpstreamUnavailable(_))
    }

    /// Whether the caller should change its request rather than retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WeatherError::UnknownRegion(_) | WeatherError::InsufficientData(_)
        )
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_weather_error(self) -> WeatherError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_weather_error(self) -> WeatherError {
        if self.is_timeout() {
            WeatherError::UpstreamUnavailable("request timed out".to_string())
        } else if self.is_decode() {
            WeatherError::InsufficientData(self.to_string())
        } else if let Some(status) = self.status() {
            weather_error_for_status(status.as_u16(), &self.to_string())
        } else {
            WeatherError::UpstreamUnavailable(self.to_string())
        }
    }
}

/// Map a non-success HTTP status from the weather provider to an error.
pub fn weather_error_for_status(status: u16, message: &str) -> WeatherError {
    match status {
        401 | 403 => WeatherError::MisconfiguredCredentials(format!("{} - {}", status, message)),
        _ => WeatherError::UpstreamUnavailable(format!("{} - {}", status, message)),
    }
}
