//! Upstream pressure source and the One Call parsing boundary.

use async_trait::async_trait;
use barowatch_core::error::weather_error_for_status;
use barowatch_core::{ForecastStep, ReqwestErrorExt, UpstreamConfig, WeatherError};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use crate::types::{Coordinate, PressureReading, PressureSeries};

const USER_AGENT: &str = concat!("barowatch/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 200;

/// Anything that can produce a raw pressure series for a coordinate.
#[async_trait]
pub trait PressureSource: Send + Sync {
    async fn fetch_series(&self, coordinate: Coordinate) -> Result<PressureSeries, WeatherError>;

    /// Spacing of the returned readings; decides the forecast window.
    fn step(&self) -> ForecastStep {
        ForecastStep::Hourly
    }
}

/// OpenWeatherMap One Call client.
pub struct OpenWeatherProvider {
    client: Client,
    base_url: String,
    api_key: String,
    step: ForecastStep,
}

impl std::fmt::Debug for OpenWeatherProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("step", &self.step)
            .finish()
    }
}

impl OpenWeatherProvider {
    /// Build a provider; a missing or placeholder key is rejected up front.
    pub fn new(config: &UpstreamConfig) -> Result<Self, WeatherError> {
        if !config.has_api_key() {
            return Err(WeatherError::MisconfiguredCredentials(
                "no OpenWeatherMap API key configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| e.into_weather_error())?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
            step: config.step,
        })
    }
}

#[async_trait]
impl PressureSource for OpenWeatherProvider {
    #[instrument(skip(self), level = "debug")]
    async fn fetch_series(&self, coordinate: Coordinate) -> Result<PressureSeries, WeatherError> {
        tracing::debug!(
            "Requesting {} for {},{}",
            self.base_url,
            coordinate.latitude,
            coordinate.longitude
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("exclude", "minutely,daily,alerts".to_string()),
                ("units", "metric".to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            // The request URL carries the key.
            .map_err(|e| e.without_url().into_weather_error())?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text: String = text.chars().take(MAX_ERROR_BODY).collect();
            tracing::debug!("One Call returned status {}", status);
            return Err(weather_error_for_status(status.as_u16(), &text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| e.without_url().into_weather_error())?;

        parse_one_call(&body)
    }

    fn step(&self) -> ForecastStep {
        self.step
    }
}

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    timezone_offset: i32,
    current: Option<OneCallPoint>,
    #[serde(default)]
    hourly: Vec<OneCallPoint>,
}

#[derive(Debug, Deserialize)]
struct OneCallPoint {
    dt: i64,
    pressure: Option<f64>,
}

impl OneCallPoint {
    fn reading(&self) -> Result<PressureReading, WeatherError> {
        match self.pressure {
            Some(p) if p.is_finite() && p > 0.0 => Ok(PressureReading::new(self.dt, p)),
            _ => Err(WeatherError::InsufficientData(format!(
                "missing or invalid pressure at {}",
                self.dt
            ))),
        }
    }
}

/// Validate a One Call body into a `PressureSeries`.
///
/// Readings are the current observation followed by hourly entries after
/// it. `previous` is the latest hourly entry at or before the current time.
pub fn parse_one_call(body: &str) -> Result<PressureSeries, WeatherError> {
    let parsed: OneCallResponse = serde_json::from_str(body)
        .map_err(|e| WeatherError::InsufficientData(format!("malformed One Call body: {}", e)))?;

    let current = parsed
        .current
        .as_ref()
        .ok_or_else(|| WeatherError::InsufficientData("missing current observation".to_string()))?
        .reading()?;

    let mut hourly = parsed
        .hourly
        .iter()
        .map(OneCallPoint::reading)
        .collect::<Result<Vec<_>, _>>()?;
    hourly.sort_by_key(|r| r.timestamp_seconds);

    let previous = hourly
        .iter()
        .rev()
        .find(|r| r.timestamp_seconds <= current.timestamp_seconds)
        .copied();

    let mut readings = Vec::with_capacity(hourly.len() + 1);
    readings.push(current);
    readings.extend(
        hourly
            .into_iter()
            .filter(|r| r.timestamp_seconds > current.timestamp_seconds),
    );

    let mut series = PressureSeries::new(readings).with_utc_offset(parsed.timezone_offset);
    series.previous = previous;
    Ok(series)
}
