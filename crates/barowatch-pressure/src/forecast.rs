//! Raw series → classified forecast.

use barowatch_core::{ClassificationConfig, LookDirection, WeatherError};
use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::classify::ClassificationPolicy;
use crate::types::{
    ForecastPoint, PressureSeries, SeverityTier, WeatherSnapshot, CURRENT_LABEL,
    MAX_FORECAST_POINTS,
};

/// Converts an upstream series into a `WeatherSnapshot`.
///
/// One policy and one look direction apply to the whole sequence.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ForecastTransformer {
    policy: ClassificationPolicy,
    look: LookDirection,
}

impl ForecastTransformer {
    pub fn new(policy: ClassificationPolicy, look: LookDirection) -> Self {
        Self { policy, look }
    }

    pub fn from_config(config: &ClassificationConfig) -> Self {
        Self::new(ClassificationPolicy::from_config(config), config.look_direction)
    }

    pub fn policy(&self) -> &ClassificationPolicy {
        &self.policy
    }

    pub fn look_direction(&self) -> LookDirection {
        self.look
    }

    /// Transform at most `window_size` leading readings.
    ///
    /// Point 0 is compared with point 1 when looking ahead, or with the
    /// series' `previous` reading when looking behind. Without a partner its
    /// change is 0. Every later point is compared with the one before it.
    /// Changes are taken between rounded pressures.
    pub fn transform(
        &self,
        series: &PressureSeries,
        window_size: usize,
        produced_at: DateTime<Utc>,
    ) -> Result<WeatherSnapshot, WeatherError> {
        if series.is_empty() {
            return Err(WeatherError::InsufficientData(
                "upstream returned an empty pressure series".to_string(),
            ));
        }

        let window = window_size.clamp(1, MAX_FORECAST_POINTS);
        let readings = &series.readings[..series.len().min(window)];

        if let Some(bad) = readings.iter().find(|r| !r.pressure_hpa.is_finite()) {
            return Err(WeatherError::InsufficientData(format!(
                "non-numeric pressure at {}",
                bad.timestamp_seconds
            )));
        }

        let offset = FixedOffset::east_opt(series.utc_offset_seconds).unwrap_or_else(|| Utc.fix());
        let rounded: Vec<f64> = readings.iter().map(|r| r.pressure_hpa.round()).collect();

        let (current_change, current_tier) = self.classify_current(series, &rounded);
        let mut forecast = Vec::with_capacity(readings.len());
        forecast.push(ForecastPoint {
            label: CURRENT_LABEL.to_string(),
            pressure_hpa: rounded[0] as i32,
            tier: current_tier,
        });

        for i in 1..readings.len() {
            let change = self.policy.change(rounded[i], rounded[i - 1]);
            forecast.push(ForecastPoint {
                label: hour_label(readings[i].timestamp_seconds, &offset)?,
                pressure_hpa: rounded[i] as i32,
                tier: self.policy.classify_change(rounded[i], change),
            });
        }

        tracing::debug!(
            points = forecast.len(),
            tier = %current_tier,
            change = current_change,
            "Transformed pressure series"
        );

        Ok(WeatherSnapshot {
            pressure_hpa: rounded[0] as i32,
            pressure_change: round_to_tenth(current_change),
            change_unit: self.policy.change_unit(),
            tier: current_tier,
            forecast,
            produced_at,
            served_from_cache: false,
            degraded: false,
        })
    }

    fn classify_current(
        &self,
        series: &PressureSeries,
        rounded: &[f64],
    ) -> (f64, SeverityTier) {
        let current = rounded[0];
        let change = match self.look {
            LookDirection::Ahead => rounded
                .get(1)
                .map(|next| self.policy.change(*next, current)),
            LookDirection::Behind => series
                .previous
                .map(|prev| self.policy.change(current, prev.pressure_hpa.round())),
        }
        .unwrap_or(0.0);

        (change, self.policy.classify_change(current, change))
    }
}

/// "HH:00" in the series' local offset
fn hour_label(timestamp_seconds: i64, offset: &FixedOffset) -> Result<String, WeatherError> {
    let time = DateTime::from_timestamp(timestamp_seconds, 0).ok_or_else(|| {
        WeatherError::InsufficientData(format!("invalid timestamp {}", timestamp_seconds))
    })?;
    Ok(time.with_timezone(offset).format("%H:00").to_string())
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
