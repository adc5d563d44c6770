use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label of the first forecast point; never produced by a clock time.
pub const CURRENT_LABEL: &str = "current";

/// Upper bound on forecast points in one snapshot.
pub const MAX_FORECAST_POINTS: usize = 24;

/// Severity of a pressure state, ordered by escalation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    #[default]
    Stable,
    Caution,
    Danger,
}

impl SeverityTier {
    /// Machine label, matching the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Caution => "caution",
            Self::Danger => "danger",
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::Caution => "Caution",
            Self::Danger => "Danger",
        }
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Unit of `WeatherSnapshot::pressure_change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeUnit {
    #[default]
    Hpa,
    Percent,
}

/// One raw upstream reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureReading {
    pub timestamp_seconds: i64,
    pub pressure_hpa: f64,
}

impl PressureReading {
    pub fn new(timestamp_seconds: i64, pressure_hpa: f64) -> Self {
        Self {
            timestamp_seconds,
            pressure_hpa,
        }
    }
}

/// Ordered upstream series for one location.
///
/// `readings[0]` is the current observation. `previous` is the most recent
/// reading before it, when the upstream reports one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PressureSeries {
    pub readings: Vec<PressureReading>,
    pub previous: Option<PressureReading>,
    /// Offset applied when rendering "HH:00" labels
    pub utc_offset_seconds: i32,
}

impl PressureSeries {
    pub fn new(readings: Vec<PressureReading>) -> Self {
        Self {
            readings,
            previous: None,
            utc_offset_seconds: 0,
        }
    }

    pub fn with_previous(mut self, previous: PressureReading) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn with_utc_offset(mut self, seconds: i32) -> Self {
        self.utc_offset_seconds = seconds;
        self
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Geographic coordinate of a region's reference point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Classified forecast entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    /// `CURRENT_LABEL` for the first point, "HH:00" afterwards
    pub label: String,
    pub pressure_hpa: i32,
    pub tier: SeverityTier,
}

impl ForecastPoint {
    pub fn is_current(&self) -> bool {
        self.label == CURRENT_LABEL
    }
}

/// Classified pressure state for a region.
///
/// `forecast[0]` is the current point and mirrors `pressure_hpa` and `tier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub pressure_hpa: i32,
    pub pressure_change: f64,
    pub change_unit: ChangeUnit,
    pub tier: SeverityTier,
    pub forecast: Vec<ForecastPoint>,
    pub produced_at: DateTime<Utc>,
    pub served_from_cache: bool,
    /// Set when an expired entry is served because a refresh failed
    #[serde(default)]
    pub degraded: bool,
}

impl WeatherSnapshot {
    /// The "current" forecast point
    pub fn current(&self) -> Option<&ForecastPoint> {
        self.forecast.first()
    }

    /// Highest tier among the first `points` forecast points
    pub fn worst_tier_within(&self, points: usize) -> SeverityTier {
        self.forecast
            .iter()
            .take(points)
            .map(|p| p.tier)
            .max()
            .unwrap_or(self.tier)
    }

    /// Copy of this snapshot as returned from a cache hit
    pub(crate) fn as_cached(&self) -> Self {
        Self {
            served_from_cache: true,
            ..self.clone()
        }
    }

    /// Form in which a snapshot is stored: no per-response flags
    pub(crate) fn normalized(mut self) -> Self {
        self.served_from_cache = false;
        self.degraded = false;
        self
    }
}

/// Cached snapshot for one region in one tier
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: WeatherSnapshot,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh while `now - stored_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.stored_at) < ttl
    }
}
