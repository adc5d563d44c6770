//! User-facing alert and advice text for a snapshot.

use serde::{Deserialize, Serialize};

use crate::types::{SeverityTier, WeatherSnapshot};

/// Forecast points inspected for an upcoming danger point, "current" included
pub const ALERT_LOOKAHEAD_POINTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl From<SeverityTier> for RiskLevel {
    fn from(tier: SeverityTier) -> Self {
        match tier {
            SeverityTier::Stable => Self::Low,
            SeverityTier::Caution => Self::Medium,
            SeverityTier::Danger => Self::High,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub risk: RiskLevel,
    pub text: &'static str,
}

/// Headline for the snapshot.
///
/// A current danger wins; otherwise an upcoming danger point within
/// `ALERT_LOOKAHEAD_POINTS` is announced by its label.
pub fn alert_message(snapshot: &WeatherSnapshot) -> String {
    if snapshot.tier == SeverityTier::Danger {
        return if snapshot.pressure_change < 0.0 {
            "Pressure is dropping sharply. Watch out for headaches.".to_string()
        } else {
            "Pressure is rising sharply. Pay attention to how you feel.".to_string()
        };
    }

    let upcoming = snapshot
        .forecast
        .iter()
        .take(ALERT_LOOKAHEAD_POINTS)
        .find(|p| p.tier == SeverityTier::Danger);
    if let Some(point) = upcoming {
        return format!(
            "A sharp pressure change is forecast around {}. Take precautions early.",
            point.label
        );
    }

    match snapshot.tier {
        SeverityTier::Caution => {
            "Pressure is fluctuating. Pay attention to how you feel.".to_string()
        }
        _ => "Pressure is stable. Have a good day.".to_string(),
    }
}

pub fn advice(snapshot: &WeatherSnapshot) -> Advice {
    let risk = RiskLevel::from(snapshot.tier);
    let text = match snapshot.tier {
        SeverityTier::Danger if snapshot.pressure_change < 0.0 => {
            "A large pressure drop is expected. Plan to rest early."
        }
        SeverityTier::Danger => "A large pressure rise is expected. Remember to stay hydrated.",
        SeverityTier::Caution => "Pressure keeps changing. Keep activity within comfortable limits.",
        SeverityTier::Stable => "Pressure is stable. Normal activity is fine.",
    };
    Advice { risk, text }
}
