//! Pressure severity classification.
//!
//! Two delta policies coexist and are selected by configuration, never
//! blended: an hPa delta with an absolute-level fallback, and a percent
//! delta without one. A single snapshot is always classified with one policy.

use barowatch_core::{ClassificationConfig, ClassificationMode};

use crate::types::{ChangeUnit, SeverityTier};

/// hPa delta defaults
pub const ABSOLUTE_HIGH_HPA: f64 = 3.0;
pub const ABSOLUTE_LOW_HPA: f64 = 1.5;

/// Absolute level defaults
pub const DANGER_LEVEL_HPA: f64 = 1005.0;
pub const CAUTION_LEVEL_HPA: f64 = 1010.0;

/// Symmetric percent defaults
pub const PERCENT_HIGH: f64 = 3.0;
pub const PERCENT_LOW: f64 = 1.5;

/// Falling-only percent defaults
pub const FALLING_PERCENT_HIGH: f64 = 2.0;
pub const FALLING_PERCENT_LOW: f64 = 1.0;

/// Which sign of a percent change counts toward escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaDirection {
    /// Compare `|change|` against the thresholds.
    Either,
    /// Only drops escalate: `change <= -threshold`.
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassificationPolicy {
    /// `change = current - reference` in hPa. Below both thresholds the
    /// absolute level decides.
    AbsoluteDelta {
        high: f64,
        low: f64,
        danger_level: f64,
        caution_level: f64,
    },
    /// `change = (current - reference) / reference * 100`. Insufficient
    /// change is always Stable.
    PercentDelta {
        high: f64,
        low: f64,
        direction: DeltaDirection,
    },
    /// Absolute level only; the reference is ignored.
    AbsoluteLevel { danger_level: f64, caution_level: f64 },
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::absolute_delta()
    }
}

impl ClassificationPolicy {
    pub fn absolute_delta() -> Self {
        Self::AbsoluteDelta {
            high: ABSOLUTE_HIGH_HPA,
            low: ABSOLUTE_LOW_HPA,
            danger_level: DANGER_LEVEL_HPA,
            caution_level: CAUTION_LEVEL_HPA,
        }
    }

    pub fn percent_symmetric() -> Self {
        Self::PercentDelta {
            high: PERCENT_HIGH,
            low: PERCENT_LOW,
            direction: DeltaDirection::Either,
        }
    }

    pub fn percent_falling() -> Self {
        Self::PercentDelta {
            high: FALLING_PERCENT_HIGH,
            low: FALLING_PERCENT_LOW,
            direction: DeltaDirection::Falling,
        }
    }

    pub fn absolute_level() -> Self {
        Self::AbsoluteLevel {
            danger_level: DANGER_LEVEL_HPA,
            caution_level: CAUTION_LEVEL_HPA,
        }
    }

    /// Build the configured policy, applying any threshold overrides.
    pub fn from_config(config: &ClassificationConfig) -> Self {
        let mut policy = match config.mode {
            ClassificationMode::AbsoluteDelta => Self::absolute_delta(),
            ClassificationMode::PercentSymmetric => Self::percent_symmetric(),
            ClassificationMode::PercentFalling => Self::percent_falling(),
            ClassificationMode::AbsoluteLevel => Self::absolute_level(),
        };

        match &mut policy {
            Self::AbsoluteDelta {
                high,
                low,
                danger_level,
                caution_level,
            } => {
                *high = config.high_threshold.unwrap_or(*high);
                *low = config.low_threshold.unwrap_or(*low);
                *danger_level = config.danger_level.unwrap_or(*danger_level);
                *caution_level = config.caution_level.unwrap_or(*caution_level);
            }
            Self::PercentDelta { high, low, .. } => {
                *high = config.high_threshold.unwrap_or(*high);
                *low = config.low_threshold.unwrap_or(*low);
            }
            Self::AbsoluteLevel {
                danger_level,
                caution_level,
            } => {
                *danger_level = config.danger_level.unwrap_or(*danger_level);
                *caution_level = config.caution_level.unwrap_or(*caution_level);
            }
        }

        policy
    }

    /// Unit of the values returned by `change`
    pub fn change_unit(&self) -> ChangeUnit {
        match self {
            Self::PercentDelta { .. } => ChangeUnit::Percent,
            Self::AbsoluteDelta { .. } | Self::AbsoluteLevel { .. } => ChangeUnit::Hpa,
        }
    }

    /// Change from `reference` to `current` in this policy's unit.
    ///
    /// A zero reference yields no percent change.
    pub fn change(&self, current: f64, reference: f64) -> f64 {
        match self {
            Self::PercentDelta { .. } => {
                if reference == 0.0 {
                    0.0
                } else {
                    (current - reference) / reference * 100.0
                }
            }
            Self::AbsoluteDelta { .. } | Self::AbsoluteLevel { .. } => current - reference,
        }
    }

    /// Classify `current` against `reference`.
    pub fn classify(&self, current: f64, reference: f64) -> SeverityTier {
        self.classify_change(current, self.change(current, reference))
    }

    /// Classify `current` given a precomputed change in this policy's unit.
    pub fn classify_change(&self, current: f64, change: f64) -> SeverityTier {
        match *self {
            Self::AbsoluteDelta {
                high,
                low,
                danger_level,
                caution_level,
            } => {
                let magnitude = change.abs();
                if magnitude >= high {
                    SeverityTier::Danger
                } else if magnitude >= low {
                    SeverityTier::Caution
                } else {
                    classify_level(current, danger_level, caution_level)
                }
            }
            Self::PercentDelta {
                high,
                low,
                direction,
            } => {
                let escalation = match direction {
                    DeltaDirection::Either => change.abs(),
                    DeltaDirection::Falling => -change,
                };
                if escalation >= high {
                    SeverityTier::Danger
                } else if escalation >= low {
                    SeverityTier::Caution
                } else {
                    SeverityTier::Stable
                }
            }
            Self::AbsoluteLevel {
                danger_level,
                caution_level,
            } => classify_level(current, danger_level, caution_level),
        }
    }
}

/// Level check: Danger below `danger_level`, Caution below `caution_level`.
pub fn classify_level(current: f64, danger_level: f64, caution_level: f64) -> SeverityTier {
    if current < danger_level {
        SeverityTier::Danger
    } else if current < caution_level {
        SeverityTier::Caution
    } else {
        SeverityTier::Stable
    }
}

/// Classify a current/reference pair with `policy`.
pub fn classify(current: f64, reference: f64, policy: &ClassificationPolicy) -> SeverityTier {
    policy.classify(current, reference)
}
