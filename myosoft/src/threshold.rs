use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Relaxation applied to the automatic "Default" threshold before it is used
/// as the nucleus intensity threshold. Tuned empirically; keep the literal.
pub const NUCLEUS_THRESHOLD_RELAXATION: f64 = 0.524;

/// Named auto-threshold methods understood by the threshold service.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
pub enum ThresholdMethod {
    #[default]
    Default,
    Mean,
    MaxEntropy,
}

/// Threshold range in intensity units, dark-background convention.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBounds {
    pub lower: f64,
    pub upper: f64,
}

/// Operator supplied intensity threshold. Serialised as a plain number where
/// `0` asks for automatic detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum IntensityThreshold {
    #[default]
    Auto,
    Fixed(f64),
}

impl IntensityThreshold {
    pub fn is_auto(&self) -> bool {
        matches!(self, IntensityThreshold::Auto)
    }

    pub fn fixed(&self) -> Option<f64> {
        match self {
            IntensityThreshold::Auto => None,
            IntensityThreshold::Fixed(value) => Some(*value),
        }
    }
}

impl From<f64> for IntensityThreshold {
    fn from(value: f64) -> Self {
        if value == 0.0 {
            IntensityThreshold::Auto
        } else {
            IntensityThreshold::Fixed(value)
        }
    }
}

impl From<IntensityThreshold> for f64 {
    fn from(value: IntensityThreshold) -> Self {
        value.fixed().unwrap_or(0.0)
    }
}

impl fmt::Display for IntensityThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntensityThreshold::Auto => write!(f, "auto"),
            IntensityThreshold::Fixed(value) => write!(f, "{value}"),
        }
    }
}

/// Scales the lower bound of the "Default" method into the nucleus threshold.
///
/// The factor is applied in per-mille so integral lower bounds land on the
/// nearest representable value (`100` gives exactly `52.4`).
pub fn relax_nucleus_threshold(lower: f64) -> f64 {
    lower * (NUCLEUS_THRESHOLD_RELAXATION * 1000.0) / 1000.0
}
