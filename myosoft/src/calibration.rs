use std::fmt;

use serde::{Deserialize, Serialize};

/// Spatial calibration of an image. An uncalibrated image measures in pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Calibration {
    #[default]
    Uncalibrated,
    Scaled {
        pixel_width: f64,
        pixel_height: f64,
        unit: String,
    },
}

impl Calibration {
    pub fn scaled(pixel_width: f64, pixel_height: f64, unit: impl Into<String>) -> Self {
        Calibration::Scaled {
            pixel_width,
            pixel_height,
            unit: unit.into(),
        }
    }

    pub fn is_scaled(&self) -> bool {
        matches!(self, Calibration::Scaled { .. })
    }

    pub fn pixel_width(&self) -> f64 {
        match self {
            Calibration::Uncalibrated => 1.0,
            Calibration::Scaled { pixel_width, .. } => *pixel_width,
        }
    }

    pub fn pixel_height(&self) -> f64 {
        match self {
            Calibration::Uncalibrated => 1.0,
            Calibration::Scaled { pixel_height, .. } => *pixel_height,
        }
    }

    pub fn unit(&self) -> &str {
        match self {
            Calibration::Uncalibrated => "pixel",
            Calibration::Scaled { unit, .. } => unit,
        }
    }

    /// Converts a physical distance into pixels along x.
    pub fn distance_to_pixels(&self, distance: f64) -> f64 {
        distance / self.pixel_width()
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Calibration::Uncalibrated => write!(f, "uncalibrated"),
            Calibration::Scaled {
                pixel_width,
                pixel_height,
                unit,
            } => write!(f, "{pixel_width} x {pixel_height} {unit}/pixel"),
        }
    }
}
