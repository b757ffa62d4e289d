//! Size and shape descriptors of an ROI outline ("area perimeter shape
//! feret's" measurement set).

use std::f64::consts::PI;

use glam::DVec2;

use crate::calibration::Calibration;
use crate::geometry::Polygon;

pub const MEASUREMENT_COLUMNS: [&str; 11] = [
    "Area",
    "Perim.",
    "Circ.",
    "Feret",
    "FeretX",
    "FeretY",
    "FeretAngle",
    "MinFeret",
    "AR",
    "Round",
    "Solidity",
];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Morphometry {
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
    pub feret: f64,
    /// Start point of the maximum caliper, in pixels.
    pub feret_x: f64,
    pub feret_y: f64,
    /// Degrees in `[0, 180)`, counter-clockwise from the x axis with y up.
    pub feret_angle: f64,
    pub min_feret: f64,
    pub aspect_ratio: f64,
    pub roundness: f64,
    pub solidity: f64,
}

impl Morphometry {
    pub fn measure(outline: &Polygon, calibration: &Calibration) -> Morphometry {
        let scale = DVec2::new(calibration.pixel_width(), calibration.pixel_height());
        let scaled = outline.map(|v| v * scale);

        let area = scaled.area();
        let perimeter = scaled.perimeter();
        let circularity = if perimeter > 0.0 {
            (4.0 * PI * area / (perimeter * perimeter)).min(1.0)
        } else {
            0.0
        };

        let hull = scaled.convex_hull();
        let hull_area = hull.area();
        let solidity = if hull_area > 0.0 {
            (area / hull_area).min(1.0)
        } else {
            0.0
        };

        let (feret, start, feret_angle) = max_caliper(hull.vertices());
        let min_feret = min_caliper(hull.vertices());
        let (aspect_ratio, roundness) = ellipse_shape(&scaled, area);

        Morphometry {
            area,
            perimeter,
            circularity,
            feret,
            feret_x: start.x / scale.x,
            feret_y: start.y / scale.y,
            feret_angle,
            min_feret,
            aspect_ratio,
            roundness,
            solidity,
        }
    }

    /// Values in the order of [`MEASUREMENT_COLUMNS`].
    pub fn values(&self) -> [f64; 11] {
        [
            self.area,
            self.perimeter,
            self.circularity,
            self.feret,
            self.feret_x,
            self.feret_y,
            self.feret_angle,
            self.min_feret,
            self.aspect_ratio,
            self.roundness,
            self.solidity,
        ]
    }
}

fn max_caliper(hull: &[DVec2]) -> (f64, DVec2, f64) {
    let mut best = (0.0, hull.first().copied().unwrap_or(DVec2::ZERO), 0.0);

    for (i, &a) in hull.iter().enumerate() {
        for &b in hull[i + 1..].iter() {
            let distance = a.distance(b);
            if distance > best.0 {
                let (start, end) = if (a.x, a.y) <= (b.x, b.y) { (a, b) } else { (b, a) };
                // image rows grow downwards
                let mut angle = (start.y - end.y).atan2(end.x - start.x).to_degrees();
                if angle < 0.0 {
                    angle += 180.0;
                }
                if angle >= 180.0 {
                    angle -= 180.0;
                }
                best = (distance, start, angle);
            }
        }
    }

    best
}

fn min_caliper(hull: &[DVec2]) -> f64 {
    if hull.len() < 3 {
        return 0.0;
    }

    let n = hull.len();
    (0..n)
        .filter_map(|i| {
            let a = hull[i];
            let edge = hull[(i + 1) % n] - a;
            let length = edge.length();
            if length < common::EPSILON {
                return None;
            }
            let width = hull
                .iter()
                .map(|&p| (edge.perp_dot(p - a) / length).abs())
                .fold(0.0, f64::max);
            Some(width)
        })
        .fold(f64::INFINITY, f64::min)
}

/// Aspect ratio and roundness of the ellipse sharing the outline's second
/// moments, rescaled to the outline's area.
fn ellipse_shape(outline: &Polygon, area: f64) -> (f64, f64) {
    let Some(m) = outline.moments() else {
        return (0.0, 0.0);
    };

    let half_trace = (m.mu20 + m.mu02) * 0.5;
    let spread = (((m.mu20 - m.mu02) * 0.5).powi(2) + m.mu11 * m.mu11).sqrt();
    let lambda_major = half_trace + spread;
    let lambda_minor = half_trace - spread;
    if lambda_minor <= 0.0 {
        return (0.0, 0.0);
    }

    let mut major = 4.0 * lambda_major.sqrt();
    let mut minor = 4.0 * lambda_minor.sqrt();
    let fit = (area / (PI * 0.25 * major * minor)).sqrt();
    major *= fit;
    minor *= fit;

    (
        (major / minor).max(1.0),
        (4.0 * area / (PI * major * major)).min(1.0),
    )
}
