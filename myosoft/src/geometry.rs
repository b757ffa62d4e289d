//! Closed polygons in pixel coordinates.
//!
//! ROI outlines are stored as polygons whose vertices lie on pixel corners
//! (pixel `(x, y)` covers `[x, x + 1) × [y, y + 1)`). A pixel belongs to a
//! polygon when its centre lies inside it.

use glam::DVec2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    vertices: Vec<DVec2>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: DVec2,
    pub max: DVec2,
}

/// Central second moments of a polygon's area, normalised by the area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Moments {
    pub mu20: f64,
    pub mu02: f64,
    pub mu11: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }
}

impl Polygon {
    pub fn new(vertices: Vec<DVec2>) -> Self {
        Self { vertices }
    }

    /// Axis-aligned rectangle with its top-left corner at `(x, y)`.
    pub fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(vec![
            DVec2::new(x, y),
            DVec2::new(x + width, y),
            DVec2::new(x + width, y + height),
            DVec2::new(x, y + height),
        ])
    }

    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }
    pub fn len(&self) -> usize {
        self.vertices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Edges as `(start, end)` pairs, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (DVec2, DVec2)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    pub fn signed_area(&self) -> f64 {
        if self.vertices.len() < 3 {
            return 0.0;
        }
        self.edges().map(|(a, b)| a.perp_dot(b)).sum::<f64>() * 0.5
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn perimeter(&self) -> f64 {
        if self.vertices.len() < 2 {
            return 0.0;
        }
        self.edges().map(|(a, b)| a.distance(b)).sum()
    }

    /// Area centroid; falls back to the vertex mean for degenerate outlines.
    pub fn centroid(&self) -> DVec2 {
        let signed_area = self.signed_area();
        if signed_area.abs() < common::EPSILON {
            if self.vertices.is_empty() {
                return DVec2::ZERO;
            }
            return self.vertices.iter().copied().sum::<DVec2>() / self.vertices.len() as f64;
        }

        let weighted: DVec2 = self
            .edges()
            .map(|(a, b)| (a + b) * a.perp_dot(b))
            .sum();
        weighted / (6.0 * signed_area)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let first = *self.vertices.first()?;
        let bounds = self.vertices.iter().fold(
            Bounds {
                min: first,
                max: first,
            },
            |acc, v| Bounds {
                min: acc.min.min(*v),
                max: acc.max.max(*v),
            },
        );
        Some(bounds)
    }

    /// Even-odd containment test.
    pub fn contains(&self, point: DVec2) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    pub fn map<F>(&self, f: F) -> Polygon
    where
        F: Fn(DVec2) -> DVec2,
    {
        Polygon::new(self.vertices.iter().copied().map(f).collect())
    }

    /// Convex hull by monotone chain, counter-clockwise in a y-up frame.
    pub fn convex_hull(&self) -> Polygon {
        let mut points = self.vertices.clone();
        points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        points.dedup();

        if points.len() < 3 {
            return Polygon::new(points);
        }

        let cross = |o: DVec2, a: DVec2, b: DVec2| (a - o).perp_dot(b - o);

        let mut lower: Vec<DVec2> = Vec::with_capacity(points.len());
        for &p in points.iter() {
            while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0
            {
                lower.pop();
            }
            lower.push(p);
        }

        let mut upper: Vec<DVec2> = Vec::with_capacity(points.len());
        for &p in points.iter().rev() {
            while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0
            {
                upper.pop();
            }
            upper.push(p);
        }

        lower.pop();
        upper.pop();
        lower.extend(upper);
        Polygon::new(lower)
    }

    /// Central second moments of the enclosed area (Green's theorem).
    pub fn moments(&self) -> Option<Moments> {
        let signed_area = self.signed_area();
        if signed_area.abs() < common::EPSILON {
            return None;
        }

        let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
        for (a, b) in self.edges() {
            let c = a.perp_dot(b);
            sxx += (a.x * a.x + a.x * b.x + b.x * b.x) * c;
            syy += (a.y * a.y + a.y * b.y + b.y * b.y) * c;
            sxy += (a.x * b.y + 2.0 * a.x * a.y + 2.0 * b.x * b.y + b.x * a.y) * c;
        }
        let centroid = self.centroid();

        Some(Moments {
            mu20: sxx / (12.0 * signed_area) - centroid.x * centroid.x,
            mu02: syy / (12.0 * signed_area) - centroid.y * centroid.y,
            mu11: sxy / (24.0 * signed_area) - centroid.x * centroid.y,
        })
    }

    /// Pixels of a `width × height` grid whose centres lie inside the polygon.
    pub fn covered_pixels(&self, width: usize, height: usize) -> Vec<(usize, usize)> {
        let mut pixels = Vec::new();
        let Some(bounds) = self.bounds() else {
            return pixels;
        };
        if width == 0 || height == 0 {
            return pixels;
        }

        let y_start = bounds.min.y.floor().max(0.0) as usize;
        let y_end = (bounds.max.y.ceil().max(0.0) as usize).min(height);
        let mut crossings: Vec<f64> = Vec::new();

        for y in y_start..y_end {
            let yc = y as f64 + 0.5;
            crossings.clear();
            for (a, b) in self.edges() {
                if (a.y > yc) != (b.y > yc) {
                    crossings.push(a.x + (yc - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
            crossings.sort_by(f64::total_cmp);

            for span in crossings.chunks_exact(2) {
                let x_from = (span[0] - 0.5).ceil().max(0.0) as usize;
                let x_to = ((span[1] - 0.5).ceil().max(0.0) as usize).min(width);
                pixels.extend((x_from..x_to).map(|x| (x, y)));
            }
        }

        pixels
    }
}

impl From<Vec<DVec2>> for Polygon {
    fn from(vertices: Vec<DVec2>) -> Self {
        Polygon::new(vertices)
    }
}
