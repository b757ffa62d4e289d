use anyhow::bail;
use glam::DVec2;

use crate::geometry::Polygon;
use crate::services::RoiTransformer;

/// Geometric ROI transforms on polygon outlines.
#[derive(Clone, Copy, Debug)]
pub struct PolygonTransformer {
    /// Longest vertex offset, as a multiple of the enlargement distance.
    pub miter_limit: f64,
}

impl Default for PolygonTransformer {
    fn default() -> Self {
        Self { miter_limit: 4.0 }
    }
}

impl RoiTransformer for PolygonTransformer {
    /// Offsets every vertex along the bisector of its two outward edge
    /// normals. Negative distances shrink the outline.
    fn enlarge(&self, outline: &Polygon, pixels: f64) -> anyhow::Result<Polygon> {
        if outline.len() < 3 {
            bail!("cannot enlarge an outline with {} vertices", outline.len());
        }
        if pixels == 0.0 {
            return Ok(outline.clone());
        }

        // interior lies left of every edge for a positive signed area
        let orientation = outline.signed_area().signum();
        let outward = |edge: DVec2| DVec2::new(edge.y, -edge.x).normalize_or_zero() * orientation;

        let vertices = outline.vertices();
        let n = vertices.len();
        let enlarged = (0..n)
            .map(|i| {
                let v = vertices[i];
                let n1 = outward(v - vertices[(i + n - 1) % n]);
                let n2 = outward(vertices[(i + 1) % n] - v);

                let bisector = (n1 + n2).normalize_or_zero();
                if bisector == DVec2::ZERO {
                    return v + n1 * pixels;
                }
                let cos_half = bisector.dot(n1).max(1.0 / self.miter_limit);
                v + bisector * (pixels / cos_half)
            })
            .collect();

        Ok(Polygon::new(enlarged))
    }

    fn scale(
        &self,
        outline: &Polygon,
        sx: f64,
        sy: f64,
        centered: bool,
    ) -> anyhow::Result<Polygon> {
        if !(sx > 0.0 && sy > 0.0) {
            bail!("scale factors must be positive, got {sx} x {sy}");
        }

        let factor = DVec2::new(sx, sy);
        let center = match outline.bounds() {
            Some(bounds) if centered => bounds.center(),
            _ => DVec2::ZERO,
        };

        Ok(outline.map(|v| center + (v - center) * factor))
    }
}
