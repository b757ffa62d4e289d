//! Quality-control preview: contrast-stretched channel composite with the ROI
//! outlines drawn on top, saved as an RGB PNG.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use glam::DVec2;

use crate::raster::{RasterError, RasterImage, RasterResult};
use crate::roi::RoiSet;
use crate::services::PreviewRenderer;

/// Composite tint of channels 1..=5.
const CHANNEL_TINTS: [[f32; 3]; 5] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

#[derive(Clone, Copy, Debug)]
pub struct PngPreview {
    /// Percentage of pixels saturated by the per-channel stretch.
    pub saturated: f64,
}

impl Default for PngPreview {
    fn default() -> Self {
        Self { saturated: 0.35 }
    }
}

impl PngPreview {
    /// Renders the composite into packed RGB8.
    pub fn compose(&self, image: &RasterImage, rois: &RoiSet) -> Vec<u8> {
        let (width, height) = (image.width(), image.height());
        let mut rgb = vec![0f32; width * height * 3];

        for (index, plane) in image.planes().enumerate() {
            let tint = CHANNEL_TINTS[index % CHANNEL_TINTS.len()];
            let (low, high) = stretch_range(plane, self.saturated);
            let span = (high - low).max(f32::EPSILON);

            for (pixel, &value) in plane.iter().enumerate() {
                let level = ((value - low) / span).clamp(0.0, 1.0);
                for c in 0..3 {
                    rgb[pixel * 3 + c] += level * tint[c];
                }
            }
        }

        let mut pixels: Vec<u8> = rgb
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();

        let frame = DVec2::new(width as f64, height as f64);
        for roi in rois {
            let color = roi.color.rgb();
            for (a, b) in roi.outline.edges() {
                if let Some((a, b)) = clip_segment(a, b, frame) {
                    draw_line(&mut pixels, width, height, a, b, color);
                }
            }
        }

        pixels
    }

    pub fn write(&self, image: &RasterImage, rois: &RoiSet, path: &Path) -> RasterResult<()> {
        if image.channel_count() == 0 {
            return Err(RasterError::NoChannels);
        }

        let pixels = self.compose(image, rois);
        let file = File::create(path).map_err(|source| RasterError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut encoder = png::Encoder::new(
            BufWriter::new(file),
            image.width() as u32,
            image.height() as u32,
        );
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&pixels)?;
        writer.finish()?;

        Ok(())
    }
}

impl PreviewRenderer for PngPreview {
    fn render(&self, image: &RasterImage, rois: &RoiSet, path: &Path) -> anyhow::Result<()> {
        Ok(self.write(image, rois, path)?)
    }

    fn extension(&self) -> &str {
        "png"
    }
}

/// Display range leaving `saturated` percent of the pixels outside, split
/// evenly between both tails.
fn stretch_range(plane: &[f32], saturated: f64) -> (f32, f32) {
    if plane.is_empty() {
        return (0.0, 0.0);
    }

    let mut sorted = plane.to_vec();
    sorted.sort_by(f32::total_cmp);
    let tail = ((sorted.len() as f64 * saturated / 200.0) as usize).min(sorted.len() - 1);
    (sorted[tail], sorted[sorted.len() - 1 - tail])
}

/// Liang-Barsky clip of `from -> to` against `[0, frame.x] x [0, frame.y]`.
/// Segments outside the frame, or not representable in `f64`, give `None`.
fn clip_segment(from: DVec2, to: DVec2, frame: DVec2) -> Option<(DVec2, DVec2)> {
    let delta = to - from;
    if !from.is_finite() || !delta.is_finite() {
        return None;
    }

    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    let boundaries = [
        (-delta.x, from.x),
        (delta.x, frame.x - from.x),
        (-delta.y, from.y),
        (delta.y, frame.y - from.y),
    ];
    for (p, q) in boundaries {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    Some((from + delta * t0, from + delta * t1))
}

fn draw_line(
    pixels: &mut [u8],
    width: usize,
    height: usize,
    from: DVec2,
    to: DVec2,
    color: [u8; 3],
) {
    let (mut x0, mut y0) = (from.x.floor() as i64, from.y.floor() as i64);
    let (x1, y1) = (to.x.floor() as i64, to.y.floor() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 >= 0 && y0 >= 0 && (x0 as usize) < width && (y0 as usize) < height {
            let offset = (y0 as usize * width + x0 as usize) * 3;
            pixels[offset..offset + 3].copy_from_slice(&color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
