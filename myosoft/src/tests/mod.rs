mod fiber_typing_tests;
mod identify_fibers_tests;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail};

use crate::archive::SerdeRoiArchive;
use crate::calibration::Calibration;
use crate::raster::tiff_store::TiffStore;
use crate::raster::{Channel, RasterImage};
use crate::roi::RoiSet;
use crate::services::{
    AutoThresholder, FilterOp, FilterService, ParticleDetector, ParticleGates, PixelClassifier,
    RoiArchive,
};
use crate::threshold::{ThresholdBounds, ThresholdMethod};

/// Writes a multi-channel TIFF named `raw.tif` into `dir`.
pub(crate) fn write_image(
    dir: &Path,
    width: usize,
    height: usize,
    planes: Vec<Vec<f32>>,
    calibration: Calibration,
) -> anyhow::Result<PathBuf> {
    let mut image = RasterImage::new("raw", width, height).with_calibration(calibration);
    for plane in planes {
        image.push_channel(plane)?;
    }
    let path = dir.join("raw.tif");
    TiffStore::write(&image, &path)?;
    Ok(path)
}

pub(crate) fn write_rois(dir: &Path, rois: &RoiSet) -> anyhow::Result<PathBuf> {
    let path = dir.join("fibers.yml");
    SerdeRoiArchive::default().save(rois, &path)?;
    Ok(path)
}

pub(crate) fn read_rois(path: &Path) -> anyhow::Result<RoiSet> {
    SerdeRoiArchive::default().load(path)
}

/// Header and rows of an exported results table.
pub(crate) fn read_csv(path: &Path) -> anyhow::Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|record| -> anyhow::Result<Vec<String>> {
            Ok(record?.iter().map(str::to_string).collect())
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok((header, rows))
}

/// Values of one column of an exported results table.
pub(crate) fn csv_column(path: &Path, name: &str) -> anyhow::Result<Vec<String>> {
    let (header, rows) = read_csv(path)?;
    let index = header
        .iter()
        .position(|column| column == name)
        .ok_or_else(|| anyhow!("no column {name} in {}", path.display()))?;
    Ok(rows.into_iter().map(|row| row[index].clone()).collect())
}

/// Plane of `width * height` pixels set to `foreground` inside `squares`.
pub(crate) fn plane_with_squares(
    width: usize,
    height: usize,
    background: f32,
    foreground: f32,
    squares: &[(usize, usize, usize)],
) -> Vec<f32> {
    let mut plane = vec![background; width * height];
    for &(x0, y0, size) in squares {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                plane[y * width + x] = foreground;
            }
        }
    }
    plane
}

#[derive(Debug)]
pub(crate) struct FixedThreshold(pub f64);

impl AutoThresholder for FixedThreshold {
    fn threshold(
        &self,
        _image: &RasterImage,
        _channel: Channel,
        _method: ThresholdMethod,
    ) -> anyhow::Result<ThresholdBounds> {
        Ok(ThresholdBounds {
            lower: self.0,
            upper: 255.0,
        })
    }
}

#[derive(Debug)]
pub(crate) struct FailingThreshold;

impl AutoThresholder for FailingThreshold {
    fn threshold(
        &self,
        _image: &RasterImage,
        _channel: Channel,
        method: ThresholdMethod,
    ) -> anyhow::Result<ThresholdBounds> {
        bail!("{method} histogram is empty")
    }
}

/// Counts the filter steps it is asked to run, leaves pixels alone.
#[derive(Debug, Default)]
pub(crate) struct CountingFilters {
    pub applied: Arc<AtomicUsize>,
}

impl FilterService for CountingFilters {
    fn apply(&self, _image: &mut RasterImage, _op: &FilterOp) -> anyhow::Result<()> {
        self.applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Returns a background class followed by the input channel.
#[derive(Debug, Default)]
pub(crate) struct TwoClassClassifier;

impl PixelClassifier for TwoClassClassifier {
    fn classify(
        &self,
        model: &Path,
        image: &RasterImage,
        tiling: u32,
    ) -> anyhow::Result<RasterImage> {
        if !model.is_file() || tiling == 0 {
            bail!("cannot classify with {}", model.display());
        }
        let plane = image.plane(Channel::FIRST)?.to_vec();
        let background = vec![0.0; plane.len()];
        Ok(RasterImage::new("classes", image.width(), image.height())
            .with_channel(background)?
            .with_channel(plane)?)
    }
}

#[derive(Debug)]
pub(crate) struct FailingClassifier;

impl PixelClassifier for FailingClassifier {
    fn classify(
        &self,
        _model: &Path,
        _image: &RasterImage,
        _tiling: u32,
    ) -> anyhow::Result<RasterImage> {
        bail!("not enough memory for 1 tile")
    }
}

/// Reports the same particles for every mask.
#[derive(Debug)]
pub(crate) struct FixedParticles(pub RoiSet);

impl ParticleDetector for FixedParticles {
    fn detect(&self, _mask: &RasterImage, gates: &ParticleGates) -> anyhow::Result<RoiSet> {
        if gates.exclude_edges {
            bail!("edge exclusion is not supported");
        }
        Ok(self.0.clone())
    }
}
