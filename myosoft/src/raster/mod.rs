//! In-memory multi-channel images and the built-in file/threshold/geometry
//! adapters that work on them.

pub mod histogram;
pub mod preview;
pub mod tiff_store;
pub mod transform;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::Calibration;
use crate::geometry::Polygon;

/// 1-based channel number, the way operators count channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(u8);

impl Channel {
    pub const MAX: u8 = 5;
    pub const FIRST: Channel = Channel(1);

    pub fn new(number: u8) -> Option<Channel> {
        (1..=Self::MAX).contains(&number).then_some(Channel(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Channel {channel} does not exist, the image has {count} channel(s)")]
    ChannelOutOfRange { channel: usize, count: usize },
    #[error("Plane holds {actual} samples, expected {expected}")]
    PlaneSize { expected: usize, actual: usize },
    #[error("Image has no channels")]
    NoChannels,
    #[error("Unsupported sample layout: {0}")]
    UnsupportedSamples(String),
    #[error("I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TIFF codec error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("PNG encoding error: {0}")]
    Png(#[from] png::EncodingError),
}

pub type RasterResult<T> = Result<T, RasterError>;

/// Summary of the samples of one channel under an ROI mask.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl ChannelStats {
    pub fn from_samples<It>(samples: It) -> ChannelStats
    where
        It: IntoIterator<Item = f64>,
    {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in samples {
            count += 1;
            sum += value;
            sum_sq += value * value;
            min = min.min(value);
            max = max.max(value);
        }

        if count == 0 {
            return ChannelStats::default();
        }

        let n = count as f64;
        let mean = sum / n;
        let std_dev = if count > 1 {
            ((sum_sq - sum * sum / n) / (n - 1.0)).max(0.0).sqrt()
        } else {
            0.0
        };

        ChannelStats {
            count,
            mean,
            std_dev,
            min,
            max,
        }
    }
}

/// Samples an image channel under an ROI outline.
pub trait ChannelSampler {
    fn channel_stats(&self, channel: Channel, outline: &Polygon) -> RasterResult<ChannelStats>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RasterImage {
    title: String,
    width: usize,
    height: usize,
    planes: Vec<Vec<f32>>,
    calibration: Calibration,
}

impl RasterImage {
    pub fn new(title: impl Into<String>, width: usize, height: usize) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            planes: Vec::new(),
            calibration: Calibration::default(),
        }
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_channel(mut self, plane: Vec<f32>) -> RasterResult<Self> {
        self.push_channel(plane)?;
        Ok(self)
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    pub fn push_channel(&mut self, plane: Vec<f32>) -> RasterResult<()> {
        let expected = self.width * self.height;
        if plane.len() != expected {
            return Err(RasterError::PlaneSize {
                expected,
                actual: plane.len(),
            });
        }
        self.planes.push(plane);
        Ok(())
    }

    pub fn plane(&self, channel: Channel) -> RasterResult<&[f32]> {
        self.planes
            .get(channel.index())
            .map(Vec::as_slice)
            .ok_or(RasterError::ChannelOutOfRange {
                channel: channel.number() as usize,
                count: self.planes.len(),
            })
    }

    pub fn planes(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.planes.iter().map(Vec::as_slice)
    }

    /// Copies one channel into a new single-channel image.
    pub fn duplicate_channel(
        &self,
        channel: Channel,
        title: impl Into<String>,
    ) -> RasterResult<RasterImage> {
        let plane = self.plane(channel)?.to_vec();
        Ok(RasterImage {
            title: title.into(),
            width: self.width,
            height: self.height,
            planes: vec![plane],
            calibration: self.calibration.clone(),
        })
    }

    pub fn delete_channel(&mut self, channel: Channel) -> RasterResult<()> {
        if channel.index() >= self.planes.len() {
            return Err(RasterError::ChannelOutOfRange {
                channel: channel.number() as usize,
                count: self.planes.len(),
            });
        }
        self.planes.remove(channel.index());
        Ok(())
    }

    /// True when every sample is an integer in `0..=255`.
    pub fn is_8bit(&self) -> bool {
        self.planes
            .iter()
            .flatten()
            .all(|&v| v.fract() == 0.0 && (0.0..=255.0).contains(&v))
    }
}

impl ChannelSampler for RasterImage {
    fn channel_stats(&self, channel: Channel, outline: &Polygon) -> RasterResult<ChannelStats> {
        let plane = self.plane(channel)?;
        let stats = ChannelStats::from_samples(
            outline
                .covered_pixels(self.width, self.height)
                .into_iter()
                .map(|(x, y)| plane[y * self.width + x] as f64),
        );
        Ok(stats)
    }
}
