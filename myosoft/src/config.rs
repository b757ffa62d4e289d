//! Run configuration of the pipeline variants.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raster::Channel;
use crate::threshold::IntensityThreshold;

pub const PRIMARY_MODEL: &str = "primary.model";
pub const SECONDARY_MODEL: &str = "secondary_central_nuclei.model";
pub const MAX_TILING_FACTOR: u32 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    EmptyPath { field: &'static str },
    #[error("{field} does not exist: {path}")]
    MissingFile { field: &'static str, path: PathBuf },
    #[error("Classifier model not found: {0}")]
    MissingClassifier(PathBuf),
    #[error("{field} = {value} is outside {min}..={max}")]
    ChannelOutOfRange {
        field: &'static str,
        value: u8,
        min: u8,
        max: u8,
    },
    #[error("Channel {channel} ({field}) is not present, the image has {count} channel(s)")]
    ChannelNotInImage {
        field: &'static str,
        channel: Channel,
        count: usize,
    },
    #[error("Tiling factor {0} is outside 1..=8")]
    TilingOutOfRange(u32),
    #[error("{gate} range is inverted: {min}-{max}")]
    InvertedRange {
        gate: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("Failed to load configuration: {0}")]
    Load(#[from] common::FileFormatError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Inclusive gate `[min, max]`; an infinite `max` leaves the gate open.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub const fn open() -> Self {
        Self::new(0.0, f64::INFINITY)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, gate: &'static str) -> ConfigResult<()> {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(ConfigError::InvertedRange {
                gate,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.max.is_infinite() {
            write!(f, "{}-Infinity", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Shape gates of the particle detection, in calibrated units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphometricGates {
    /// Area in unit².
    pub area: Range,
    pub perimeter: Range,
    pub circularity: Range,
    pub roundness: Range,
    pub solidity: Range,
    pub feret_aspect_ratio: Range,
    pub min_feret: Range,
}

impl Default for MorphometricGates {
    fn default() -> Self {
        Self {
            area: Range::new(10.0, 6000.0),
            perimeter: Range::new(5.0, 300.0),
            circularity: Range::new(0.5, 1.0),
            roundness: Range::new(0.2, 1.0),
            solidity: Range::new(0.0, 1.0),
            feret_aspect_ratio: Range::new(0.0, 8.0),
            min_feret: Range::new(0.1, 100.0),
        }
    }
}

impl MorphometricGates {
    pub fn named(&self) -> [(&'static str, Range); 7] {
        [
            ("area", self.area),
            ("perimeter", self.perimeter),
            ("circularity", self.circularity),
            ("roundness", self.roundness),
            ("solidity", self.solidity),
            ("feret_ar", self.feret_aspect_ratio),
            ("min_feret", self.min_feret),
        ]
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.named()
            .iter()
            .try_for_each(|(gate, range)| range.validate(gate))
    }
}

/// Segmentation of fiber outlines from the membrane staining.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyFibersConfig {
    pub image: PathBuf,
    pub output_dir: PathBuf,
    /// Directory holding the primary and secondary classifier models.
    pub classifiers_dir: PathBuf,
    pub gates: MorphometricGates,
    /// ROI expansion in calibrated units (pixels when uncalibrated).
    pub expansion: f64,
    pub membrane_channel: u8,
    /// MHC staining channel, `0` skips fiber positivity.
    pub fiber_channel: u8,
    pub min_fiber_intensity: IntensityThreshold,
    /// Tiles per dimension for the classifier, bounds its memory use.
    pub tiling_factor: u32,
}

impl Default for IdentifyFibersConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::new(),
            output_dir: PathBuf::new(),
            classifiers_dir: PathBuf::new(),
            gates: MorphometricGates::default(),
            expansion: 1.0,
            membrane_channel: 1,
            fiber_channel: 3,
            min_fiber_intensity: IntensityThreshold::Auto,
            tiling_factor: 4,
        }
    }
}

impl IdentifyFibersConfig {
    pub fn primary_model(&self) -> PathBuf {
        self.classifiers_dir.join(PRIMARY_MODEL)
    }

    pub fn secondary_model(&self) -> PathBuf {
        self.classifiers_dir.join(SECONDARY_MODEL)
    }

    pub fn membrane(&self) -> ConfigResult<Channel> {
        required_channel("membrane_channel", self.membrane_channel)
    }

    pub fn fiber(&self) -> ConfigResult<Option<Channel>> {
        optional_channel("fiber_channel", self.fiber_channel)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        existing_file("image", &self.image)?;
        non_empty("output_dir", &self.output_dir)?;
        non_empty("classifiers_dir", &self.classifiers_dir)?;
        for model in [self.primary_model(), self.secondary_model()] {
            if !model.is_file() {
                return Err(ConfigError::MissingClassifier(model));
            }
        }

        self.gates.validate()?;
        if self.expansion.is_nan() || self.expansion < 0.0 {
            return Err(ConfigError::Negative {
                field: "expansion",
                value: self.expansion,
            });
        }
        self.membrane()?;
        self.fiber()?;
        if !(1..=MAX_TILING_FACTOR).contains(&self.tiling_factor) {
            return Err(ConfigError::TilingOutOfRange(self.tiling_factor));
        }
        Ok(())
    }

    pub fn check_channels(&self, count: usize) -> ConfigResult<()> {
        present("membrane_channel", self.membrane()?, count)?;
        if let Some(fiber) = self.fiber()? {
            present("fiber_channel", fiber, count)?;
        }
        Ok(())
    }
}

/// Counting fibers with centralized nuclei inside shrunk fiber outlines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralNucleiConfig {
    pub image: PathBuf,
    /// Fiber ROI archive produced by fiber identification.
    pub rois: PathBuf,
    pub output_dir: PathBuf,
    /// Linear factor applied to every outline before looking for nuclei.
    pub shrink: f64,
    pub nucleus_channel: u8,
    pub min_nucleus_intensity: IntensityThreshold,
}

impl Default for CentralNucleiConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::new(),
            rois: PathBuf::new(),
            output_dir: PathBuf::new(),
            shrink: 0.7,
            nucleus_channel: 3,
            min_nucleus_intensity: IntensityThreshold::Auto,
        }
    }
}

impl CentralNucleiConfig {
    pub fn nucleus(&self) -> ConfigResult<Channel> {
        required_channel("nucleus_channel", self.nucleus_channel)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        existing_file("image", &self.image)?;
        existing_file("rois", &self.rois)?;
        non_empty("output_dir", &self.output_dir)?;
        if self.shrink.is_nan() || self.shrink <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "shrink",
                value: self.shrink,
            });
        }
        self.nucleus()?;
        Ok(())
    }

    pub fn check_channels(&self, count: usize) -> ConfigResult<()> {
        present("nucleus_channel", self.nucleus()?, count)
    }
}

/// Per-channel fiber type positivity and its combinations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiberTypingConfig {
    pub image: PathBuf,
    pub rois: PathBuf,
    pub output_dir: PathBuf,
    /// Channel of each of the three fiber stainings, `0` when not acquired.
    pub fiber_channels: [u8; 3],
    pub min_fiber_intensities: [IntensityThreshold; 3],
}

impl Default for FiberTypingConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::new(),
            rois: PathBuf::new(),
            output_dir: PathBuf::new(),
            fiber_channels: [1, 2, 3],
            min_fiber_intensities: [IntensityThreshold::Auto; 3],
        }
    }
}

impl FiberTypingConfig {
    const FIELDS: [&'static str; 3] = ["fiber_channels[0]", "fiber_channels[1]", "fiber_channels[2]"];

    /// Channel of each slot, `None` for skipped slots.
    pub fn fibers(&self) -> ConfigResult<[Option<Channel>; 3]> {
        let mut channels = [None; 3];
        for (slot, number) in self.fiber_channels.iter().enumerate() {
            channels[slot] = optional_channel(Self::FIELDS[slot], *number)?;
        }
        Ok(channels)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        existing_file("image", &self.image)?;
        existing_file("rois", &self.rois)?;
        non_empty("output_dir", &self.output_dir)?;
        self.fibers()?;
        Ok(())
    }

    pub fn check_channels(&self, count: usize) -> ConfigResult<()> {
        for (slot, channel) in self.fibers()?.iter().enumerate() {
            if let Some(channel) = channel {
                present(Self::FIELDS[slot], *channel, count)?;
            }
        }
        Ok(())
    }
}

/// Re-measuring a manually curated ROI archive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualRerunConfig {
    pub image: PathBuf,
    pub rois: PathBuf,
    pub output_dir: PathBuf,
    pub measurement_channel: u8,
}

impl Default for ManualRerunConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::new(),
            rois: PathBuf::new(),
            output_dir: PathBuf::new(),
            measurement_channel: 1,
        }
    }
}

impl ManualRerunConfig {
    pub fn measurement(&self) -> ConfigResult<Channel> {
        required_channel("measurement_channel", self.measurement_channel)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        existing_file("image", &self.image)?;
        existing_file("rois", &self.rois)?;
        non_empty("output_dir", &self.output_dir)?;
        self.measurement()?;
        Ok(())
    }

    pub fn check_channels(&self, count: usize) -> ConfigResult<()> {
        present("measurement_channel", self.measurement()?, count)
    }
}

/// Reads a YAML or JSON configuration, chosen by file extension.
pub fn load<T>(path: &Path) -> ConfigResult<T>
where
    T: DeserializeOwned + 'static,
{
    Ok(common::read_file(path)?)
}

fn required_channel(field: &'static str, value: u8) -> ConfigResult<Channel> {
    Channel::new(value).ok_or(ConfigError::ChannelOutOfRange {
        field,
        value,
        min: 1,
        max: Channel::MAX,
    })
}

fn optional_channel(field: &'static str, value: u8) -> ConfigResult<Option<Channel>> {
    if value == 0 {
        return Ok(None);
    }
    Channel::new(value)
        .map(Some)
        .ok_or(ConfigError::ChannelOutOfRange {
            field,
            value,
            min: 0,
            max: Channel::MAX,
        })
}

fn present(field: &'static str, channel: Channel, count: usize) -> ConfigResult<()> {
    if channel.index() >= count {
        return Err(ConfigError::ChannelNotInImage {
            field,
            channel,
            count,
        });
    }
    Ok(())
}

fn non_empty(field: &'static str, path: &Path) -> ConfigResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyPath { field });
    }
    Ok(())
}

fn existing_file(field: &'static str, path: &Path) -> ConfigResult<()> {
    non_empty(field, path)?;
    if !path.is_file() {
        return Err(ConfigError::MissingFile {
            field,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
