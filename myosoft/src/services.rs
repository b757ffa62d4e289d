//! External collaborators of a run, modelled as request/response services.
//!
//! Adapters report failures through `anyhow`; the pipeline wraps them with the
//! stage they happened in and never retries.

use std::fmt::Debug;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archive::SerdeRoiArchive;
use crate::calibration::Calibration;
use crate::config::{MorphometricGates, Range};
use crate::geometry::Polygon;
use crate::measure::Morphometry;
use crate::raster::histogram::HistogramThresholder;
use crate::raster::preview::PngPreview;
use crate::raster::tiff_store::TiffStore;
use crate::raster::transform::PolygonTransformer;
use crate::raster::{Channel, RasterImage};
use crate::roi::RoiSet;
use crate::threshold::{ThresholdBounds, ThresholdMethod};

pub trait ImageStore: Debug + Send + Sync {
    fn open(&self, path: &Path) -> anyhow::Result<RasterImage>;
    fn save(&self, image: &RasterImage, path: &Path) -> anyhow::Result<()>;
    fn extension(&self) -> &str;
}

/// One step of an image filter chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Linear stretch saturating `saturated` percent of the pixels.
    EnhanceContrast { saturated: f64 },
    /// Burns the current display range into the pixel values.
    ApplyLut,
    To8Bit,
    Invert,
    Convolve {
        size: usize,
        kernel: Vec<f64>,
        normalize: bool,
    },
    Median { radius: f64 },
    GaussianBlur { sigma: f64 },
    AutoThreshold { method: ThresholdMethod },
}

impl FilterOp {
    /// Chain preparing the membrane channel for pixel classification.
    pub fn membrane_preprocessing() -> Vec<FilterOp> {
        #[rustfmt::skip]
        let kernel = vec![
            -1.0, -1.0, -1.0, -1.0, -1.0,
            -1.0, -1.0, -1.0, -1.0,  0.0,
            -1.0, -1.0, 24.0, -1.0, -1.0,
            -1.0, -1.0, -1.0, -1.0, -1.0,
            -1.0, -1.0, -1.0, -1.0,  0.0,
        ];

        vec![
            FilterOp::EnhanceContrast { saturated: 0.35 },
            FilterOp::ApplyLut,
            FilterOp::EnhanceContrast { saturated: 1.0 },
            FilterOp::To8Bit,
            FilterOp::Invert,
            FilterOp::Convolve {
                size: 5,
                kernel,
                normalize: true,
            },
        ]
    }

    /// Chain turning a class probability map into a binary fiber mask.
    pub fn classifier_postprocessing() -> Vec<FilterOp> {
        vec![
            FilterOp::To8Bit,
            FilterOp::Median { radius: 3.0 },
            FilterOp::GaussianBlur { sigma: 2.0 },
            FilterOp::AutoThreshold {
                method: ThresholdMethod::MaxEntropy,
            },
            FilterOp::Invert,
        ]
    }
}

pub trait FilterService: Debug + Send + Sync {
    fn apply(&self, image: &mut RasterImage, op: &FilterOp) -> anyhow::Result<()>;
}

pub trait PixelClassifier: Debug + Send + Sync {
    /// Returns one channel per learned class.
    fn classify(&self, model: &Path, image: &RasterImage, tiling: u32)
        -> anyhow::Result<RasterImage>;
}

/// Shape filter of the particle detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleGates {
    pub area: Range,
    pub extent: Range,
    pub perimeter: Range,
    pub circularity: Range,
    pub roundness: Range,
    pub solidity: Range,
    pub compactness: Range,
    pub aspect_ratio: Range,
    pub feret_aspect_ratio: Range,
    pub ellipsoid_angle: Range,
    pub max_feret: Range,
    pub min_feret: Range,
    pub feret_angle: Range,
    pub cov: Range,
    /// Gates are in pixels instead of calibrated units.
    pub pixel_units: bool,
    pub exclude_edges: bool,
}

impl ParticleGates {
    pub fn new(gates: &MorphometricGates, calibration: &Calibration) -> Self {
        Self {
            area: gates.area,
            extent: Range::new(0.0, 1.0),
            perimeter: gates.perimeter,
            circularity: gates.circularity,
            roundness: gates.roundness,
            solidity: gates.solidity,
            compactness: Range::new(0.0, 1.0),
            aspect_ratio: Range::open(),
            feret_aspect_ratio: gates.feret_aspect_ratio,
            ellipsoid_angle: Range::new(0.0, 180.0),
            max_feret: Range::open(),
            min_feret: gates.min_feret,
            feret_angle: Range::new(0.0, 180.0),
            cov: Range::new(0.0, 1.0),
            pixel_units: !calibration.is_scaled(),
            exclude_edges: false,
        }
    }

    /// Checks the gates that can be decided from an outline alone.
    pub fn accepts(&self, m: &Morphometry) -> bool {
        let feret_ar = if m.min_feret > 0.0 {
            m.feret / m.min_feret
        } else {
            f64::INFINITY
        };

        self.area.contains(m.area)
            && self.perimeter.contains(m.perimeter)
            && self.circularity.contains(m.circularity)
            && self.roundness.contains(m.roundness)
            && self.solidity.contains(m.solidity)
            && self.aspect_ratio.contains(m.aspect_ratio)
            && self.feret_aspect_ratio.contains(feret_ar)
            && self.max_feret.contains(m.feret)
            && self.min_feret.contains(m.min_feret)
            && self.feret_angle.contains(m.feret_angle)
    }
}

pub trait ParticleDetector: Debug + Send + Sync {
    /// Outlines of the particles of a binary mask passing `gates`, in scan order.
    fn detect(&self, mask: &RasterImage, gates: &ParticleGates) -> anyhow::Result<RoiSet>;
}

pub trait RoiTransformer: Debug + Send + Sync {
    fn enlarge(&self, outline: &Polygon, pixels: f64) -> anyhow::Result<Polygon>;
    /// Scales by `(sx, sy)`, about the outline centre when `centered`.
    fn scale(&self, outline: &Polygon, sx: f64, sy: f64, centered: bool)
        -> anyhow::Result<Polygon>;
}

pub trait AutoThresholder: Debug + Send + Sync {
    fn threshold(
        &self,
        image: &RasterImage,
        channel: Channel,
        method: ThresholdMethod,
    ) -> anyhow::Result<ThresholdBounds>;
}

pub trait RoiArchive: Debug + Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<RoiSet>;
    fn save(&self, rois: &RoiSet, path: &Path) -> anyhow::Result<()>;
    fn extension(&self) -> &str;
}

pub trait PreviewRenderer: Debug + Send + Sync {
    fn render(&self, image: &RasterImage, rois: &RoiSet, path: &Path) -> anyhow::Result<()>;
    fn extension(&self) -> &str;
}

/// Collaborators needed only to segment fibers from raw images.
#[derive(Debug)]
pub struct Segmentation {
    pub filters: Box<dyn FilterService>,
    pub classifier: Box<dyn PixelClassifier>,
    pub detector: Box<dyn ParticleDetector>,
}

/// Everything a run talks to, owned by the caller and lent to the run.
#[derive(Debug)]
pub struct Services {
    pub images: Box<dyn ImageStore>,
    pub archive: Box<dyn RoiArchive>,
    pub thresholder: Box<dyn AutoThresholder>,
    pub transformer: Box<dyn RoiTransformer>,
    pub preview: Box<dyn PreviewRenderer>,
    pub segmentation: Option<Segmentation>,
}

impl Services {
    /// File-based adapters shipped with the crate; no segmentation.
    pub fn builtin() -> Self {
        Self {
            images: Box::new(TiffStore),
            archive: Box::<SerdeRoiArchive>::default(),
            thresholder: Box::new(HistogramThresholder),
            transformer: Box::<PolygonTransformer>::default(),
            preview: Box::<PngPreview>::default(),
            segmentation: None,
        }
    }

    pub fn with_segmentation(mut self, segmentation: Segmentation) -> Self {
        self.segmentation = Some(segmentation);
        self
    }
}
