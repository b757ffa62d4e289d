//! Subsets of an ROI collection and the intensity rules that produce them.

use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::raster::{Channel, ChannelSampler, ChannelStats, RasterResult};
use crate::roi::RoiSet;

/// Standard deviation floor separating a punctate nucleus signal from diffuse
/// background. Tuned empirically; keep the literal value.
pub const CENTRAL_NUCLEUS_MIN_STD_DEV: f64 = 250.0;

/// Zero-based indices into the ROI collection of the current run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeSet<usize>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }
    pub fn insert(&mut self, index: usize) -> bool {
        self.0.insert(index)
    }
    pub fn max(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn intersect(&self, other: &Selection) -> Selection {
        Selection(self.0.intersection(&other.0).copied().collect())
    }
}

impl FromIterator<usize> for Selection {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Selection(iter.into_iter().collect())
    }
}

/// Membership rule applied to the statistics of one ROI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum IntensityRule {
    /// `mean > threshold`
    #[default]
    MeanAbove,
    /// `std_dev > 250 && max > threshold`, for centralized nuclei only.
    CentralNucleus,
}

impl IntensityRule {
    pub fn matches(&self, stats: &ChannelStats, threshold: f64) -> bool {
        match self {
            IntensityRule::MeanAbove => stats.mean > threshold,
            IntensityRule::CentralNucleus => {
                stats.std_dev > CENTRAL_NUCLEUS_MIN_STD_DEV && stats.max > threshold
            }
        }
    }
}

/// Samples `channel` under every ROI and keeps the indices matching `rule`.
pub fn select_by_intensity<S>(
    rois: &RoiSet,
    sampler: &S,
    channel: Channel,
    threshold: f64,
    rule: IntensityRule,
) -> RasterResult<Selection>
where
    S: ChannelSampler + ?Sized,
{
    let mut selection = Selection::new();
    for (index, roi) in rois.iter().enumerate() {
        let stats = sampler.channel_stats(channel, &roi.outline)?;
        if rule.matches(&stats, threshold) {
            selection.insert(index);
        }
    }

    debug!(
        "{rule} on channel {channel} above {threshold}: {} of {} ROIs",
        selection.len(),
        rois.len()
    );

    Ok(selection)
}
