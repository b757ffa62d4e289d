//! 256-bin histogram auto-thresholding, dark-background convention.

use crate::raster::{Channel, RasterImage};
use crate::services::AutoThresholder;
use crate::threshold::{ThresholdBounds, ThresholdMethod};

const BINS: usize = 256;

#[derive(Clone, Copy, Debug, Default)]
pub struct HistogramThresholder;

#[derive(Clone, Debug)]
struct Histogram {
    counts: Vec<u64>,
    min: f64,
    max: f64,
    /// 8-bit data, one bin per intensity.
    direct: bool,
}

impl Histogram {
    fn of(plane: &[f32]) -> Histogram {
        let mut counts = vec![0u64; BINS];
        let direct = plane
            .iter()
            .all(|&v| v.fract() == 0.0 && (0.0..=255.0).contains(&v));

        if direct {
            for &v in plane {
                counts[v as usize] += 1;
            }
            return Histogram {
                counts,
                min: 0.0,
                max: 255.0,
                direct,
            };
        }

        let (min, max) = plane
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v as f64), hi.max(v as f64))
            });
        let span = max - min;
        for &v in plane {
            let bin = if span > 0.0 {
                (((v as f64 - min) * BINS as f64 / span) as usize).min(BINS - 1)
            } else {
                0
            };
            counts[bin] += 1;
        }

        Histogram {
            counts,
            min,
            max,
            direct,
        }
    }

    fn value(&self, bin: usize) -> f64 {
        if self.direct {
            bin as f64
        } else {
            self.min + bin as f64 * (self.max - self.min) / BINS as f64
        }
    }

    fn bounds(&self, level: usize) -> ThresholdBounds {
        let lower_bin = (level + 1).min(BINS - 1);
        ThresholdBounds {
            lower: self.value(lower_bin),
            upper: self.max,
        }
    }
}

/// Iterative intermeans ("IJ IsoData"), the host's "Default" method.
fn default_level(counts: &[u64]) -> usize {
    let mut data = counts.to_vec();
    let max_value = data.len() - 1;
    data[0] = 0;
    data[max_value] = 0;

    let mut min = 0;
    while data[min] == 0 && min < max_value {
        min += 1;
    }
    let mut max = max_value;
    while data[max] == 0 && max > 0 {
        max -= 1;
    }
    if min >= max {
        return data.len() / 2;
    }

    let mean_of = |from: usize, to: usize| {
        let (weighted, total) = (from..=to).fold((0.0, 0.0), |(w, t), i| {
            (w + i as f64 * data[i] as f64, t + data[i] as f64)
        });
        weighted / total
    };

    let mut moving = min;
    let mut result;
    loop {
        result = (mean_of(min, moving) + mean_of(moving + 1, max)) / 2.0;
        moving += 1;
        if !((moving + 1) as f64 <= result && moving < max - 1) {
            break;
        }
    }

    result.round() as usize
}

fn mean_level(counts: &[u64]) -> usize {
    let (weighted, total) = counts
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(w, t), (i, &c)| {
            (w + i as f64 * c as f64, t + c as f64)
        });
    if total == 0.0 {
        return 0;
    }
    (weighted / total).floor() as usize
}

/// Kapur-Sahoo-Wong maximum entropy.
fn max_entropy_level(counts: &[u64]) -> usize {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0;
    }

    let norm: Vec<f64> = counts.iter().map(|&c| c as f64 / total as f64).collect();
    let mut p1 = vec![0.0; norm.len()];
    let mut acc = 0.0;
    for (i, n) in norm.iter().enumerate() {
        acc += n;
        p1[i] = acc;
    }
    let p2: Vec<f64> = p1.iter().map(|p| 1.0 - p).collect();

    let first = p1.iter().position(|p| p.abs() >= f64::EPSILON).unwrap_or(0);
    let last = (first..norm.len())
        .rev()
        .find(|&i| p2[i].abs() >= f64::EPSILON)
        .unwrap_or(norm.len() - 1);

    let entropy = |range: std::ops::Range<usize>, p: f64| {
        range
            .filter(|&i| counts[i] != 0)
            .map(|i| {
                let q = norm[i] / p;
                -q * q.ln()
            })
            .sum::<f64>()
    };

    let mut best = None;
    let mut max_entropy = f64::MIN_POSITIVE;
    for t in first..=last {
        let total_entropy = entropy(0..t + 1, p1[t]) + entropy(t + 1..norm.len(), p2[t]);
        if max_entropy < total_entropy {
            max_entropy = total_entropy;
            best = Some(t);
        }
    }

    best.unwrap_or(first)
}

impl HistogramThresholder {
    pub fn level(counts: &[u64], method: ThresholdMethod) -> usize {
        match method {
            ThresholdMethod::Default => default_level(counts),
            ThresholdMethod::Mean => mean_level(counts),
            ThresholdMethod::MaxEntropy => max_entropy_level(counts),
        }
    }
}

impl AutoThresholder for HistogramThresholder {
    fn threshold(
        &self,
        image: &RasterImage,
        channel: Channel,
        method: ThresholdMethod,
    ) -> anyhow::Result<ThresholdBounds> {
        let histogram = Histogram::of(image.plane(channel)?);
        let level = Self::level(&histogram.counts, method);
        let bounds = histogram.bounds(level);

        log::debug!(
            "{method} threshold on channel {channel} of {}: level {level}, {}-{}",
            image.title(),
            bounds.lower,
            bounds.upper
        );

        Ok(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(values: &[f32]) -> RasterImage {
        RasterImage::new("histogram", values.len(), 1)
            .with_channel(values.to_vec())
            .unwrap()
    }

    fn two_levels() -> Vec<f32> {
        let mut values = vec![10.0; 50];
        values.extend(vec![200.0; 50]);
        values
    }

    fn channel() -> Channel {
        Channel::new(1).unwrap()
    }

    #[test]
    fn default_method_splits_two_levels() -> anyhow::Result<()> {
        let bounds =
            HistogramThresholder.threshold(&image(&two_levels()), channel(), ThresholdMethod::Default)?;
        assert_eq!(bounds.lower, 106.0);
        assert_eq!(bounds.upper, 255.0);
        Ok(())
    }

    #[test]
    fn mean_method_uses_floor_of_mean() -> anyhow::Result<()> {
        let mut values = two_levels();
        values.push(101.0);
        // mean = (500 + 10000 + 101) / 101 = 104.96
        let bounds = HistogramThresholder.threshold(&image(&values), channel(), ThresholdMethod::Mean)?;
        assert_eq!(bounds.lower, 105.0);
        Ok(())
    }

    #[test]
    fn default_on_flat_histogram_is_midpoint() {
        let mut counts = vec![0u64; BINS];
        counts[0] = 10;
        counts[255] = 10;
        assert_eq!(HistogramThresholder::level(&counts, ThresholdMethod::Default), 128);
    }

    #[test]
    fn max_entropy_separates_levels() {
        let mut counts = vec![0u64; BINS];
        counts[10] = 30;
        counts[20] = 30;
        counts[200] = 30;
        let level = HistogramThresholder::level(&counts, ThresholdMethod::MaxEntropy);
        assert!((10..200).contains(&level));
    }

    #[test]
    fn float_data_maps_back_to_intensity() -> anyhow::Result<()> {
        let mut values = vec![0.5f32; 10];
        values.extend(vec![2.5f32; 10]);
        let bounds = HistogramThresholder.threshold(&image(&values), channel(), ThresholdMethod::Mean)?;
        // bins 0 and 255, mean bin 127, lower bound at bin 128
        assert_eq!(bounds.lower, 1.5);
        assert_eq!(bounds.upper, 2.5);
        Ok(())
    }
}
