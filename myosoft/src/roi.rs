//! Regions of interest and ordered ROI collections.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::geometry::Polygon;
use crate::selection::Selection;

/// Display color of an ROI, named the way the host names them.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RoiColor {
    Red,
    Magenta,
    Green,
    #[default]
    Yellow,
    White,
    Blue,
    Black,
    Orange,
    Cyan,
}

impl RoiColor {
    /// Packed ARGB value as a signed 32-bit integer.
    pub fn argb(&self) -> i32 {
        match self {
            RoiColor::Red => -65536,
            RoiColor::Magenta => -65281,
            RoiColor::Green => -16711936,
            RoiColor::Yellow => -256,
            RoiColor::White => -1,
            RoiColor::Blue => -16776961,
            RoiColor::Black => -16777216,
            RoiColor::Orange => -14336,
            RoiColor::Cyan => -16711681,
        }
    }

    pub fn from_argb(argb: i32) -> Option<RoiColor> {
        use strum::IntoEnumIterator;
        RoiColor::iter().find(|color| color.argb() == argb)
    }

    pub fn rgb(&self) -> [u8; 3] {
        let argb = self.argb() as u32;
        [(argb >> 16) as u8, (argb >> 8) as u8, argb as u8]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub name: String,
    #[serde(default)]
    pub color: RoiColor,
    pub outline: Polygon,
}

impl Roi {
    pub fn new(name: impl Into<String>, outline: Polygon) -> Self {
        Self {
            name: name.into(),
            color: RoiColor::default(),
            outline,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoiError {
    #[error("ROI index {index} is out of range for a collection of {len} ROIs")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type RoiResult<T> = Result<T, RoiError>;

/// Ordered ROI collection. Index `i` is the stable identity of an ROI for the
/// duration of a run; display names are `i + 1` after [`RoiSet::relabel`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoiSet {
    rois: Vec<Roi>,
}

impl RoiSet {
    pub fn new(rois: Vec<Roi>) -> Self {
        Self { rois }
    }

    /// Builds a set from bare outlines, named `1..=n`.
    pub fn from_outlines<It>(outlines: It) -> Self
    where
        It: IntoIterator<Item = Polygon>,
    {
        let mut set = Self::new(
            outlines
                .into_iter()
                .map(|outline| Roi::new(String::new(), outline))
                .collect(),
        );
        set.relabel();
        set
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Roi> {
        self.rois.iter()
    }
    pub fn get(&self, index: usize) -> Option<&Roi> {
        self.rois.get(index)
    }

    /// Every index of the collection.
    pub fn all(&self) -> Selection {
        Selection::from_iter(0..self.rois.len())
    }

    /// Renames every ROI to its 1-based position.
    pub fn relabel(&mut self) {
        for (index, roi) in self.rois.iter_mut().enumerate() {
            roi.name = (index + 1).to_string();
        }
    }

    /// Maps every outline through `transform`, keeping order, names and colors.
    /// The first failing transform aborts the whole rebuild.
    pub fn transform_all<F, E>(&self, mut transform: F) -> Result<RoiSet, E>
    where
        F: FnMut(&Polygon) -> Result<Polygon, E>,
    {
        let rois = self
            .rois
            .iter()
            .map(|roi| {
                Ok(Roi {
                    name: roi.name.clone(),
                    color: roi.color,
                    outline: transform(&roi.outline)?,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;

        Ok(RoiSet { rois })
    }

    pub fn recolor_all(&mut self, color: RoiColor) {
        for roi in self.rois.iter_mut() {
            roi.color = color;
        }
    }

    pub fn recolor(&mut self, selection: &Selection, color: RoiColor) -> RoiResult<()> {
        self.check(selection)?;
        for index in selection.iter() {
            self.rois[index].color = color;
        }
        Ok(())
    }

    /// Copies the selected ROIs, in index order, into a new set.
    pub fn subset(&self, selection: &Selection) -> RoiResult<RoiSet> {
        self.check(selection)?;
        Ok(RoiSet {
            rois: selection.iter().map(|index| self.rois[index].clone()).collect(),
        })
    }

    pub fn colors(&self) -> Vec<RoiColor> {
        self.rois.iter().map(|roi| roi.color).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rois.iter().map(|roi| roi.name.as_str()).collect()
    }

    fn check(&self, selection: &Selection) -> RoiResult<()> {
        match selection.max() {
            Some(index) if index >= self.rois.len() => Err(RoiError::IndexOutOfRange {
                index,
                len: self.rois.len(),
            }),
            _ => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a RoiSet {
    type Item = &'a Roi;
    type IntoIter = std::slice::Iter<'a, Roi>;

    fn into_iter(self) -> Self::IntoIter {
        self.rois.iter()
    }
}

impl FromIterator<Roi> for RoiSet {
    fn from_iter<T: IntoIterator<Item = Roi>>(iter: T) -> Self {
        RoiSet::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::str::FromStr;

    use glam::DVec2;
    use strum::IntoEnumIterator;

    use super::*;

    fn squares(count: usize) -> RoiSet {
        RoiSet::from_outlines(
            (0..count).map(|i| Polygon::rectangle(i as f64 * 10.0, 0.0, 5.0, 5.0)),
        )
    }

    #[test]
    fn argb_codes_round_trip() {
        for color in RoiColor::iter() {
            assert_eq!(RoiColor::from_argb(color.argb()), Some(color));
        }
        assert_eq!(RoiColor::from_argb(0x12345678), None);
        assert_eq!(RoiColor::Orange.rgb(), [255, 200, 0]);
        assert_eq!(RoiColor::Cyan.rgb(), [0, 255, 255]);
    }

    #[test]
    fn color_names_are_lowercase() {
        assert_eq!(RoiColor::Magenta.to_string(), "magenta");
        assert_eq!(RoiColor::from_str("orange").unwrap(), RoiColor::Orange);
    }

    #[test]
    fn relabel_uses_one_based_positions() {
        let mut set = squares(3);
        set.rois.swap(0, 2);
        set.relabel();
        assert_eq!(set.names(), vec!["1", "2", "3"]);
    }

    #[test]
    fn transform_all_preserves_length_and_order() {
        let set = squares(5);
        let shifted = set
            .transform_all(|outline| {
                Ok::<_, Infallible>(outline.map(|v| v + DVec2::new(0.0, 100.0)))
            })
            .unwrap();

        assert_eq!(shifted.len(), set.len());
        for (before, after) in set.iter().zip(shifted.iter()) {
            assert_eq!(before.name, after.name);
            assert_eq!(before.outline.area(), after.outline.area());
            assert_eq!(before.outline.vertices()[0].x, after.outline.vertices()[0].x);
        }
    }

    #[test]
    fn transform_all_stops_on_first_failure() {
        let set = squares(4);
        let mut calls = 0;
        let result: Result<RoiSet, &str> = set.transform_all(|outline| {
            calls += 1;
            if calls == 2 {
                Err("degenerate outline")
            } else {
                Ok(outline.clone())
            }
        });
        assert_eq!(result.unwrap_err(), "degenerate outline");
        assert_eq!(calls, 2);
    }

    #[test]
    fn recolor_and_subset_respect_selection() {
        let mut set = squares(4);
        set.recolor_all(RoiColor::Blue);
        let selection = Selection::from_iter([1, 3]);
        set.recolor(&selection, RoiColor::Magenta).unwrap();

        assert_eq!(
            set.colors(),
            vec![
                RoiColor::Blue,
                RoiColor::Magenta,
                RoiColor::Blue,
                RoiColor::Magenta
            ]
        );

        let subset = set.subset(&selection).unwrap();
        assert_eq!(subset.names(), vec!["2", "4"]);
    }

    #[test]
    fn out_of_range_selection_is_rejected() {
        let mut set = squares(2);
        let selection = Selection::from_iter([0, 2]);
        assert_eq!(
            set.recolor(&selection, RoiColor::Red),
            Err(RoiError::IndexOutOfRange { index: 2, len: 2 })
        );
        assert!(set.subset(&selection).is_err());
    }
}
