use std::path::Path;

use anyhow::Context;
use common::SerdeFormat;
use serde::{Deserialize, Serialize};

use crate::roi::RoiSet;
use crate::services::RoiArchive;

/// ROI archive stored as YAML or JSON: names, colors and outline vertices.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerdeRoiArchive {
    /// Picks the extension of archives the pipeline names. Files are read and
    /// written in the format of their own extension.
    pub format: SerdeFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveFile {
    rois: RoiSet,
}

impl SerdeRoiArchive {
    pub fn new(format: SerdeFormat) -> Self {
        Self { format }
    }
}

impl RoiArchive for SerdeRoiArchive {
    fn load(&self, path: &Path) -> anyhow::Result<RoiSet> {
        let file: ArchiveFile = common::read_file(path)
            .with_context(|| format!("Failed to load ROI archive {}", path.display()))?;
        Ok(file.rois)
    }

    fn save(&self, rois: &RoiSet, path: &Path) -> anyhow::Result<()> {
        common::write_file(path, &ArchiveFile { rois: rois.clone() })
            .with_context(|| format!("Failed to write ROI archive {}", path.display()))
    }

    fn extension(&self) -> &str {
        self.format.extension()
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::geometry::Polygon;
    use crate::roi::{Roi, RoiColor};

    fn sample() -> RoiSet {
        let mut first = Roi::new(
            "1",
            Polygon::new(vec![
                DVec2::new(0.5, 1.25),
                DVec2::new(10.125, 1.0),
                DVec2::new(3.0, 7.75),
            ]),
        );
        first.color = RoiColor::Magenta;
        let second = Roi::new("2", Polygon::rectangle(20.0, 20.0, 5.0, 6.0));
        RoiSet::new(vec![first, second])
    }

    #[test]
    fn archive_round_trips_in_both_formats() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for format in [SerdeFormat::Yaml, SerdeFormat::Json] {
            let archive = SerdeRoiArchive::new(format);
            let path = dir
                .path()
                .join(format!("rois.{}", archive.extension()));

            archive.save(&sample(), &path)?;
            assert_eq!(archive.load(&path)?, sample());
        }
        Ok(())
    }

    #[test]
    fn colors_are_stored_by_name() -> anyhow::Result<()> {
        let text = SerdeFormat::Json.serialize(&ArchiveFile { rois: sample() })?;
        assert!(text.contains("\"magenta\""));
        Ok(())
    }

    #[test]
    fn archive_format_follows_file_name() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rois.json");

        SerdeRoiArchive::new(SerdeFormat::Yaml).save(&sample(), &path)?;
        let text = std::fs::read_to_string(&path)?;
        assert!(text.trim_start().starts_with('{'));
        assert_eq!(SerdeRoiArchive::default().load(&path)?, sample());
        Ok(())
    }

    #[test]
    fn unknown_archive_extension_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rois.zip");
        assert!(SerdeRoiArchive::default().save(&sample(), &path).is_err());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn missing_archive_reports_path() {
        let err = SerdeRoiArchive::default()
            .load(Path::new("/nonexistent/fibers.yml"))
            .unwrap_err();
        assert!(err.to_string().contains("fibers.yml"));
    }
}
