use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use serde::Serialize;

use crate::pipeline::{PipelineError, PipelineResult, Stage, StageTracker, Variant};
use crate::raster::{Channel, RasterImage};
use crate::results::{Cell, ResultsTable};
use crate::roi::RoiSet;
use crate::selection::Selection;
use crate::services::Services;
use crate::threshold::{IntensityThreshold, ThresholdMethod};

/// Operator-facing log of one run, persisted next to its outputs.
#[derive(Clone, Debug, Default)]
pub struct RunLog {
    lines: Vec<String>,
}

impl RunLog {
    pub fn info(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.lines.push(line);
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        let line = line.into();
        warn!("{line}");
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut text = self.lines.join("\n");
        text.push('\n');
        fs::write(path, text)
    }
}

/// Summary of a finished run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    pub variant: String,
    pub title: String,
    pub output_dir: PathBuf,
    pub roi_count: usize,
    /// Intensity thresholds actually applied, by label.
    pub thresholds: Vec<(String, f64)>,
    /// Number of ROIs flagged `YES`, by results column.
    pub subsets: Vec<(String, usize)>,
    pub files: Vec<PathBuf>,
    pub stages: Vec<Stage>,
    pub log: Vec<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn subset(&self, column: &str) -> Option<usize> {
        self.subsets
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, count)| *count)
    }

    pub fn threshold(&self, label: &str) -> Option<f64> {
        self.thresholds
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| *value)
    }
}

/// State owned by a single run: its stage, run log and report.
pub(crate) struct Run<'a> {
    services: &'a Services,
    stages: StageTracker,
    pub(crate) log: RunLog,
    report: RunReport,
    started: Instant,
}

impl<'a> Run<'a> {
    pub(crate) fn new(services: &'a Services, variant: Variant) -> Self {
        Self {
            services,
            stages: StageTracker::default(),
            log: RunLog::default(),
            report: RunReport {
                variant: variant.to_string(),
                ..Default::default()
            },
            started: Instant::now(),
        }
    }

    pub(crate) fn services(&self) -> &'a Services {
        self.services
    }

    /// Runs `steps`, marking the run aborted on the first error.
    pub(crate) fn execute<F>(mut self, steps: F) -> PipelineResult<RunReport>
    where
        F: FnOnce(&mut Run<'a>) -> PipelineResult<()>,
    {
        match steps(&mut self) {
            Ok(()) => {
                self.report.stages = self.stages.history().to_vec();
                self.report.log = self.log.lines;
                Ok(self.report)
            }
            Err(err) => {
                self.stages.abort();
                error!("{} aborted: {err}", self.report.variant);
                Err(err)
            }
        }
    }

    pub(crate) fn advance(&mut self, to: Stage) -> PipelineResult<()> {
        self.stages
            .advance(to)
            .map_err(|(from, to)| PipelineError::Transition { from, to })
    }

    /// Calls an external service, attributing a failure to `stage`.
    pub(crate) fn call<T, F>(&self, stage: Stage, service: &'static str, f: F) -> PipelineResult<T>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        f().map_err(|source| PipelineError::Adapter {
            stage,
            service,
            source,
        })
    }

    pub(crate) fn open_image(&mut self, path: &Path) -> PipelineResult<RasterImage> {
        let images = &self.services.images;
        let image = self.call(Stage::Loaded, "image store", || images.open(path))?;
        self.advance(Stage::Loaded)?;
        Ok(image)
    }

    /// Logs the run header, warning about uncalibrated images.
    pub(crate) fn begin(&mut self, image: &RasterImage, title: &str, output_dir: &Path) -> PipelineResult<()> {
        fs::create_dir_all(output_dir).map_err(|source| PipelineError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

        self.report.title = title.to_string();
        self.report.output_dir = output_dir.to_path_buf();

        self.log.info(format!("Now working on {title}"));
        if !image.calibration().is_scaled() {
            self.log.warn(
                "Your image is not spatially calibrated! Size measurements are only possible in [px].",
            );
        }
        Ok(())
    }

    pub(crate) fn settings<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log.info(" -- settings used -- ");
        for line in lines {
            self.log.info(line);
        }
        self.log.info(" -- settings used -- ");
    }

    /// Stands in for preprocessing and segmentation when ROIs come from an archive.
    pub(crate) fn load_rois(&mut self, path: &Path) -> PipelineResult<RoiSet> {
        self.advance(Stage::Preprocessed)?;
        self.advance(Stage::Segmented)?;
        let archive = &self.services.archive;
        let rois = self.call(Stage::Detected, "ROI archive", || archive.load(path))?;
        self.advance(Stage::Detected)?;
        self.report.roi_count = rois.len();
        Ok(rois)
    }

    pub(crate) fn detected(&mut self, rois: &RoiSet) -> PipelineResult<()> {
        self.advance(Stage::Detected)?;
        self.report.roi_count = rois.len();
        Ok(())
    }

    /// Resolves the configured threshold, asking the auto-threshold service
    /// when it is automatic.
    pub(crate) fn threshold(
        &mut self,
        image: &RasterImage,
        channel: Channel,
        configured: IntensityThreshold,
        method: ThresholdMethod,
    ) -> PipelineResult<f64> {
        match configured.fixed() {
            Some(value) => Ok(value),
            None => {
                let thresholder = &self.services.thresholder;
                let bounds = self.call(self.stages.current(), "auto threshold", || {
                    thresholder.threshold(image, channel, method)
                })?;
                self.log.info("automatic intensity threshold detection: True");
                Ok(bounds.lower)
            }
        }
    }

    pub(crate) fn record_threshold(&mut self, label: impl Into<String>, value: f64) {
        let label = label.into();
        self.log.info(format!("{label}: {value}"));
        self.report.thresholds.push((label, value));
    }

    pub(crate) fn measure(
        &mut self,
        table: &mut ResultsTable,
        rois: &RoiSet,
        image: &RasterImage,
        channel: Channel,
    ) -> PipelineResult<()> {
        log::debug!("measuring {} ROIs in channel {channel}", rois.len());
        table.add_measurements(rois, image.calibration())?;
        self.advance(Stage::Measured)
    }

    /// Adds a `NO`-filled flag column and sets `YES` for `positives`.
    pub(crate) fn flag_column(
        &mut self,
        table: &mut ResultsTable,
        column: &str,
        positives: &Selection,
    ) -> PipelineResult<()> {
        table.ensure_column(column, Cell::NO);
        table.set_values(column, positives, Cell::YES)?;
        self.report.subsets.push((column.to_string(), positives.len()));
        self.advance(Stage::Classified)
    }

    pub(crate) fn save_image(&mut self, image: &RasterImage, dir: &Path, name: &str) -> PipelineResult<()> {
        let images = &self.services.images;
        let path = output_file(dir, name, images.extension());
        self.call(Stage::Segmented, "image store", || images.save(image, &path))?;
        self.report.files.push(path);
        Ok(())
    }

    pub(crate) fn save_rois(&mut self, rois: &RoiSet, dir: &Path, name: &str) -> PipelineResult<()> {
        let archive = &self.services.archive;
        let path = output_file(dir, name, archive.extension());
        let stage = self.stages.current();
        self.call(stage, "ROI archive", || archive.save(rois, &path))?;
        self.report.files.push(path);
        Ok(())
    }

    /// Saves the selected ROIs; an empty selection writes nothing.
    pub(crate) fn save_subset(
        &mut self,
        rois: &RoiSet,
        selection: &Selection,
        dir: &Path,
        name: &str,
    ) -> PipelineResult<bool> {
        if selection.is_empty() {
            info!("{name}: no ROIs selected, nothing saved");
            return Ok(false);
        }
        let subset = rois.subset(selection)?;
        self.save_rois(&subset, dir, name)?;
        Ok(true)
    }

    /// Writes the results table and the preview, then persists the run log.
    pub(crate) fn export(
        &mut self,
        table: &ResultsTable,
        image: &RasterImage,
        rois: &RoiSet,
        dir: &Path,
        names: ExportNames<'_>,
    ) -> PipelineResult<()> {
        let csv = dir.join(format!("{}.csv", names.results));
        table.save_csv(&csv)?;
        self.report.files.push(csv);

        let preview = &self.services.preview;
        let path = output_file(dir, names.preview, preview.extension());
        self.call(Stage::Exported, "preview renderer", || {
            preview.render(image, rois, &path)
        })?;
        self.report.files.push(path);

        self.advance(Stage::Exported)?;

        self.report.elapsed = self.started.elapsed();
        self.log.info(format!(
            "total time in minutes: {}",
            self.report.elapsed.as_secs_f64() / 60.0
        ));
        self.log.info("~~ all done ~~");

        let log_path = dir.join(format!("{}.txt", names.log));
        self.log.save(&log_path).map_err(|source| PipelineError::Io {
            path: log_path.clone(),
            source,
        })?;
        self.report.files.push(log_path);
        Ok(())
    }
}

/// File stems of the final outputs of a run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ExportNames<'n> {
    pub results: &'n str,
    pub preview: &'n str,
    pub log: &'n str,
}

/// `dir/name.ext`, keeping any dots already in `name`.
pub(crate) fn output_file(dir: &Path, name: &str, extension: &str) -> PathBuf {
    dir.join(format!("{name}.{extension}"))
}
