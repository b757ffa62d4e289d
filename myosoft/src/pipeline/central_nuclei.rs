use crate::config::CentralNucleiConfig;
use crate::naming::OutputLayout;
use crate::pipeline::run::{ExportNames, Run};
use crate::pipeline::{PipelineResult, RunReport, Stage, Variant};
use crate::results::ResultsTable;
use crate::roi::RoiColor;
use crate::selection::{select_by_intensity, IntensityRule};
use crate::services::Services;
use crate::threshold::{relax_nucleus_threshold, ThresholdMethod};

pub const CENTRAL_NUCLEI_COLUMN: &str = "Centralized Nuclei (yellow)";

/// Flags fibers whose shrunk outline contains a punctate nucleus signal.
///
/// Nuclei are searched inside the shrunk outlines; the results and the
/// color-coded archive keep the original outlines.
pub fn central_nuclei(config: &CentralNucleiConfig, services: &Services) -> PipelineResult<RunReport> {
    config.validate()?;

    Run::new(services, Variant::CentralNuclei).execute(|run| {
        let image = run.open_image(&config.image)?;
        config.check_channels(image.channel_count())?;
        let nucleus = config.nucleus()?;

        let layout = OutputLayout::new(&config.output_dir, image.title());
        let title = layout.title().to_string();
        let dir = layout.central_nuclei_dir();
        run.begin(&image, &title, &dir)?;
        run.settings([
            format!("Selected fiber-ROIs file = {}", config.rois.display()),
            format!("ROI shrink factor = {}", config.shrink),
            format!("Nucleus channel = {nucleus}"),
            format!("Minimal nucleus intensity = {}", config.min_nucleus_intensity),
        ]);

        let mut rois = run.load_rois(&config.rois)?;

        let transformer = &run.services().transformer;
        let mut shrunk = run.call(Stage::Detected, "ROI transformer", || {
            rois.transform_all(|outline| {
                transformer.scale(outline, config.shrink, config.shrink, true)
            })
        })?;
        shrunk.relabel();
        run.save_rois(&shrunk, &dir, "all_fiber_rois_shrunk")?;

        let threshold = match config.min_nucleus_intensity.fixed() {
            Some(value) => value,
            None => relax_nucleus_threshold(run.threshold(
                &image,
                nucleus,
                config.min_nucleus_intensity,
                ThresholdMethod::Default,
            )?),
        };
        run.record_threshold("nucleus intensity threshold", threshold);

        let positives = select_by_intensity(
            &shrunk,
            &image,
            nucleus,
            threshold,
            IntensityRule::CentralNucleus,
        )?;
        rois.recolor(&positives, RoiColor::Yellow)?;
        run.save_subset(&rois, &positives, &dir, "central_nuclei_fiber_rois")?;
        run.save_rois(&rois, &dir, "all_fiber_rois_central_nuclei_color-coded")?;

        let mut table = ResultsTable::new();
        run.measure(&mut table, &rois, &image, nucleus)?;
        run.flag_column(&mut table, CENTRAL_NUCLEI_COLUMN, &positives)?;

        run.export(
            &table,
            &image,
            &rois,
            &dir,
            ExportNames {
                results: "centralized_nuclei_results",
                preview: &format!("{title}_centralized_nuclei"),
                log: &format!("{title}_centralized_nuclei_Log"),
            },
        )
    })
}
