use crate::config::IdentifyFibersConfig;
use crate::naming::OutputLayout;
use crate::pipeline::run::{ExportNames, Run};
use crate::pipeline::{PipelineError, PipelineResult, RunReport, Stage, Variant};
use crate::raster::Channel;
use crate::results::ResultsTable;
use crate::roi::RoiColor;
use crate::selection::{select_by_intensity, IntensityRule};
use crate::services::{FilterOp, ParticleGates, Services};
use crate::threshold::ThresholdMethod;

pub const MHC_POSITIVE_COLUMN: &str = "MHC Positive Fibers (magenta)";

/// Segments fiber outlines from the membrane channel, measures them and
/// optionally flags MHC positive fibers.
pub fn identify_fibers(
    config: &IdentifyFibersConfig,
    services: &Services,
) -> PipelineResult<RunReport> {
    config.validate()?;
    let segmentation = services
        .segmentation
        .as_ref()
        .ok_or(PipelineError::MissingSegmentation)?;

    Run::new(services, Variant::IdentifyFibers).execute(|run| {
        let image = run.open_image(&config.image)?;
        config.check_channels(image.channel_count())?;
        let membrane_channel = config.membrane()?;
        let fiber_channel = config.fiber()?;

        let layout = OutputLayout::new(&config.output_dir, image.title());
        let title = layout.title().to_string();
        let dir = layout.identify_fibers_dir();
        run.begin(&image, &title, &dir)?;

        let mut settings: Vec<String> = config
            .gates
            .named()
            .iter()
            .map(|(gate, range)| format!("{gate} = {range}"))
            .collect();
        settings.push(format!("ROI expansion [unit] = {}", config.expansion));
        settings.push(format!("Membrane channel = {membrane_channel}"));
        settings.push(format!("MHC positive fiber channel = {}", config.fiber_channel));
        settings.push(format!("Sub-tiling = {}", config.tiling_factor));
        run.settings(settings);

        let filters = &segmentation.filters;
        let mut membrane = image.duplicate_channel(membrane_channel, "membrane")?;
        for op in FilterOp::membrane_preprocessing() {
            run.call(Stage::Preprocessed, "filter service", || {
                filters.apply(&mut membrane, &op)
            })?;
        }
        run.advance(Stage::Preprocessed)?;

        let classifier = &segmentation.classifier;
        let mut classes = run.call(Stage::Segmented, "pixel classifier", || {
            classifier.classify(&config.primary_model(), &membrane, config.tiling_factor)
        })?;
        classes.delete_channel(Channel::FIRST)?;
        let mut mask = run.call(Stage::Segmented, "pixel classifier", || {
            classifier.classify(&config.secondary_model(), &classes, config.tiling_factor)
        })?;
        mask.delete_channel(Channel::FIRST)?;
        mask.set_calibration(image.calibration().clone());
        mask.set_title(format!("{title}_all_fibers_binary"));
        for op in FilterOp::classifier_postprocessing() {
            run.call(Stage::Segmented, "filter service", || {
                filters.apply(&mut mask, &op)
            })?;
        }
        run.advance(Stage::Segmented)?;
        run.save_image(&mask, &dir, &format!("{title}_all_fibers_binary"))?;

        let gates = ParticleGates::new(&config.gates, image.calibration());
        let detector = &segmentation.detector;
        let detected = run.call(Stage::Detected, "particle detector", || {
            detector.detect(&mask, &gates)
        })?;

        let pixels = image.calibration().distance_to_pixels(config.expansion);
        let transformer = &run.services().transformer;
        let mut rois = run.call(Stage::Detected, "ROI transformer", || {
            detected.transform_all(|outline| transformer.enlarge(outline, pixels))
        })?;
        rois.relabel();
        run.detected(&rois)?;
        run.save_rois(&rois, &dir, &format!("{title}_all_fiber_rois"))?;

        let mut table = ResultsTable::new();
        run.measure(&mut table, &rois, &image, membrane_channel)?;

        if let Some(fiber) = fiber_channel {
            let threshold =
                run.threshold(&image, fiber, config.min_fiber_intensity, ThresholdMethod::Mean)?;
            run.record_threshold(format!("fiber channel {fiber} intensity threshold"), threshold);

            let positives =
                select_by_intensity(&rois, &image, fiber, threshold, IntensityRule::MeanAbove)?;
            rois.recolor_all(RoiColor::Blue);
            rois.recolor(&positives, RoiColor::Magenta)?;
            run.save_subset(
                &rois,
                &positives,
                &dir,
                &format!("{title}_mhc_positive_fiber_rois"),
            )?;
            run.flag_column(&mut table, MHC_POSITIVE_COLUMN, &positives)?;
        }

        run.export(
            &table,
            &image,
            &rois,
            &dir,
            ExportNames {
                results: &format!("{title}_all_fibers_results"),
                preview: &format!("{title}_all_fibers"),
                log: &format!("{title}_all_fibers_Log"),
            },
        )
    })
}
