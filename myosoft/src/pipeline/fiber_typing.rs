use crate::config::FiberTypingConfig;
use crate::naming::OutputLayout;
use crate::pipeline::run::{ExportNames, Run};
use crate::pipeline::{PipelineResult, RunReport, Variant};
use crate::raster::Channel;
use crate::results::ResultsTable;
use crate::roi::RoiColor;
use crate::selection::{select_by_intensity, IntensityRule, Selection};
use crate::services::Services;
use crate::threshold::ThresholdMethod;

/// ROI color of the positives of each fiber staining slot.
pub const SLOT_COLORS: [RoiColor; 3] = [RoiColor::Green, RoiColor::Orange, RoiColor::Red];

/// Combinations of slots, their ROI color, results column and archive suffix.
const COMBINATIONS: [(&[usize], RoiColor, &str, &str); 4] = [
    (&[0, 1], RoiColor::Magenta, "channel 1,2 positive (magenta)", "c1_c2"),
    (&[0, 2], RoiColor::Yellow, "channel 1,3 positive (yellow)", "c1_c3"),
    (&[1, 2], RoiColor::Cyan, "channel 2,3 positive (cyan)", "c2_c3"),
    (&[0, 1, 2], RoiColor::White, "channel 1,2,3 positive (white)", "c1_c2_c3"),
];

pub fn single_positive_column(channel: Channel, slot: usize) -> String {
    format!("channel {channel} positive ({})", SLOT_COLORS[slot])
}

/// Calls positivity for up to three fiber type stainings and their double
/// and triple combinations.
pub fn fiber_typing(config: &FiberTypingConfig, services: &Services) -> PipelineResult<RunReport> {
    config.validate()?;

    Run::new(services, Variant::FiberTyping).execute(|run| {
        let image = run.open_image(&config.image)?;
        config.check_channels(image.channel_count())?;
        let channels = config.fibers()?;

        let layout = OutputLayout::new(&config.output_dir, image.title());
        let title = layout.title().to_string();
        let dir = layout.fiber_typing_dir();
        run.begin(&image, &title, &dir)?;

        let mut settings = vec![format!(
            "Selected fiber-ROIs file = {}",
            config.rois.display()
        )];
        for (slot, number) in config.fiber_channels.iter().enumerate() {
            settings.push(format!("Fiber staining {} channel number = {number}", slot + 1));
        }
        run.settings(settings);

        let mut rois = run.load_rois(&config.rois)?;
        rois.recolor_all(RoiColor::Blue);

        let mut table = ResultsTable::new();
        let measured = channels.iter().flatten().next().copied().unwrap_or(Channel::FIRST);
        run.measure(&mut table, &rois, &image, measured)?;

        let mut positives: [Selection; 3] = Default::default();
        for (slot, channel) in channels.iter().enumerate() {
            let Some(channel) = *channel else {
                continue;
            };

            let threshold = run.threshold(
                &image,
                channel,
                config.min_fiber_intensities[slot],
                ThresholdMethod::Mean,
            )?;
            run.record_threshold(format!("fiber channel {channel} intensity threshold"), threshold);

            let selected =
                select_by_intensity(&rois, &image, channel, threshold, IntensityRule::MeanAbove)?;
            rois.recolor(&selected, SLOT_COLORS[slot])?;
            run.save_subset(
                &rois,
                &selected,
                &dir,
                &format!("{title}_positive_fiber_rois_c{channel}"),
            )?;
            run.flag_column(&mut table, &single_positive_column(channel, slot), &selected)?;
            positives[slot] = selected;
        }

        for (slots, color, column, suffix) in COMBINATIONS {
            let combined = slots[1..]
                .iter()
                .fold(positives[slots[0]].clone(), |acc, &slot| {
                    acc.intersect(&positives[slot])
                });
            if combined.is_empty() {
                continue;
            }

            rois.recolor(&combined, color)?;
            run.save_subset(
                &rois,
                &combined,
                &dir,
                &format!("{title}_positive_fiber_rois_{suffix}"),
            )?;
            run.flag_column(&mut table, column, &combined)?;
        }

        run.save_rois(&rois, &dir, &format!("{title}_all_fiber_type_rois_color-coded"))?;

        run.export(
            &table,
            &image,
            &rois,
            &dir,
            ExportNames {
                results: &format!("{title}_fibertyping_results"),
                preview: &format!("{title}_fibertyping"),
                log: &format!("{title}_fibertyping_Log"),
            },
        )
    })
}
