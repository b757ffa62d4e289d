use crate::config::ManualRerunConfig;
use crate::naming::OutputLayout;
use crate::pipeline::run::{ExportNames, Run};
use crate::pipeline::{PipelineResult, RunReport, Variant};
use crate::results::{Cell, ResultsTable};
use crate::services::Services;

pub const ROI_COLOR_COLUMN: &str = "ROI color";

/// Re-measures a hand-edited ROI archive and reports each ROI's color.
pub fn manual_rerun(config: &ManualRerunConfig, services: &Services) -> PipelineResult<RunReport> {
    config.validate()?;

    Run::new(services, Variant::ManualRerun).execute(|run| {
        let image = run.open_image(&config.image)?;
        config.check_channels(image.channel_count())?;
        let channel = config.measurement()?;

        let layout = OutputLayout::new(&config.output_dir, image.title());
        let title = layout.title().to_string();
        let dir = layout.manual_rerun_dir();
        run.begin(&image, &title, &dir)?;
        run.settings([
            format!("Edited fiber-ROIs file = {}", config.rois.display()),
            format!("Measurement channel = {channel}"),
        ]);

        let mut rois = run.load_rois(&config.rois)?;
        rois.relabel();
        run.save_rois(&rois, &dir, "manual_rerun_all_fiber_rois_color-coded")?;

        let mut table = ResultsTable::new();
        run.measure(&mut table, &rois, &image, channel)?;
        table.set_column(
            ROI_COLOR_COLUMN,
            rois.colors()
                .into_iter()
                .map(|color| Cell::Text(color.to_string()))
                .collect(),
        )?;

        run.export(
            &table,
            &image,
            &rois,
            &dir,
            ExportNames {
                results: "manual_rerun_results",
                preview: &format!("{title}_manual_rerun"),
                log: &format!("{title}_manual_rerun_Log"),
            },
        )
    })
}
