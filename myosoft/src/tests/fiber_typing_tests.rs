use std::path::Path;

use crate::calibration::Calibration;
use crate::config::FiberTypingConfig;
use crate::geometry::Polygon;
use crate::pipeline::{fiber_typing, PipelineError, Stage};
use crate::roi::{RoiColor, RoiSet};
use crate::services::Services;
use crate::tests::{
    csv_column, plane_with_squares, read_csv, read_rois, write_image, write_rois, FailingThreshold,
    FixedThreshold,
};
use crate::threshold::IntensityThreshold;

const WIDTH: usize = 62;
const HEIGHT: usize = 6;
const FIBERS: usize = 10;

fn fiber_square(index: usize) -> (usize, usize, usize) {
    (1 + 6 * index, 1, 4)
}

fn positive_plane(positives: &[usize]) -> Vec<f32> {
    let squares: Vec<_> = positives.iter().map(|&i| fiber_square(i)).collect();
    plane_with_squares(WIDTH, HEIGHT, 10.0, 200.0, &squares)
}

/// Ten fibers; channel 1 lights up {0,2,4,6}, channel 2 {2,4,8}, channel 3 {4}.
fn fixture(dir: &Path) -> anyhow::Result<FiberTypingConfig> {
    let image = write_image(
        dir,
        WIDTH,
        HEIGHT,
        vec![
            positive_plane(&[0, 2, 4, 6]),
            positive_plane(&[2, 4, 8]),
            positive_plane(&[4]),
        ],
        Calibration::Uncalibrated,
    )?;

    let rois = RoiSet::from_outlines((0..FIBERS).map(|i| {
        let (x, y, size) = fiber_square(i);
        Polygon::rectangle(x as f64, y as f64, size as f64, size as f64)
    }));
    let rois = write_rois(dir, &rois)?;

    Ok(FiberTypingConfig {
        image,
        rois,
        output_dir: dir.join("out"),
        fiber_channels: [1, 2, 3],
        min_fiber_intensities: [IntensityThreshold::Fixed(100.0); 3],
    })
}

fn yes_rows(values: &[String]) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, value)| value.as_str() == "YES")
        .map(|(row, _)| row)
        .collect()
}

#[test]
fn single_double_and_triple_positives() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = fixture(dir.path())?;

    let report = fiber_typing(&config, &Services::builtin())?;

    assert_eq!(report.title, "raw");
    assert_eq!(report.roi_count, FIBERS);
    assert_eq!(report.subset("channel 1 positive (green)"), Some(4));
    assert_eq!(report.subset("channel 2 positive (orange)"), Some(3));
    assert_eq!(report.subset("channel 3 positive (red)"), Some(1));
    assert_eq!(report.subset("channel 1,2 positive (magenta)"), Some(2));
    assert_eq!(report.subset("channel 1,2,3 positive (white)"), Some(1));

    let out = dir.path().join("out").join("2c_fibertyping");
    let results = out.join("raw_fibertyping_results.csv");

    let expected: [(&str, &[usize]); 7] = [
        ("channel 1 positive (green)", &[0, 2, 4, 6]),
        ("channel 2 positive (orange)", &[2, 4, 8]),
        ("channel 3 positive (red)", &[4]),
        ("channel 1,2 positive (magenta)", &[2, 4]),
        ("channel 1,3 positive (yellow)", &[4]),
        ("channel 2,3 positive (cyan)", &[4]),
        ("channel 1,2,3 positive (white)", &[4]),
    ];
    for (column, rows) in expected {
        let values = csv_column(&results, column)?;
        assert_eq!(values.len(), FIBERS);
        assert_eq!(yes_rows(&values), rows, "{column}");
        assert!(values.iter().all(|v| v == "YES" || v == "NO"));
    }

    let (header, rows) = read_csv(&results)?;
    assert_eq!(header[0], "ROI");
    assert_eq!(header[1], "Area");
    assert_eq!(rows[4][0], "5");
    assert_eq!(rows[4][1], "16.0000");

    let colors = read_rois(&out.join("raw_all_fiber_type_rois_color-coded.yml"))?.colors();
    assert_eq!(colors[0], RoiColor::Green);
    assert_eq!(colors[1], RoiColor::Blue);
    assert_eq!(colors[2], RoiColor::Magenta);
    assert_eq!(colors[4], RoiColor::White);
    assert_eq!(colors[6], RoiColor::Green);
    assert_eq!(colors[8], RoiColor::Orange);

    let c1 = read_rois(&out.join("raw_positive_fiber_rois_c1.yml"))?;
    assert_eq!(c1.names(), ["1", "3", "5", "7"]);
    let triple = read_rois(&out.join("raw_positive_fiber_rois_c1_c2_c3.yml"))?;
    assert_eq!(triple.names(), ["5"]);

    assert!(out.join("raw_fibertyping.png").is_file());
    let log = std::fs::read_to_string(out.join("raw_fibertyping_Log.txt"))?;
    assert!(log.starts_with("Now working on raw\n"));
    assert!(log.contains("Your image is not spatially calibrated!"));
    assert!(log.contains("fiber channel 2 intensity threshold: 100"));
    assert!(log.trim_end().ends_with("~~ all done ~~"));

    assert_eq!(report.stages.first(), Some(&Stage::Init));
    assert_eq!(report.stages.last(), Some(&Stage::Exported));
    assert_eq!(
        report
            .stages
            .iter()
            .filter(|stage| **stage == Stage::Classified)
            .count(),
        7
    );
    Ok(())
}

#[test]
fn empty_subsets_are_not_saved() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = FiberTypingConfig {
        min_fiber_intensities: [
            IntensityThreshold::Fixed(100.0),
            IntensityThreshold::Fixed(100.0),
            IntensityThreshold::Fixed(250.0),
        ],
        ..fixture(dir.path())?
    };

    let report = fiber_typing(&config, &Services::builtin())?;
    assert_eq!(report.subset("channel 3 positive (red)"), Some(0));
    assert_eq!(report.subset("channel 1,3 positive (yellow)"), None);

    let out = dir.path().join("out").join("2c_fibertyping");
    assert!(out.join("raw_positive_fiber_rois_c1.yml").is_file());
    assert!(out.join("raw_positive_fiber_rois_c1_c2.yml").is_file());
    assert!(!out.join("raw_positive_fiber_rois_c3.yml").exists());
    assert!(!out.join("raw_positive_fiber_rois_c1_c2_c3.yml").exists());

    let results = out.join("raw_fibertyping_results.csv");
    let (header, _) = read_csv(&results)?;
    assert!(header.iter().any(|h| h == "channel 3 positive (red)"));
    assert!(!header.iter().any(|h| h == "channel 1,3 positive (yellow)"));
    assert!(!header.iter().any(|h| h == "channel 1,2,3 positive (white)"));
    assert!(yes_rows(&csv_column(&results, "channel 3 positive (red)")?).is_empty());
    Ok(())
}

#[test]
fn skipped_slot_gets_no_column() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = FiberTypingConfig {
        fiber_channels: [1, 0, 3],
        ..fixture(dir.path())?
    };

    let report = fiber_typing(&config, &Services::builtin())?;
    assert_eq!(report.subset("channel 2 positive (orange)"), None);
    assert_eq!(report.subset("channel 1,3 positive (yellow)"), Some(1));

    let results = dir
        .path()
        .join("out")
        .join("2c_fibertyping")
        .join("raw_fibertyping_results.csv");
    let (header, _) = read_csv(&results)?;
    assert!(!header.iter().any(|h| h.contains("orange")));
    assert!(!header.iter().any(|h| h.contains("magenta")));
    Ok(())
}

#[test]
fn automatic_thresholds_come_from_the_service() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = FiberTypingConfig {
        min_fiber_intensities: [IntensityThreshold::Auto; 3],
        ..fixture(dir.path())?
    };
    let services = Services {
        thresholder: Box::new(FixedThreshold(150.0)),
        ..Services::builtin()
    };

    let report = fiber_typing(&config, &services)?;
    assert_eq!(report.thresholds.len(), 3);
    assert!(report.thresholds.iter().all(|(_, value)| *value == 150.0));
    assert_eq!(report.subset("channel 1,2,3 positive (white)"), Some(1));
    assert!(report
        .log
        .iter()
        .any(|line| line == "automatic intensity threshold detection: True"));
    Ok(())
}

#[test]
fn threshold_failure_names_the_stage_reached() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let services = Services {
        thresholder: Box::new(FailingThreshold),
        ..Services::builtin()
    };

    let cases = [
        ([IntensityThreshold::Auto; 3], Stage::Measured),
        (
            [
                IntensityThreshold::Fixed(100.0),
                IntensityThreshold::Auto,
                IntensityThreshold::Fixed(100.0),
            ],
            Stage::Classified,
        ),
    ];
    for (thresholds, expected) in cases {
        let config = FiberTypingConfig {
            min_fiber_intensities: thresholds,
            ..fixture(dir.path())?
        };
        let err = fiber_typing(&config, &services).unwrap_err();
        assert!(
            matches!(
                &err,
                PipelineError::Adapter { stage, service: "auto threshold", .. } if *stage == expected
            ),
            "{err}"
        );
    }
    Ok(())
}
