use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;

use crate::calibration::Calibration;
use crate::config::{IdentifyFibersConfig, PRIMARY_MODEL, SECONDARY_MODEL};
use crate::geometry::Polygon;
use crate::pipeline::{identify_fibers, PipelineError, Stage};
use crate::roi::{Roi, RoiColor, RoiSet};
use crate::services::{Segmentation, Services};
use crate::tests::{
    csv_column, plane_with_squares, read_csv, read_rois, write_image, CountingFilters,
    FailingClassifier, FixedParticles, TwoClassClassifier,
};
use crate::threshold::IntensityThreshold;

const WIDTH: usize = 40;
const HEIGHT: usize = 16;

fn fixture(dir: &Path) -> anyhow::Result<IdentifyFibersConfig> {
    let membrane = plane_with_squares(WIDTH, HEIGHT, 0.0, 255.0, &[(3, 5, 6), (15, 5, 6), (27, 5, 6)]);
    let mhc = plane_with_squares(WIDTH, HEIGHT, 10.0, 200.0, &[(13, 3, 10)]);
    let image = write_image(
        dir,
        WIDTH,
        HEIGHT,
        vec![membrane, mhc],
        Calibration::scaled(0.5, 0.5, "micron"),
    )?;

    let classifiers = dir.join("classifiers");
    fs::create_dir_all(&classifiers)?;
    fs::write(classifiers.join(PRIMARY_MODEL), b"model")?;
    fs::write(classifiers.join(SECONDARY_MODEL), b"model")?;

    Ok(IdentifyFibersConfig {
        image,
        output_dir: dir.join("out"),
        classifiers_dir: classifiers,
        membrane_channel: 1,
        fiber_channel: 2,
        min_fiber_intensity: IntensityThreshold::Fixed(100.0),
        ..Default::default()
    })
}

/// Particles named the way the detector reports them.
fn particles() -> RoiSet {
    RoiSet::new(
        [(3.0, "particle-a"), (15.0, "particle-b"), (27.0, "particle-c")]
            .into_iter()
            .map(|(x, name)| Roi::new(name, Polygon::rectangle(x, 5.0, 6.0, 6.0)))
            .collect(),
    )
}

fn segmenting_services(filters: CountingFilters) -> Services {
    Services::builtin().with_segmentation(Segmentation {
        filters: Box::new(filters),
        classifier: Box::new(TwoClassClassifier),
        detector: Box::new(FixedParticles(particles())),
    })
}

#[test]
fn fibers_are_segmented_enlarged_and_typed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = fixture(dir.path())?;
    let filters = CountingFilters::default();
    let applied = filters.applied.clone();

    let report = identify_fibers(&config, &segmenting_services(filters))?;

    assert_eq!(applied.load(Ordering::Relaxed), 11);
    assert_eq!(report.roi_count, 3);
    assert_eq!(report.subset("MHC Positive Fibers (magenta)"), Some(1));
    assert_eq!(
        report.stages,
        [
            Stage::Init,
            Stage::Loaded,
            Stage::Preprocessed,
            Stage::Segmented,
            Stage::Detected,
            Stage::Measured,
            Stage::Classified,
            Stage::Exported,
        ]
    );

    let out = dir.path().join("out").join("raw").join("1_identify_fibers");
    assert_eq!(report.output_dir, out);
    assert!(out.join("raw_all_fibers_binary.tif").is_file());
    assert!(out.join("raw_all_fibers.png").is_file());

    // 1 micron expansion is 2 px on each side at 0.5 micron per pixel
    let all = read_rois(&out.join("raw_all_fiber_rois.yml"))?;
    assert_eq!(all.names(), ["1", "2", "3"]);
    let bounds = all
        .get(1)
        .and_then(|roi| roi.outline.bounds())
        .ok_or_else(|| anyhow::anyhow!("empty outline"))?;
    assert!((bounds.min.x - 13.0).abs() < 1e-9);
    assert!((bounds.width() - 10.0).abs() < 1e-9);

    let mhc = read_rois(&out.join("raw_mhc_positive_fiber_rois.yml"))?;
    assert_eq!(mhc.names(), ["2"]);
    assert_eq!(mhc.colors(), [RoiColor::Magenta]);

    let results = out.join("raw_all_fibers_results.csv");
    assert_eq!(
        csv_column(&results, "MHC Positive Fibers (magenta)")?,
        ["NO", "YES", "NO"]
    );
    assert_eq!(csv_column(&results, "Area")?, ["25.0000"; 3]);

    let log = fs::read_to_string(out.join("raw_all_fibers_Log.txt"))?;
    assert!(log.contains("area = 10-6000"));
    assert!(log.contains("fiber channel 2 intensity threshold: 100"));
    assert!(!log.contains("not spatially calibrated"));
    Ok(())
}

#[test]
fn fiber_positivity_is_optional() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = IdentifyFibersConfig {
        fiber_channel: 0,
        ..fixture(dir.path())?
    };

    let report = identify_fibers(&config, &segmenting_services(CountingFilters::default()))?;
    assert!(report.subsets.is_empty());
    assert!(!report.stages.contains(&Stage::Classified));

    let out = dir.path().join("out").join("raw").join("1_identify_fibers");
    let (header, rows) = read_csv(&out.join("raw_all_fibers_results.csv"))?;
    assert_eq!(rows.len(), 3);
    assert!(!header.iter().any(|h| h.starts_with("MHC")));
    assert!(!out.join("raw_mhc_positive_fiber_rois.yml").exists());
    Ok(())
}

#[test]
fn classifier_failure_aborts_before_detection() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = fixture(dir.path())?;
    let services = Services::builtin().with_segmentation(Segmentation {
        filters: Box::new(CountingFilters::default()),
        classifier: Box::new(FailingClassifier),
        detector: Box::new(FixedParticles(particles())),
    });

    let err = identify_fibers(&config, &services).unwrap_err();
    assert!(matches!(
        &err,
        PipelineError::Adapter {
            stage: Stage::Segmented,
            service: "pixel classifier",
            ..
        }
    ));
    assert!(err.to_string().contains("not enough memory"));

    let out = dir.path().join("out").join("raw").join("1_identify_fibers");
    assert!(!out.join("raw_all_fibers_binary.tif").exists());
    assert!(!out.join("raw_all_fiber_rois.yml").exists());
    Ok(())
}

#[test]
fn segmentation_services_are_required() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = fixture(dir.path())?;

    let err = identify_fibers(&config, &Services::builtin()).unwrap_err();
    assert!(matches!(err, PipelineError::MissingSegmentation));
    Ok(())
}
