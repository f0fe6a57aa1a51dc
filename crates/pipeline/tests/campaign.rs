//! Campaign runs against an in-memory archive.
//!
//! The fake archive serves a 3×3 scene on the campaign grid: the left column
//! is dark in every optical band (class 3), the right column bright
//! (class 4). Ten labeled points, five per class, train every year.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use geo::{Geometry, Point};
use tempfile::tempdir;

use covermap_algorithms::classification::GradientTreeBoost;
use covermap_algorithms::sampling::SplitParams;
use covermap_colormap::RgbaImage;
use covermap_core::io::{read_band_stack, read_geotiff};
use covermap_core::vector::LabeledSample;
use covermap_core::{
    ArchiveQuery, Error, ExportReceipt, ExportRequest, ExportSink, GridSpec, ImageryArchive, LabeledSampleSet,
    Raster, RawImage, RegionOfInterest, Result,
};
use covermap_pipeline::{
    CampaignConfig, CampaignInputs, CampaignRunner, ExportConfig, GeoTiffDirSink, ReportSink, RetryPolicy,
    Stage, VisualizationSink, YearReport, YearStatus,
};

const CELL: f64 = 30.0;

#[derive(Default)]
struct FakeArchive {
    scenes_per_year: HashMap<i32, usize>,
    /// Years whose right column is cloud-masked in every scene.
    cloudy_right: HashSet<i32>,
    /// Queries that fail with a transient error before the archive recovers.
    outages: Mutex<usize>,
    calls: Arc<AtomicUsize>,
}

impl FakeArchive {
    fn with_years(years: &[i32]) -> Self {
        Self {
            scenes_per_year: years.iter().map(|&y| (y, 3)).collect(),
            ..Self::default()
        }
    }
}

fn dn(reflectance: f64) -> f64 {
    (reflectance + 0.2) / 2.75e-5
}

fn scene(query: &ArchiveQuery, grid: &GridSpec, index: usize, cloudy_right: bool) -> RawImage {
    let mut bands = covermap_core::BandStack::new();
    for (k, name) in query.bands.iter().enumerate() {
        let mut values = Vec::with_capacity(grid.rows * grid.cols);
        for _row in 0..grid.rows {
            for col in 0..grid.cols {
                let v = if name.starts_with("ST_") {
                    45_000.0
                } else {
                    let shift = 0.01 * k as f64 + 0.002 * index as f64;
                    match col {
                        0 => dn(0.05 + shift),
                        1 => dn(0.15),
                        _ if cloudy_right => f64::NAN,
                        _ => dn(0.35 + shift),
                    }
                };
                values.push(v);
            }
        }
        let mut band = grid.blank(f64::NAN);
        band.replace_data(values).unwrap();
        bands.push(name.clone(), band).unwrap();
    }
    RawImage::new(format!("{}_{}_{index}", query.archive_id, query.year), bands)
        .with_cloud_cover(index as f64)
}

impl ImageryArchive for FakeArchive {
    async fn query(&self, query: &ArchiveQuery, grid: &GridSpec) -> Result<Vec<RawImage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut outages = self.outages.lock().unwrap();
            if *outages > 0 {
                *outages -= 1;
                return Err(Error::ArchiveUnavailable("service unavailable".into()));
            }
        }
        let count = self.scenes_per_year.get(&query.year).copied().unwrap_or(0);
        let cloudy = self.cloudy_right.contains(&query.year);
        Ok((0..count).map(|i| scene(query, grid, i, cloudy)).collect())
    }
}

#[derive(Default)]
struct MemoryReports(Mutex<Vec<YearReport>>);

impl ReportSink for MemoryReports {
    fn record(&self, report: &YearReport) -> Result<()> {
        self.0.lock().unwrap().push(report.clone());
        Ok(())
    }
}

#[derive(Default)]
struct MemoryViewer(Mutex<Vec<(i32, Vec<RgbaImage>)>>);

impl VisualizationSink for MemoryViewer {
    fn show(&self, year: i32, layers: &[RgbaImage]) -> Result<()> {
        self.0.lock().unwrap().push((year, layers.to_vec()));
        Ok(())
    }
}

/// Sink whose output directory cannot be written.
#[derive(Default)]
struct ReadOnlySink {
    attempts: Arc<AtomicUsize>,
}

impl ExportSink for ReadOnlySink {
    async fn export(&self, _request: ExportRequest<'_>) -> Result<ExportReceipt> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only output directory",
        )))
    }
}

fn point_in(row: usize, col: usize, dx: f64, class: u8) -> LabeledSample {
    let x = (col as f64 + 0.25 + dx) * CELL;
    let y = (3.0 - row as f64 - 0.5) * CELL;
    LabeledSample::new(Geometry::Point(Point::new(x, y)), class).unwrap()
}

fn samples() -> LabeledSampleSet {
    let mut all = Vec::new();
    for (i, row) in [0, 1, 2, 0, 2].into_iter().enumerate() {
        let dx = if i < 3 { 0.0 } else { 0.4 };
        all.push(point_in(row, 0, dx, 3));
        all.push(point_in(row, 2, dx, 4));
    }
    LabeledSampleSet::new(all)
}

fn config(start_year: i32, end_year: i32, out: &Path) -> CampaignConfig {
    CampaignConfig {
        start_year,
        end_year,
        classifier: GradientTreeBoost {
            tree_count: 20,
            ..GradientTreeBoost::default()
        },
        split: SplitParams {
            stratified: true,
            ..SplitParams::default()
        },
        export: ExportConfig {
            output_dir: out.to_path_buf(),
            ..ExportConfig::default()
        },
        retry: RetryPolicy {
            max_attempts: 3,
            attempt_timeout_ms: 30_000,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..CampaignConfig::default()
    }
}

fn roi() -> RegionOfInterest {
    RegionOfInterest::from_bounds(0.0, 0.0, 3.0 * CELL, 3.0 * CELL).unwrap()
}

fn runner(config: CampaignConfig, archive: FakeArchive) -> CampaignRunner<FakeArchive, GeoTiffDirSink> {
    let sink = GeoTiffDirSink::new(&config.export.output_dir).unwrap();
    let inputs = CampaignInputs::new(config, roi(), samples()).unwrap();
    CampaignRunner::new(inputs, archive, sink)
}

#[tokio::test]
async fn empty_year_is_skipped_and_later_years_still_run() {
    let dir = tempdir().unwrap();
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);
    let campaign = runner(
        config(2015, 2017, dir.path()),
        FakeArchive::with_years(&[2015, 2017]),
    )
    .on_year_finished(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let reports = MemoryReports::default();
    let viewer = MemoryViewer::default();

    let summary = campaign.run(&reports, Some(&viewer)).await.unwrap();

    let years: Vec<i32> = summary.years.iter().map(|r| r.year).collect();
    assert_eq!(years, vec![2015, 2016, 2017]);
    assert_eq!((summary.completed, summary.skipped, summary.failed), (2, 1, 0));
    assert_eq!(finished.load(Ordering::SeqCst), 3);

    let skipped = summary.report(2016).unwrap();
    assert!(
        matches!(&skipped.status, YearStatus::Skipped { stage: Stage::Select, reason } if reason.contains("no scenes")),
        "{:?}",
        skipped.status
    );
    assert!(skipped.exports.is_empty());

    for year in [2015, 2017] {
        let report = summary.report(year).unwrap();
        assert_eq!(report.sensor.as_deref(), Some("Landsat 8 OLI/TIRS"));
        assert_eq!(report.scenes, 3);
        assert_eq!((report.train_size, report.test_size), (8, 2));
        let accuracy = report.accuracy().expect("accuracy assessed");
        assert!(accuracy.overall_accuracy >= 0.8);
        assert_eq!(accuracy.confusion_matrix.len(), 2);
        assert_eq!(accuracy.confusion_matrix.iter().flatten().sum::<u64>(), 2);
        assert_eq!(report.exports.len(), 3);
    }

    let classified: Raster<u8> = read_geotiff(dir.path().join("Landsat_Classified_2017.tif"), None).unwrap();
    for row in 0..3 {
        assert_eq!(classified.get(row, 0).unwrap(), 3);
        assert_eq!(classified.get(row, 2).unwrap(), 4);
    }
    let composite = read_band_stack(dir.path().join("Landsat_Composite_2017.tif")).unwrap();
    assert!(composite.contains("SR_B2") && composite.contains("SR_B7") && composite.contains("ST_B10"));
    let rgb = read_band_stack(dir.path().join("Landsat_RGB_2015.tif")).unwrap();
    assert_eq!(rgb.len(), 3);
    assert!(!dir.path().join("Landsat_Classified_2016.tif").exists());

    let recorded: Vec<i32> = reports.0.lock().unwrap().iter().map(|r| r.year).collect();
    assert_eq!(recorded, vec![2015, 2016, 2017]);

    let shown = viewer.0.lock().unwrap();
    assert_eq!(shown.len(), 1);
    let (year, layers) = &shown[0];
    assert_eq!(*year, 2017);
    let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Landsat_RGB_2017", "Landsat_Classified_2017"]);
    assert!(layers.iter().all(|l| l.pixels.len() == 3 * 3 * 4));
}

#[tokio::test]
async fn unsupported_year_is_fatal_before_any_work() {
    let dir = tempdir().unwrap();
    let archive = FakeArchive::with_years(&[1984]);
    let calls = Arc::clone(&archive.calls);
    let campaign = runner(config(1980, 1985, dir.path()), archive);

    let err = campaign.run(&MemoryReports::default(), None).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedYear { year: 1980 }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_campaign_leaves_years_cancelled() {
    let dir = tempdir().unwrap();
    let archive = FakeArchive::with_years(&[2000, 2001, 2002]);
    let calls = Arc::clone(&archive.calls);
    let campaign = runner(config(2000, 2002, dir.path()), archive);
    campaign.cancellation_token().cancel();

    let summary = campaign.run(&MemoryReports::default(), None).await.unwrap();
    assert_eq!(summary.cancelled, 3);
    assert!(summary.years.iter().all(|r| r.status == YearStatus::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("Landsat_Composite_2000.tif").exists());
}

#[tokio::test]
async fn over_limit_products_are_written_as_tiles() {
    let dir = tempdir().unwrap();
    let mut cfg = config(2016, 2016, dir.path());
    cfg.export.product_max_pixels = 4;
    let campaign = runner(cfg, FakeArchive::with_years(&[2016]));

    let summary = campaign.run(&MemoryReports::default(), None).await.unwrap();
    let report = summary.report(2016).unwrap();
    assert!(report.status.is_completed());
    assert!(report.warnings.is_empty());

    let parts: HashMap<&str, usize> = report.exports.iter().map(|r| (r.name.as_str(), r.parts)).collect();
    assert_eq!(parts["Landsat_Composite_2016"], 1);
    assert_eq!(parts["Landsat_RGB_2016"], 1);
    assert_eq!(parts["Landsat_Classified_2016"], 4);
    assert!(dir.path().join("Landsat_RGB_2016.tif").exists());

    let corner: Raster<u8> =
        read_geotiff(dir.path().join("Landsat_Classified_2016_r0_c2.tif"), None).unwrap();
    assert_eq!(corner.shape(), (2, 1));
    assert_eq!(corner.get(0, 0).unwrap(), 4);
    assert!(!dir.path().join("Landsat_Classified_2016.tif").exists());
}

#[tokio::test]
async fn transient_outage_is_retried() {
    let dir = tempdir().unwrap();
    let archive = FakeArchive {
        outages: Mutex::new(2),
        ..FakeArchive::with_years(&[2005])
    };
    let calls = Arc::clone(&archive.calls);
    let campaign = runner(config(2005, 2005, dir.path()), archive);

    let summary = campaign.run(&MemoryReports::default(), None).await.unwrap();
    assert!(summary.report(2005).unwrap().status.is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_outage_fails_the_year() {
    let dir = tempdir().unwrap();
    let archive = FakeArchive {
        outages: Mutex::new(usize::MAX),
        ..FakeArchive::with_years(&[2005])
    };
    let calls = Arc::clone(&archive.calls);
    let campaign = runner(config(2005, 2005, dir.path()), archive);

    let summary = campaign.run(&MemoryReports::default(), None).await.unwrap();
    let status = &summary.report(2005).unwrap().status;
    assert!(
        matches!(status, YearStatus::Failed { stage: Some(Stage::Select), error } if error.contains("unavailable")),
        "{status:?}"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn class_without_training_pixels_skips_the_year() {
    let dir = tempdir().unwrap();
    let archive = FakeArchive {
        cloudy_right: HashSet::from([1995]),
        ..FakeArchive::with_years(&[1995, 1996])
    };
    let campaign = runner(config(1995, 1996, dir.path()), archive);

    let summary = campaign.run(&MemoryReports::default(), None).await.unwrap();
    let cloudy = summary.report(1995).unwrap();
    assert_eq!(cloudy.sensor.as_deref(), Some("Landsat 5 TM"));
    assert!(
        matches!(cloudy.status, YearStatus::Skipped { stage: Stage::Train, .. }),
        "{:?}",
        cloudy.status
    );
    assert!(summary.report(1996).unwrap().status.is_completed());
}

#[tokio::test]
async fn empty_test_subset_completes_without_accuracy() {
    let dir = tempdir().unwrap();
    let mut cfg = config(2020, 2020, dir.path());
    cfg.split = SplitParams {
        test_fraction: 0.0,
        stratified: false,
        ..SplitParams::default()
    };
    let campaign = runner(cfg, FakeArchive::with_years(&[2020]));

    let summary = campaign.run(&MemoryReports::default(), None).await.unwrap();
    let report = summary.report(2020).unwrap();
    assert_eq!(report.status, YearStatus::Completed { accuracy: None });
    assert_eq!(report.test_size, 0);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.exports.len(), 3);
    assert_eq!(summary.mean_overall_accuracy, None);
}

#[tokio::test]
async fn unwritable_output_fails_the_year_at_report() {
    let dir = tempdir().unwrap();
    let sink = ReadOnlySink::default();
    let attempts = Arc::clone(&sink.attempts);
    let inputs = CampaignInputs::new(config(2005, 2006, dir.path()), roi(), samples()).unwrap();
    let campaign = CampaignRunner::new(inputs, FakeArchive::with_years(&[2005, 2006]), sink);
    let reports = MemoryReports::default();

    let summary = campaign.run(&reports, None).await.unwrap();
    assert_eq!(summary.failed, 2);
    for year in [2005, 2006] {
        let report = summary.report(year).unwrap();
        assert!(
            matches!(&report.status, YearStatus::Failed { stage: Some(Stage::Report), error } if error.contains("read-only")),
            "{:?}",
            report.status
        );
        assert!(report.warnings.is_empty());
        assert!(report.exports.is_empty());
    }
    // one attempt per year: the first product fails and is not retried
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(reports.0.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn default_unstratified_split_runs_end_to_end() {
    let dir = tempdir().unwrap();
    let mut cfg = config(2010, 2010, dir.path());
    cfg.split = SplitParams::default();
    assert!(!cfg.split.stratified);

    // 40 points per class keep both classes on both sides of a random split
    let mut points = Vec::new();
    for i in 0..40 {
        let dx = 0.012 * i as f64;
        points.push(point_in(i % 3, 0, dx, 3));
        points.push(point_in(i % 3, 2, dx, 4));
    }
    let inputs = CampaignInputs::new(cfg, roi(), LabeledSampleSet::new(points)).unwrap();
    let sink = GeoTiffDirSink::new(dir.path()).unwrap();
    let campaign = CampaignRunner::new(inputs, FakeArchive::with_years(&[2010]), sink);

    let summary = campaign.run(&MemoryReports::default(), None).await.unwrap();
    let report = summary.report(2010).unwrap();
    assert!(report.status.is_completed(), "{:?}", report.status);
    assert_eq!(report.sensor.as_deref(), Some("Landsat 7 ETM+"));
    assert_eq!(report.train_size + report.test_size, 80);
    assert!(report.test_size > 0 && report.test_size < 40);
    let accuracy = report.accuracy().expect("accuracy assessed");
    assert!(accuracy.overall_accuracy >= 0.8);

    let classified: Raster<u8> = read_geotiff(dir.path().join("Landsat_Classified_2010.tif"), None).unwrap();
    assert_eq!(classified.get(1, 0).unwrap(), 3);
    assert_eq!(classified.get(1, 2).unwrap(), 4);
}
