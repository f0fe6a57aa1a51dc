//! One year of the campaign, from archive query to exported products.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use covermap_algorithms::accuracy::evaluate;
use covermap_algorithms::classification::{classify_raster, Classifier};
use covermap_algorithms::compositing::median_composite;
use covermap_algorithms::radiometry::{correct_collection, ScaleFactors};
use covermap_algorithms::sampling::{sample_regions, split};
use covermap_colormap::{visualize_rgb, ClassPalette};
use covermap_core::raster::{BandStack, GridSpec, Raster};
use covermap_core::{
    ClassCatalog, ClassCode, CommonBand, Error, ExportFormat, ExportRaster, ExportRequest, ExportSink,
    ImageryArchive, LabeledSampleSet, RegionOfInterest, Result, SensorTable,
};

use crate::config::CampaignConfig;
use crate::report::{Stage, YearReport, YearStatus};
use crate::sink::export_product;

/// Everything shared, read-only, by all years of a campaign.
#[derive(Debug)]
pub struct CampaignInputs {
    pub config: CampaignConfig,
    pub roi: RegionOfInterest,
    pub samples: LabeledSampleSet,
    pub sensors: SensorTable,
    /// Grid covering the ROI; every product of every year lies on it.
    pub grid: GridSpec,
    /// Classes every year's model must learn: those present in `samples`.
    pub classes: Vec<ClassCode>,
    pub palette: ClassPalette,
}

impl CampaignInputs {
    /// `roi` and `samples` must be in the grid CRS (`config.grid.epsg`).
    pub fn new(config: CampaignConfig, roi: RegionOfInterest, samples: LabeledSampleSet) -> Result<Self> {
        config.validate()?;
        if samples.is_empty() {
            return Err(Error::InvalidParameter {
                name: "training",
                value: "0 samples".into(),
                reason: "the labeled sample set is empty".into(),
            });
        }
        let sensors = SensorTable::landsat().with_cloud_cover_max(config.cloud_cover_max);
        let grid = GridSpec::covering(roi.bounds(), config.grid.pixel_size, config.grid.epsg)?;
        let catalog = ClassCatalog::new(config.classes.classes.clone())?;
        let classes = samples.classes();
        for &class in classes.iter().filter(|&&c| !catalog.contains(c)) {
            warn!(class, "training class missing from the class catalog");
        }
        let palette = ClassPalette::from_catalog(&catalog)?;
        info!(
            rows = grid.rows,
            cols = grid.cols,
            epsg = grid.epsg,
            samples = samples.len(),
            classes = ?classes,
            "campaign inputs ready"
        );
        Ok(Self {
            config,
            roi,
            samples,
            sensors,
            grid,
            classes,
            palette,
        })
    }
}

/// Display layers of a completed year.
#[derive(Debug, Clone)]
pub struct YearLayers {
    /// Stretched true-colour bands named `vis-red`, `vis-green`, `vis-blue`.
    pub rgb: BandStack,
    pub classified: Raster<u8>,
}

/// Result of [`YearPipeline::run`].
#[derive(Debug, Clone)]
pub struct YearOutput {
    pub report: YearReport,
    /// Present only for completed years.
    pub layers: Option<YearLayers>,
}

impl YearOutput {
    pub fn cancelled(year: i32) -> Self {
        Self {
            report: YearReport::cancelled(year),
            layers: None,
        }
    }
}

/// Why a year stopped early.
enum Halt {
    Stage(Stage, Error),
    Cancelled,
}

fn at(stage: Stage) -> impl FnOnce(Error) -> Halt {
    move |e| Halt::Stage(stage, e)
}

fn checkpoint(cancel: &CancellationToken) -> std::result::Result<(), Halt> {
    if cancel.is_cancelled() {
        Err(Halt::Cancelled)
    } else {
        Ok(())
    }
}

/// Runs the stages of one year in order:
/// `Select → Correct → Composite → SampleSplit → Train → Classify → Evaluate → Report`.
///
/// Nothing produced here outlives the year except the exported products and
/// the report.
pub struct YearPipeline<A, E> {
    inputs: Arc<CampaignInputs>,
    archive: Arc<A>,
    exports: Arc<E>,
}

impl<A: ImageryArchive, E: ExportSink> YearPipeline<A, E> {
    pub fn new(inputs: Arc<CampaignInputs>, archive: Arc<A>, exports: Arc<E>) -> Self {
        Self {
            inputs,
            archive,
            exports,
        }
    }

    /// Process `year`. Never fails: every outcome is a [`YearStatus`].
    pub async fn run(&self, year: i32, cancel: &CancellationToken) -> YearOutput {
        let started = Instant::now();
        let mut report = YearReport::new(year);
        let layers = match self.stages(year, cancel, &mut report).await {
            Ok(layers) => Some(layers),
            Err(Halt::Cancelled) => {
                info!(year, "year cancelled");
                report.status = YearStatus::Cancelled;
                None
            }
            Err(Halt::Stage(stage, e)) => {
                report.status = YearStatus::from_error(stage, &e);
                match &report.status {
                    YearStatus::Skipped { .. } => warn!(year, %stage, reason = %e, "year skipped"),
                    _ => error!(year, %stage, error = %e, "year failed"),
                }
                None
            }
        };
        report.elapsed_secs = started.elapsed().as_secs_f64();
        YearOutput { report, layers }
    }

    /// Run a CPU-bound stage on the blocking pool.
    async fn blocking<T, F>(&self, year: i32, stage: Stage, f: F) -> std::result::Result<T, Halt>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let started = Instant::now();
        debug!(year, %stage, "stage started");
        let result = match tokio::task::spawn_blocking(f).await {
            Ok(result) => result,
            Err(e) => Err(Error::Algorithm(format!("{stage} task failed: {e}"))),
        };
        debug!(year, %stage, elapsed = ?started.elapsed(), ok = result.is_ok(), "stage finished");
        result.map_err(at(stage))
    }

    async fn stages(
        &self,
        year: i32,
        cancel: &CancellationToken,
        report: &mut YearReport,
    ) -> std::result::Result<YearLayers, Halt> {
        let inputs = &self.inputs;
        let config = &inputs.config;

        // Select
        checkpoint(cancel)?;
        let spec = inputs.sensors.resolve(year).map_err(at(Stage::Select))?;
        report.sensor = Some(spec.sensor.clone());
        report.archive_id = Some(spec.archive_id.clone());
        let feature_bands = spec.band_names(&CommonBand::ALL).map_err(at(Stage::Select))?;
        let [red, green, blue] = CommonBand::RGB;
        let rgb_bands = [
            spec.band_name(red).map_err(at(Stage::Select))?.to_string(),
            spec.band_name(green).map_err(at(Stage::Select))?.to_string(),
            spec.band_name(blue).map_err(at(Stage::Select))?.to_string(),
        ];
        let query = spec.query(year, inputs.roi.bounds()).map_err(at(Stage::Select))?;
        info!(year, archive = %query.archive_id, sensor = %spec.sensor, "querying archive");

        let archive = &*self.archive;
        let grid = &inputs.grid;
        let images = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Halt::Cancelled),
            result = config.retry.run("archive query", || archive.query(&query, grid)) => {
                result.map_err(at(Stage::Select))?
            }
        };
        if images.is_empty() {
            return Err(Halt::Stage(
                Stage::Select,
                Error::EmptyCollection(format!(
                    "{} has no scenes for {year} under {}% cloud cover",
                    query.archive_id, query.cloud_cover_max
                )),
            ));
        }
        report.scenes = images.len();
        info!(year, scenes = images.len(), "scenes selected");

        // Correct
        checkpoint(cancel)?;
        let corrected = self
            .blocking(year, Stage::Correct, move || {
                correct_collection(&images, &ScaleFactors::landsat_c2_l2())
            })
            .await?;

        // Composite
        checkpoint(cancel)?;
        let shared = Arc::clone(inputs);
        let composite = Arc::new(
            self.blocking(year, Stage::Composite, move || median_composite(&corrected, &shared.roi))
                .await?,
        );

        // SampleSplit
        checkpoint(cancel)?;
        let (shared, stack, bands) = (Arc::clone(inputs), Arc::clone(&composite), feature_bands.clone());
        let params = config.split.for_year(year);
        let parts = self
            .blocking(year, Stage::SampleSplit, move || {
                let features = sample_regions(&stack, &shared.samples, &bands)?;
                split(features, &params)
            })
            .await?;
        report.train_size = parts.train.len();
        report.test_size = parts.test.len();
        info!(year, train = parts.train.len(), test = parts.test.len(), "training data sampled");

        // Train
        checkpoint(cancel)?;
        let classifier = config.classifier;
        let classes = inputs.classes.clone();
        let train = parts.train;
        let model = Arc::new(
            self.blocking(year, Stage::Train, move || classifier.train(&train, &classes))
                .await?,
        );

        // Classify
        checkpoint(cancel)?;
        let (fitted, stack, bands) = (Arc::clone(&model), Arc::clone(&composite), feature_bands);
        let classified = self
            .blocking(year, Stage::Classify, move || classify_raster(&*fitted, &stack, &bands))
            .await?;

        // Evaluate
        checkpoint(cancel)?;
        let test = parts.test;
        let accuracy = match self
            .blocking(year, Stage::Evaluate, move || evaluate(&*model, &test))
            .await
        {
            Ok(accuracy) => {
                info!(
                    year,
                    overall_accuracy = accuracy.overall_accuracy,
                    kappa = accuracy.kappa,
                    classes = ?accuracy.classes,
                    "accuracy assessed"
                );
                Some(accuracy)
            }
            Err(Halt::Stage(_, Error::EmptyTestSet)) => {
                warn!(year, "test subset is empty, no accuracy assessment");
                report.warnings.push("test subset is empty; accuracy not assessed".into());
                None
            }
            Err(halt) => return Err(halt),
        };

        // Report
        checkpoint(cancel)?;
        let rgb = visualize_rgb(&composite, &rgb_bands, &config.stretch).map_err(at(Stage::Report))?;
        let limits = &config.export;
        let products = [
            (
                format!("Landsat_Composite_{year}"),
                ExportRaster::Bands(composite.as_ref()),
                limits.composite_max_pixels,
            ),
            (format!("Landsat_RGB_{year}"), ExportRaster::Bands(&rgb), limits.composite_max_pixels),
            (
                format!("Landsat_Classified_{year}"),
                ExportRaster::Classes(&classified),
                limits.product_max_pixels,
            ),
        ];
        for (name, raster, max_pixels) in products {
            let request = ExportRequest {
                name,
                raster,
                scale: config.grid.pixel_size,
                region: inputs.roi.bounds(),
                max_pixels,
                format: ExportFormat::GeoTiff,
            };
            match export_product(&*self.exports, request, &config.retry).await {
                Ok(receipt) => {
                    info!(year, name = %receipt.name, parts = receipt.parts, "product exported");
                    report.exports.push(receipt);
                }
                Err(e @ Error::ExportLimitExceeded { .. }) => {
                    warn!(year, error = %e, "product not exported");
                    report.warnings.push(e.to_string());
                }
                Err(e) => return Err(Halt::Stage(Stage::Report, e)),
            }
        }

        report.status = YearStatus::Completed { accuracy };
        info!(year, "year completed");
        Ok(YearLayers { rgb, classified })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covermap_core::vector::LabeledSample;
    use geo::{Geometry, Point};

    fn samples(classes: &[u8]) -> LabeledSampleSet {
        LabeledSampleSet::new(
            classes
                .iter()
                .enumerate()
                .map(|(i, &c)| {
                    LabeledSample::new(Geometry::Point(Point::new(10.0 + i as f64, 10.0)), c).unwrap()
                })
                .collect(),
        )
    }

    #[test]
    fn grid_covers_the_roi() {
        let roi = RegionOfInterest::from_bounds(0.0, 0.0, 95.0, 60.0).unwrap();
        let inputs = CampaignInputs::new(CampaignConfig::default(), roi, samples(&[3, 4, 3])).unwrap();
        assert_eq!((inputs.grid.rows, inputs.grid.cols), (2, 4));
        assert_eq!(inputs.grid.epsg, 32645);
        assert_eq!(inputs.classes, vec![3, 4]);
    }

    #[test]
    fn empty_sample_set_rejected() {
        let roi = RegionOfInterest::from_bounds(0.0, 0.0, 90.0, 90.0).unwrap();
        assert!(CampaignInputs::new(CampaignConfig::default(), roi, LabeledSampleSet::default()).is_err());
    }

    #[test]
    fn invalid_config_rejected() {
        let roi = RegionOfInterest::from_bounds(0.0, 0.0, 90.0, 90.0).unwrap();
        let config = CampaignConfig {
            max_concurrent_years: 0,
            ..CampaignConfig::default()
        };
        assert!(CampaignInputs::new(config, roi, samples(&[1])).is_err());
    }
}
