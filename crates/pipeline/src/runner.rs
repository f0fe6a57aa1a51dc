//! Multi-year campaign execution.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use covermap_colormap::{classes_to_rgba, rgb_to_rgba};
use covermap_core::{ExportSink, ImageryArchive, Result};

use crate::report::{CampaignSummary, ReportSink, YearReport, YearStatus};
use crate::sink::VisualizationSink;
use crate::year::{CampaignInputs, YearLayers, YearOutput, YearPipeline};

type YearCallback = Arc<dyn Fn(&YearReport) + Send + Sync>;

/// Drives one [`YearPipeline`] per configured year on a bounded worker pool.
///
/// Years are independent and may finish in any order; reports come back
/// ordered by year. Cancelling the token stops years that have not finished;
/// products already exported stay where they are.
pub struct CampaignRunner<A, E> {
    inputs: Arc<CampaignInputs>,
    archive: Arc<A>,
    exports: Arc<E>,
    cancel: CancellationToken,
    on_year: Option<YearCallback>,
}

impl<A, E> CampaignRunner<A, E>
where
    A: ImageryArchive + 'static,
    E: ExportSink + 'static,
{
    pub fn new(inputs: CampaignInputs, archive: A, exports: E) -> Self {
        Self {
            inputs: Arc::new(inputs),
            archive: Arc::new(archive),
            exports: Arc::new(exports),
            cancel: CancellationToken::new(),
            on_year: None,
        }
    }

    /// Call `f` with each year's report as soon as the year finishes.
    pub fn on_year_finished(mut self, f: impl Fn(&YearReport) + Send + Sync + 'static) -> Self {
        self.on_year = Some(Arc::new(f));
        self
    }

    /// Token that cancels this runner's campaign.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn inputs(&self) -> &CampaignInputs {
        &self.inputs
    }

    /// Run every year of the campaign.
    ///
    /// Fails up front with `Error::UnsupportedYear` if any configured year has
    /// no sensor; after that every year ends up in the summary, whatever
    /// happens to it. Each report is recorded in `reports`, in year order,
    /// and the most recent completed year is handed to `visualization`.
    pub async fn run(
        &self,
        reports: &dyn ReportSink,
        visualization: Option<&dyn VisualizationSink>,
    ) -> Result<CampaignSummary> {
        let config = &self.inputs.config;
        let years = config.years();
        self.inputs.sensors.validate(&years)?;
        info!(
            first = config.start_year,
            last = config.end_year,
            concurrency = config.max_concurrent_years,
            "campaign started"
        );

        let permits = Arc::new(Semaphore::new(config.max_concurrent_years.max(1)));
        let mut tasks = JoinSet::new();
        for &year in &years {
            let pipeline = YearPipeline::new(
                Arc::clone(&self.inputs),
                Arc::clone(&self.archive),
                Arc::clone(&self.exports),
            );
            let permits = Arc::clone(&permits);
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = permits.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return YearOutput::cancelled(year);
                };
                match AssertUnwindSafe(pipeline.run(year, &cancel)).catch_unwind().await {
                    Ok(output) => output,
                    Err(_) => {
                        error!(year, "year worker panicked");
                        YearOutput {
                            report: YearReport {
                                status: YearStatus::Failed {
                                    stage: None,
                                    error: "year worker panicked".into(),
                                },
                                ..YearReport::new(year)
                            },
                            layers: None,
                        }
                    }
                }
            });
        }

        let mut finished = Vec::with_capacity(years.len());
        let mut latest: Option<(i32, YearLayers)> = None;
        while let Some(joined) = tasks.join_next().await {
            let output = match joined {
                Ok(output) => output,
                Err(e) => {
                    error!(error = %e, "year task lost");
                    continue;
                }
            };
            if let Some(callback) = &self.on_year {
                callback(&output.report);
            }
            if let Some(layers) = output.layers {
                let year = output.report.year;
                if latest.as_ref().map_or(true, |(y, _)| year > *y) {
                    latest = Some((year, layers));
                }
            }
            finished.push(output.report);
        }
        finished.sort_by_key(|r| r.year);

        for report in &finished {
            if let Err(e) = reports.record(report) {
                warn!(year = report.year, error = %e, "report not recorded");
            }
        }

        if let (Some(sink), Some((year, layers))) = (visualization, latest) {
            if let Err(e) = self.visualize(sink, year, &layers) {
                warn!(year, error = %e, "visualization failed");
            }
        }

        let summary = CampaignSummary::new(config.start_year, config.end_year, finished);
        info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "campaign finished"
        );
        Ok(summary)
    }

    fn visualize(&self, sink: &dyn VisualizationSink, year: i32, layers: &YearLayers) -> Result<()> {
        let rgb = rgb_to_rgba(&layers.rgb, format!("Landsat_RGB_{year}"))?;
        let classes = classes_to_rgba(
            &layers.classified,
            &self.inputs.palette,
            format!("Landsat_Classified_{year}"),
        );
        info!(year, "sending layers to visualization");
        sink.show(year, &[rgb, classes])
    }
}
