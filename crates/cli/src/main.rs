//! covermap CLI - multi-year Landsat land-cover classification

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geo::{Coord, Geometry, MapCoords};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use covermap_cloud::reproject::PointTransform;
use covermap_cloud::{StacArchive, StacArchiveOptions, StacCatalog, StacClientOptions};
use covermap_colormap::RgbaImage;
use covermap_core::io::read_band_stack;
use covermap_core::vector::{read_geometries, read_labeled_features};
use covermap_core::{GridSpec, LabeledSample, LabeledSampleSet, RegionOfInterest};
use covermap_pipeline::{
    ArchiveConfig, CampaignConfig, CampaignInputs, CampaignRunner, CampaignSummary, GeoTiffDirSink,
    JsonLinesReportSink, VisualizationSink, YearStatus,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "covermap")]
#[command(author, version, about = "Multi-year Landsat land-cover classification", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a classification campaign
    Run {
        /// Campaign configuration (TOML)
        config: PathBuf,
        /// First year, overriding the configuration
        #[arg(long)]
        start_year: Option<i32>,
        /// Last year, overriding the configuration
        #[arg(long)]
        end_year: Option<i32>,
        /// Output directory, overriding the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Years processed at the same time
        #[arg(short = 'j', long, env = "COVERMAP_CONCURRENCY")]
        concurrency: Option<usize>,
        /// STAC catalog: pc, es, or an API URL
        #[arg(long, env = "COVERMAP_CATALOG")]
        catalog: Option<String>,
        /// Skip the PNG previews of the latest completed year
        #[arg(long)]
        no_preview: bool,
    },
    /// Show which Landsat archive serves each year of a campaign
    Resolve {
        /// Campaign configuration (TOML)
        config: PathBuf,
        /// Also count matching scenes in the STAC catalog
        #[arg(long)]
        scenes: bool,
    },
    /// Write a configuration file with every default spelled out
    Init {
        /// Output file
        #[arg(default_value = "covermap.toml")]
        output: PathBuf,
    },
    /// Show information about an exported GeoTIFF
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging already initialised");
    }
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn year_bar(years: usize) -> ProgressBar {
    let pb = ProgressBar::new(years as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} years {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

fn load_config(path: &Path) -> Result<CampaignConfig> {
    CampaignConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn to_grid(geometry: Geometry<f64>, transform: &PointTransform) -> Geometry<f64> {
    if transform.is_identity() {
        return geometry;
    }
    geometry.map_coords(|c| {
        let (x, y) = transform.apply(c.x, c.y);
        Coord { x, y }
    })
}

fn read_roi(config: &CampaignConfig, transform: &PointTransform) -> Result<RegionOfInterest> {
    let text = std::fs::read_to_string(&config.roi)
        .with_context(|| format!("Failed to read ROI {}", config.roi.display()))?;
    let geometries = read_geometries(&text).context("Invalid ROI GeoJSON")?;
    RegionOfInterest::from_geometries(geometries.into_iter().map(|g| to_grid(g, transform)))
        .context("Invalid region of interest")
}

fn read_samples(config: &CampaignConfig, transform: &PointTransform) -> Result<LabeledSampleSet> {
    let mut all = LabeledSampleSet::default();
    for path in &config.training {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read training samples {}", path.display()))?;
        let samples = read_labeled_features(&text, &config.class_property)
            .with_context(|| format!("Invalid training GeoJSON {}", path.display()))?
            .into_iter()
            .map(|(g, class)| LabeledSample::new(to_grid(g, transform), class))
            .collect::<covermap_core::Result<Vec<_>>>()
            .with_context(|| format!("Invalid training sample in {}", path.display()))?;
        info!("{}: {} samples", path.display(), samples.len());
        all = all.merge(LabeledSampleSet::new(samples));
    }
    Ok(all)
}

fn stac_archive(config: &ArchiveConfig) -> Result<StacArchive> {
    let options = StacArchiveOptions {
        catalog: StacCatalog::from_str_or_url(&config.catalog),
        search: StacClientOptions {
            max_items: config.max_items,
            ..StacClientOptions::default()
        },
        download_timeout: Duration::from_secs(config.download_timeout_secs),
        concurrent_scenes: config.concurrent_scenes,
        ..StacArchiveOptions::default()
    };
    StacArchive::new(options).context("Failed to create STAC client")
}

/// Writes each visualization layer as `<name>.png`.
struct PngPreview {
    dir: PathBuf,
}

impl VisualizationSink for PngPreview {
    fn show(&self, year: i32, layers: &[RgbaImage]) -> covermap_core::Result<()> {
        for layer in layers {
            let path = self.dir.join(format!("{}.png", layer.name));
            image::save_buffer(
                &path,
                &layer.pixels,
                layer.width as u32,
                layer.height as u32,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| covermap_core::Error::Other(format!("{}: {e}", path.display())))?;
            info!(year, path = %path.display(), "preview written");
        }
        Ok(())
    }
}

fn print_summary(summary: &CampaignSummary) {
    println!(
        "\n{:<6} {:<24} {:<10} {:>7} {:>7}  {}",
        "Year", "Sensor", "Status", "OA", "Kappa", "Note"
    );
    for r in &summary.years {
        let (oa, kappa) = match r.accuracy() {
            Some(a) => (format!("{:.3}", a.overall_accuracy), format!("{:.3}", a.kappa)),
            None => ("-".into(), "-".into()),
        };
        let note = match &r.status {
            YearStatus::Skipped { stage, reason } => format!("{stage}: {reason}"),
            YearStatus::Failed { stage: Some(stage), error } => format!("{stage}: {error}"),
            YearStatus::Failed { stage: None, error } => error.clone(),
            _ => r.warnings.join("; "),
        };
        println!(
            "{:<6} {:<24} {:<10} {:>7} {:>7}  {}",
            r.year,
            r.sensor.as_deref().unwrap_or("-"),
            r.status.label(),
            oa,
            kappa,
            note
        );
    }
    println!(
        "\n{} completed, {} skipped, {} failed, {} cancelled",
        summary.completed, summary.skipped, summary.failed, summary.cancelled
    );
    if let Some(mean) = summary.mean_overall_accuracy {
        println!("Mean overall accuracy: {:.3}", mean);
    }
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

async fn run_campaign(
    path: &Path,
    start_year: Option<i32>,
    end_year: Option<i32>,
    output: Option<PathBuf>,
    concurrency: Option<usize>,
    catalog: Option<String>,
    no_preview: bool,
) -> Result<()> {
    let mut config = load_config(path)?;
    if let Some(y) = start_year {
        config.start_year = y;
    }
    if let Some(y) = end_year {
        config.end_year = y;
    }
    if let Some(dir) = output {
        config.export.output_dir = dir;
    }
    if let Some(n) = concurrency {
        config.max_concurrent_years = n;
    }
    if let Some(c) = catalog {
        config.archive.catalog = c;
    }
    config.validate().context("Invalid configuration")?;

    let pb = spinner("Reading vector inputs...");
    let transform = PointTransform::new(config.input_epsg, config.grid.epsg)
        .context("Unsupported input or grid CRS")?;
    let roi = read_roi(&config, &transform)?;
    let samples = read_samples(&config, &transform)?;
    pb.finish_and_clear();
    info!(
        "ROI bounds {:?}, {} training samples in {} classes",
        roi.bounds(),
        samples.len(),
        samples.classes().len()
    );

    let output_dir = config.export.output_dir.clone();
    let report_path = config.export.report_path();
    let summary_path = config.export.summary_path();
    let years = config.years().len();

    let exports = GeoTiffDirSink::new(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let archive = stac_archive(&config.archive)?;
    let inputs = CampaignInputs::new(config, roi, samples).context("Invalid campaign inputs")?;

    let bar = year_bar(years);
    let progress = bar.clone();
    let runner = CampaignRunner::new(inputs, archive, exports).on_year_finished(move |report| {
        progress.inc(1);
        progress.set_message(format!("{} {}", report.year, report.status.label()));
    });

    let token = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling unfinished years");
            token.cancel();
        }
    });

    let reports = JsonLinesReportSink::create(&report_path)
        .with_context(|| format!("Failed to create {}", report_path.display()))?;
    let preview = PngPreview { dir: output_dir };
    let visualization: Option<&dyn VisualizationSink> = if no_preview { None } else { Some(&preview) };

    let start = Instant::now();
    let summary = runner.run(&reports, visualization).await.context("Campaign failed")?;
    bar.finish_and_clear();

    summary
        .write_json(&summary_path)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    print_summary(&summary);
    done("Summary", &summary_path, start.elapsed());
    Ok(())
}

async fn resolve_years(path: &Path, scenes: bool) -> Result<()> {
    let config = load_config(path)?;
    let sensors = covermap_core::SensorTable::landsat().with_cloud_cover_max(config.cloud_cover_max);

    let search = if scenes {
        let transform = PointTransform::new(config.input_epsg, config.grid.epsg)
            .context("Unsupported input or grid CRS")?;
        let roi = read_roi(&config, &transform)?;
        let grid = GridSpec::covering(roi.bounds(), config.grid.pixel_size, config.grid.epsg)?;
        Some((stac_archive(&config.archive)?, roi, grid))
    } else {
        None
    };

    println!("{:<6} {:<26} {:<24} {:>7}", "Year", "Archive", "Sensor", "Scenes");
    for year in config.years() {
        let spec = match sensors.resolve(year) {
            Ok(spec) => spec,
            Err(e) => {
                println!("{:<6} {}", year, e);
                continue;
            }
        };
        let count = match &search {
            Some((archive, roi, grid)) => {
                let query = spec.query(year, roi.bounds())?;
                match archive.search(&query, grid).await {
                    Ok(items) => items.len().to_string(),
                    Err(e) => {
                        warn!(year, error = %e, "scene search failed");
                        "?".into()
                    }
                }
            }
            None => "-".into(),
        };
        println!("{:<6} {:<26} {:<24} {:>7}", year, spec.archive_id, spec.sensor, count);
    }
    Ok(())
}

fn write_default_config(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }
    let text = CampaignConfig::default().to_toml_string()?;
    std::fs::write(output, text).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}

fn show_info(input: &Path) -> Result<()> {
    let pb = spinner("Reading raster...");
    let stack = read_band_stack(input).context("Failed to read raster")?;
    pb.finish_and_clear();

    let (rows, cols) = stack.shape();
    let transform = stack.transform();
    let bounds = transform.bounds(cols, rows);
    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, rows * cols);
    println!("Cell size: {}", transform.cell_size());
    println!(
        "Bounds: ({:.3}, {:.3}) - ({:.3}, {:.3})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(epsg) = stack.epsg() {
        println!("CRS: EPSG:{}", epsg);
    }
    println!("\nBands:");
    for (name, band) in stack.iter() {
        let stats = band.statistics();
        match (stats.min, stats.max, stats.mean) {
            (Some(min), Some(max), Some(mean)) => println!(
                "  {:<12} min {:.4}  max {:.4}  mean {:.4}  valid {}",
                name, min, max, mean, stats.valid_count
            ),
            _ => println!("  {:<12} no valid cells", name),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            start_year,
            end_year,
            output,
            concurrency,
            catalog,
            no_preview,
        } => run_campaign(&config, start_year, end_year, output, concurrency, catalog, no_preview).await,
        Commands::Resolve { config, scenes } => resolve_years(&config, scenes).await,
        Commands::Init { output } => write_default_config(&output),
        Commands::Info { input } => show_info(&input),
    }
}
