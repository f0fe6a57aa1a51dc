//! # covermap pipeline
//!
//! Turns a campaign configuration into per-year products.
//!
//! - [`YearPipeline`]: one year, stage by stage, ending in a [`YearStatus`]
//! - [`CampaignRunner`]: every year of the range on a bounded worker pool,
//!   with cancellation and an ordered [`CampaignSummary`]
//! - [`CampaignConfig`]: TOML configuration with defaults for every field
//! - [`GeoTiffDirSink`], [`JsonLinesReportSink`]: file-backed collaborators
//! - [`RetryPolicy`]: timeout and backoff around archive and export calls

pub mod config;
pub mod report;
pub mod retry;
pub mod runner;
pub mod sink;
pub mod tiles;
pub mod year;

pub use config::{ArchiveConfig, CampaignConfig, ConfigError, ExportConfig, GridConfig};
pub use report::{CampaignSummary, JsonLinesReportSink, ReportSink, Stage, YearReport, YearStatus};
pub use retry::RetryPolicy;
pub use runner::CampaignRunner;
pub use sink::{export_product, GeoTiffDirSink, VisualizationSink};
pub use tiles::{Tile, TileIterator};
pub use year::{CampaignInputs, YearLayers, YearOutput, YearPipeline};
