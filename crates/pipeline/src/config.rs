//! Campaign configuration.
//!
//! A campaign is described by one TOML file. Every field has a default, so
//! an empty file describes the reference campaign: Landsat 1987 through
//! 2023 at 30 m in UTM zone 45N, five land-cover classes, 100 boosted trees.
//!
//! ```toml
//! start_year = 1990
//! end_year = 2000
//! roi = "roi.geojson"
//! training = ["water.geojson", "forest.geojson"]
//!
//! [grid]
//! epsg = 32645
//! pixel_size = 30.0
//!
//! [export]
//! output_dir = "out"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use covermap_algorithms::classification::GradientTreeBoost;
use covermap_algorithms::sampling::SplitParams;
use covermap_colormap::RgbStretch;
use covermap_core::export::{COMPOSITE_MAX_PIXELS, PRODUCT_MAX_PIXELS};
use covermap_core::sensor::DEFAULT_CLOUD_COVER_MAX;
use covermap_core::{ClassCatalog, Error};

use crate::retry::RetryPolicy;

/// Failure to load a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] Error),
}

/// The pixel grid every product is written on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub epsg: u32,
    /// Cell size in units of `epsg` (metres for UTM).
    pub pixel_size: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            epsg: 32645,
            pixel_size: 30.0,
        }
    }
}

/// Where and how large products may be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    /// Ceiling of the composite and RGB exports.
    pub composite_max_pixels: u64,
    /// Ceiling of the classified export.
    pub product_max_pixels: u64,
    /// JSON-lines accuracy records, relative to `output_dir`.
    pub report_file: String,
    /// Campaign summary, relative to `output_dir`.
    pub summary_file: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("covermap-out"),
            composite_max_pixels: COMPOSITE_MAX_PIXELS,
            product_max_pixels: PRODUCT_MAX_PIXELS,
            report_file: "accuracy.jsonl".into(),
            summary_file: "summary.json".into(),
        }
    }
}

impl ExportConfig {
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(&self.summary_file)
    }
}

/// Imagery archive connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// `planetary-computer`, `earth-search`, or a STAC search URL.
    pub catalog: String,
    /// Scenes downloaded at the same time within one year.
    pub concurrent_scenes: usize,
    pub download_timeout_secs: u64,
    /// Most scenes accepted from one search.
    pub max_items: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            catalog: "planetary-computer".into(),
            concurrent_scenes: 2,
            download_timeout_secs: 300,
            max_items: 500,
        }
    }
}

/// A full multi-year campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// First year processed (inclusive).
    pub start_year: i32,
    /// Last year processed (inclusive).
    pub end_year: i32,
    /// GeoJSON file with the region of interest.
    pub roi: PathBuf,
    /// GeoJSON files with labeled training geometries; merged in order.
    pub training: Vec<PathBuf>,
    /// Integer property holding the class code of a training feature.
    pub class_property: String,
    /// CRS of the GeoJSON inputs.
    pub input_epsg: u32,
    pub grid: GridConfig,
    /// Scenes must report strictly less cloud cover than this (percent).
    pub cloud_cover_max: f64,
    pub classes: ClassCatalog,
    pub classifier: GradientTreeBoost,
    pub split: SplitParams,
    pub stretch: RgbStretch,
    pub export: ExportConfig,
    pub archive: ArchiveConfig,
    pub max_concurrent_years: usize,
    pub retry: RetryPolicy,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            start_year: 1987,
            end_year: 2023,
            roi: PathBuf::from("roi.geojson"),
            training: vec![PathBuf::from("training.geojson")],
            class_property: "Class".into(),
            input_epsg: 4326,
            grid: GridConfig::default(),
            cloud_cover_max: DEFAULT_CLOUD_COVER_MAX,
            classes: ClassCatalog::landcover(),
            classifier: GradientTreeBoost::default(),
            split: SplitParams::default(),
            stretch: RgbStretch::default(),
            export: ExportConfig::default(),
            archive: ArchiveConfig::default(),
            max_concurrent_years: 2,
            retry: RetryPolicy::default(),
        }
    }
}

impl CampaignConfig {
    /// Read and validate a TOML file. Relative input and output paths are
    /// resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.roi);
        self.training.iter_mut().for_each(rebase);
        rebase(&mut self.export.output_dir);
    }

    /// Every year of the campaign, ascending.
    pub fn years(&self) -> Vec<i32> {
        (self.start_year..=self.end_year).collect()
    }

    pub fn validate(&self) -> covermap_core::Result<()> {
        let invalid = |name: &'static str, value: String, reason: &str| Error::InvalidParameter {
            name,
            value,
            reason: reason.into(),
        };
        if self.start_year > self.end_year {
            return Err(invalid(
                "end_year",
                self.end_year.to_string(),
                &format!("before start_year {}", self.start_year),
            ));
        }
        if !(self.grid.pixel_size.is_finite() && self.grid.pixel_size > 0.0) {
            return Err(invalid("grid.pixel_size", self.grid.pixel_size.to_string(), "must be positive"));
        }
        if !(self.cloud_cover_max > 0.0 && self.cloud_cover_max <= 100.0) {
            return Err(invalid(
                "cloud_cover_max",
                self.cloud_cover_max.to_string(),
                "must be in (0, 100]",
            ));
        }
        if self.max_concurrent_years == 0 {
            return Err(invalid("max_concurrent_years", "0".into(), "must be at least 1"));
        }
        if self.training.is_empty() {
            return Err(invalid("training", "[]".into(), "at least one training file is needed"));
        }
        if self.class_property.is_empty() {
            return Err(invalid("class_property", String::new(), "must not be empty"));
        }
        if self.export.composite_max_pixels == 0 || self.export.product_max_pixels == 0 {
            return Err(invalid("export.max_pixels", "0".into(), "must be positive"));
        }
        let catalog = ClassCatalog::new(self.classes.classes.clone())?;
        for class in &catalog.classes {
            class.rgb()?;
        }
        self.classifier.validate()?;
        self.split.validate()?;
        self.stretch.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_is_the_reference_campaign() {
        let config = CampaignConfig::from_toml_str("").unwrap();
        assert_eq!(config, CampaignConfig::default());
        assert_eq!(config.years().first(), Some(&1987));
        assert_eq!(config.years().len(), 37);
        assert_eq!(config.classifier.tree_count, 100);
        assert_eq!(config.export.product_max_pixels, 10_000_000);
        assert_eq!(config.classes.codes(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = CampaignConfig::from_toml_str(
            r#"
            start_year = 2013
            end_year = 2014
            max_concurrent_years = 4

            [split]
            stratified = true

            [export]
            product_max_pixels = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.years(), vec![2013, 2014]);
        assert!(config.split.stratified);
        assert_eq!(config.split.test_fraction, 0.2);
        assert_eq!(config.export.product_max_pixels, 5000);
        assert_eq!(config.export.composite_max_pixels, COMPOSITE_MAX_PIXELS);
        assert_eq!(config.grid.pixel_size, 30.0);
    }

    #[test]
    fn invalid_values_rejected() {
        for text in [
            "start_year = 2001\nend_year = 2000",
            "max_concurrent_years = 0",
            "cloud_cover_max = 0.0",
            "[grid]\npixel_size = -30.0",
            "[split]\ntest_fraction = 1.5",
            "[classifier]\nshrinkage = 0.0",
            "[export]\nproduct_max_pixels = 0",
        ] {
            assert!(
                matches!(CampaignConfig::from_toml_str(text), Err(ConfigError::Invalid(_))),
                "accepted: {text}"
            );
        }
        assert!(matches!(
            CampaignConfig::from_toml_str("start_year = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn custom_class_catalog() {
        let config = CampaignConfig::from_toml_str(
            r##"
            [[classes.classes]]
            code = 1
            name = "snow"
            color = "#ffffff"

            [[classes.classes]]
            code = 1
            name = "ice"
            color = "#eeeeee"
            "##,
        );
        assert!(matches!(config, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("campaign.toml");
        std::fs::write(&path, "roi = \"aoi.geojson\"\ntraining = [\"/abs/t.geojson\"]\n").unwrap();

        let config = CampaignConfig::load(&path).unwrap();
        assert_eq!(config.roi, dir.path().join("aoi.geojson"));
        assert_eq!(config.training, vec![PathBuf::from("/abs/t.geojson")]);
        assert_eq!(config.export.output_dir, dir.path().join("covermap-out"));
    }

    #[test]
    fn serialized_default_parses_back() {
        let text = CampaignConfig::default().to_toml_string().unwrap();
        assert_eq!(CampaignConfig::from_toml_str(&text).unwrap(), CampaignConfig::default());
    }
}
