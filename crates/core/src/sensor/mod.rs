//! Year → sensor resolution.
//!
//! The Landsat record is served by four instrument generations with
//! different band numbering. A [`SensorTable`] maps each calendar year to the
//! one archive that covers it and knows how the six common bands are named in
//! that archive, so every downstream stage can work in common band terms.

mod table;

pub use table::SensorTable;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// The spectral bands every Landsat generation shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommonBand {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

impl CommonBand {
    /// The six classification features, blue through SWIR-2.
    pub const ALL: [CommonBand; 6] = [
        CommonBand::Blue,
        CommonBand::Green,
        CommonBand::Red,
        CommonBand::Nir,
        CommonBand::Swir1,
        CommonBand::Swir2,
    ];

    /// Red, green, blue: the true-colour display order.
    pub const RGB: [CommonBand; 3] = [CommonBand::Red, CommonBand::Green, CommonBand::Blue];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommonBand::Blue => "blue",
            CommonBand::Green => "green",
            CommonBand::Red => "red",
            CommonBand::Nir => "nir",
            CommonBand::Swir1 => "swir1",
            CommonBand::Swir2 => "swir2",
        }
    }
}

impl fmt::Display for CommonBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default cloud-cover ceiling in percent.
pub const DEFAULT_CLOUD_COVER_MAX: f64 = 10.0;

/// One archive's coverage and band naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSpec {
    /// First year covered (inclusive).
    pub start_year: i32,
    /// First year no longer covered (exclusive).
    pub end_year: i32,
    /// Archive / collection identifier, e.g. `LANDSAT/LC08/C02/T1_L2`.
    pub archive_id: String,
    /// Human-readable instrument name.
    pub sensor: String,
    /// Archive band name for each common band.
    pub bands: BTreeMap<CommonBand, String>,
    /// Thermal band names (surface temperature product).
    pub thermal_bands: Vec<String>,
    /// Scenes must report strictly less cloud cover than this (percent).
    pub cloud_cover_max: f64,
}

impl SensorSpec {
    /// Whether `year` falls in `[start_year, end_year)`.
    pub fn covers(&self, year: i32) -> bool {
        (self.start_year..self.end_year).contains(&year)
    }

    /// Archive name of a common band.
    pub fn band_name(&self, band: CommonBand) -> Result<&str> {
        self.bands
            .get(&band)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingBand(format!("{} has no {band} band", self.sensor)))
    }

    /// Archive names of several common bands, in order.
    pub fn band_names(&self, bands: &[CommonBand]) -> Result<Vec<String>> {
        bands.iter().map(|&b| self.band_name(b).map(str::to_string)).collect()
    }

    /// Every band the pipeline needs from the archive: optical then thermal.
    pub fn archive_bands(&self) -> Vec<String> {
        self.bands
            .values()
            .cloned()
            .chain(self.thermal_bands.iter().cloned())
            .collect()
    }

    /// Build the archive query for one calendar year over `bounds`.
    pub fn query(&self, year: i32, bounds: (f64, f64, f64, f64)) -> Result<ArchiveQuery> {
        if !self.covers(year) {
            return Err(Error::UnsupportedYear { year });
        }
        Ok(ArchiveQuery {
            archive_id: self.archive_id.clone(),
            year,
            dates: DateRange::calendar_year(year)?,
            bounds,
            cloud_cover_max: self.cloud_cover_max,
            bands: self.archive_bands(),
        })
    }
}

/// Half-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// January 1st of `year` up to January 1st of the following year.
    pub fn calendar_year(year: i32) -> Result<Self> {
        let date = |y: i32| {
            NaiveDate::from_ymd_opt(y, 1, 1).ok_or(Error::UnsupportedYear { year })
        };
        Ok(Self {
            start: date(year)?,
            end: date(year + 1)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    /// RFC 3339 interval string as used by STAC `datetime` filters.
    pub fn to_interval(&self) -> String {
        format!("{}T00:00:00Z/{}T00:00:00Z", self.start, self.end)
    }
}

/// The four predicates the imagery archive filters by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveQuery {
    pub archive_id: String,
    pub year: i32,
    pub dates: DateRange,
    /// `(min_x, min_y, max_x, max_y)` of the ROI in the campaign CRS.
    pub bounds: (f64, f64, f64, f64),
    pub cloud_cover_max: f64,
    /// Archive band names to fetch.
    pub bands: Vec<String>,
}

impl ArchiveQuery {
    /// The cloud-cover predicate is strict: a scene at exactly the ceiling is dropped.
    pub fn accepts_cloud_cover(&self, cloud_cover: f64) -> bool {
        cloud_cover < self.cloud_cover_max
    }
}
