use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ArchiveQuery, CommonBand, SensorSpec, DEFAULT_CLOUD_COVER_MAX};
use crate::error::{Error, Result};

/// Ordered, gap-free list of [`SensorSpec`]s.
///
/// Ranges are half-open and contiguous, so every year inside the table's span
/// resolves to exactly one archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorTable {
    specs: Vec<SensorSpec>,
}

fn tm_bands() -> BTreeMap<CommonBand, String> {
    [
        (CommonBand::Blue, "SR_B1"),
        (CommonBand::Green, "SR_B2"),
        (CommonBand::Red, "SR_B3"),
        (CommonBand::Nir, "SR_B4"),
        (CommonBand::Swir1, "SR_B5"),
        (CommonBand::Swir2, "SR_B7"),
    ]
    .into_iter()
    .map(|(b, n)| (b, n.to_string()))
    .collect()
}

fn oli_bands() -> BTreeMap<CommonBand, String> {
    [
        (CommonBand::Blue, "SR_B2"),
        (CommonBand::Green, "SR_B3"),
        (CommonBand::Red, "SR_B4"),
        (CommonBand::Nir, "SR_B5"),
        (CommonBand::Swir1, "SR_B6"),
        (CommonBand::Swir2, "SR_B7"),
    ]
    .into_iter()
    .map(|(b, n)| (b, n.to_string()))
    .collect()
}

fn spec(start: i32, end: i32, platform: &str, sensor: &str, oli: bool) -> SensorSpec {
    SensorSpec {
        start_year: start,
        end_year: end,
        archive_id: format!("LANDSAT/{platform}/C02/T1_L2"),
        sensor: sensor.to_string(),
        bands: if oli { oli_bands() } else { tm_bands() },
        thermal_bands: vec![if oli { "ST_B10" } else { "ST_B6" }.to_string()],
        cloud_cover_max: DEFAULT_CLOUD_COVER_MAX,
    }
}

impl SensorTable {
    /// Validate and build a table. Specs are sorted by start year; each must
    /// begin exactly where the previous one ends.
    pub fn new(mut specs: Vec<SensorSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::InvalidParameter {
                name: "sensors",
                value: "[]".into(),
                reason: "sensor table is empty".into(),
            });
        }
        specs.sort_by_key(|s| s.start_year);
        for s in &specs {
            if s.start_year >= s.end_year {
                return Err(Error::InvalidParameter {
                    name: "sensors",
                    value: format!("{}..{}", s.start_year, s.end_year),
                    reason: format!("{} has an empty year range", s.archive_id),
                });
            }
            for band in CommonBand::ALL {
                s.band_name(band)?;
            }
        }
        for w in specs.windows(2) {
            if w[0].end_year != w[1].start_year {
                let reason = if w[0].end_year > w[1].start_year {
                    "year ranges overlap"
                } else {
                    "year ranges leave a gap"
                };
                return Err(Error::InvalidParameter {
                    name: "sensors",
                    value: format!("{} / {}", w[0].archive_id, w[1].archive_id),
                    reason: reason.into(),
                });
            }
        }
        Ok(Self { specs })
    }

    /// Landsat Collection 2 Level-2, Tier 1:
    ///
    /// | years        | archive |
    /// |--------------|---------|
    /// | 1984 – 1998  | LT05    |
    /// | 1999 – 2012  | LE07    |
    /// | 2013 – 2021  | LC08    |
    /// | 2022 – 2099  | LC09    |
    pub fn landsat() -> Self {
        Self {
            specs: vec![
                spec(1984, 1999, "LT05", "Landsat 5 TM", false),
                spec(1999, 2013, "LE07", "Landsat 7 ETM+", false),
                spec(2013, 2022, "LC08", "Landsat 8 OLI/TIRS", true),
                spec(2022, 2100, "LC09", "Landsat 9 OLI-2/TIRS-2", true),
            ],
        }
    }

    /// Same table with a different cloud-cover ceiling on every archive.
    pub fn with_cloud_cover_max(mut self, max: f64) -> Self {
        for s in &mut self.specs {
            s.cloud_cover_max = max;
        }
        self
    }

    /// The archive covering `year`.
    pub fn resolve(&self, year: i32) -> Result<&SensorSpec> {
        self.specs
            .iter()
            .find(|s| s.covers(year))
            .ok_or(Error::UnsupportedYear { year })
    }

    /// Resolve every year up front; the first unsupported one is returned as
    /// the error.
    pub fn validate(&self, years: &[i32]) -> Result<()> {
        years.iter().try_for_each(|&y| self.resolve(y).map(|_| ()))
    }

    /// Resolve `year` and build its archive query.
    pub fn query(&self, year: i32, bounds: (f64, f64, f64, f64)) -> Result<ArchiveQuery> {
        self.resolve(year)?.query(year, bounds)
    }

    /// `[first, last)` year covered.
    pub fn span(&self) -> (i32, i32) {
        let first = self.specs.first().map(|s| s.start_year).unwrap_or(0);
        let last = self.specs.last().map(|s| s.end_year).unwrap_or(0);
        (first, last)
    }

    pub fn specs(&self) -> &[SensorSpec] {
        &self.specs
    }
}

impl Default for SensorTable {
    fn default() -> Self {
        Self::landsat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_year_resolves_once() {
        let table = SensorTable::landsat();
        for year in 1984..2100 {
            let hits = table.specs().iter().filter(|s| s.covers(year)).count();
            assert_eq!(hits, 1, "year {year}");
            assert!(table.resolve(year).is_ok());
        }
        assert_eq!(table.span(), (1984, 2100));
    }

    #[test]
    fn boundary_years() {
        let table = SensorTable::landsat();
        let id = |y| table.resolve(y).unwrap().archive_id.clone();
        assert_eq!(id(1998), "LANDSAT/LT05/C02/T1_L2");
        assert_eq!(id(1999), "LANDSAT/LE07/C02/T1_L2");
        assert_eq!(id(2012), "LANDSAT/LE07/C02/T1_L2");
        assert_eq!(id(2013), "LANDSAT/LC08/C02/T1_L2");
        assert_eq!(id(2021), "LANDSAT/LC08/C02/T1_L2");
        assert_eq!(id(2022), "LANDSAT/LC09/C02/T1_L2");
        assert_eq!(id(2099), "LANDSAT/LC09/C02/T1_L2");
    }

    #[test]
    fn out_of_range_years_fail() {
        let table = SensorTable::landsat();
        assert!(matches!(table.resolve(1983), Err(Error::UnsupportedYear { year: 1983 })));
        assert!(matches!(table.resolve(2100), Err(Error::UnsupportedYear { year: 2100 })));
        assert!(table.validate(&[2000, 2010, 1970]).is_err());
        assert!(table.validate(&[1990, 2000, 2020, 2023]).is_ok());
    }

    #[test]
    fn band_names_follow_the_instrument() {
        let table = SensorTable::landsat();
        assert_eq!(table.resolve(2005).unwrap().band_name(CommonBand::Blue).unwrap(), "SR_B1");
        assert_eq!(table.resolve(2015).unwrap().band_name(CommonBand::Blue).unwrap(), "SR_B2");
        assert_eq!(table.resolve(2015).unwrap().band_name(CommonBand::Swir2).unwrap(), "SR_B7");
        assert_eq!(table.resolve(1990).unwrap().thermal_bands, vec!["ST_B6".to_string()]);
        assert_eq!(table.resolve(2023).unwrap().thermal_bands, vec!["ST_B10".to_string()]);
    }

    #[test]
    fn gaps_and_overlaps_rejected() {
        let mut specs = SensorTable::landsat().specs().to_vec();
        specs[1].start_year = 2000;
        assert!(SensorTable::new(specs).is_err());

        let mut specs = SensorTable::landsat().specs().to_vec();
        specs[2].start_year = 2010;
        assert!(SensorTable::new(specs).is_err());

        assert!(SensorTable::new(SensorTable::landsat().specs().to_vec()).is_ok());
    }

    #[test]
    fn cloud_ceiling_override() {
        let table = SensorTable::landsat().with_cloud_cover_max(25.0);
        let q = table.query(2016, (0.0, 0.0, 1.0, 1.0)).unwrap();
        assert_eq!(q.cloud_cover_max, 25.0);
        assert_eq!(q.bands.len(), 7);
    }
}
