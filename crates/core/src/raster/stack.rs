//! Named multi-band rasters.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};

/// An ordered set of named `f64` bands on one pixel grid.
///
/// Used for raw archive scenes (`SR_B1`, ..., `ST_B6`), corrected scenes and
/// composites. Every band must share the shape and geotransform of the first
/// band pushed; [`BandStack::push`] rejects anything else.
#[derive(Debug, Clone, Default)]
pub struct BandStack {
    names: Vec<String>,
    bands: Vec<Raster<f64>>,
}

impl BandStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stack from `(name, band)` pairs.
    pub fn from_bands<I, S>(bands: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Raster<f64>)>,
        S: Into<String>,
    {
        let mut stack = Self::new();
        for (name, band) in bands {
            stack.push(name, band)?;
        }
        Ok(stack)
    }

    /// Append a band, enforcing the shared-grid invariant.
    pub fn push(&mut self, name: impl Into<String>, band: Raster<f64>) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(Error::DuplicateBand(name));
        }
        if let Some(first) = self.bands.first() {
            if !first.same_grid(&band) {
                return Err(Error::SizeMismatch {
                    er: first.rows(),
                    ec: first.cols(),
                    ar: band.rows(),
                    ac: band.cols(),
                });
            }
        }
        self.names.push(name);
        self.bands.push(band);
        Ok(())
    }

    /// Number of bands.
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// Whether the stack holds no bands.
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Band names in stack order.
    pub fn band_names(&self) -> &[String] {
        &self.names
    }

    /// Whether a band with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Look up a band by name.
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.index_of(name).map(|i| &self.bands[i])
    }

    /// Position of a band in the stack.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    /// Positions of several bands, in the order requested.
    pub fn indices_of<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.index_of(n.as_ref())).collect()
    }

    /// Band at a position.
    pub fn band_at(&self, index: usize) -> &Raster<f64> {
        &self.bands[index]
    }

    /// Iterate over `(name, band)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.names.iter().map(String::as_str).zip(self.bands.iter())
    }

    /// A new stack holding only the named bands, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<BandStack> {
        let mut out = BandStack::new();
        for name in names {
            let name = name.as_ref();
            out.push(name, self.band(name)?.clone())?;
        }
        Ok(out)
    }

    /// Shape shared by all bands, `(0, 0)` when empty.
    pub fn shape(&self) -> (usize, usize) {
        self.bands.first().map_or((0, 0), |b| b.shape())
    }

    /// Geotransform shared by all bands.
    pub fn transform(&self) -> GeoTransform {
        self.bands.first().map(|b| *b.transform()).unwrap_or_default()
    }

    /// EPSG code shared by all bands.
    pub fn epsg(&self) -> Option<u32> {
        self.bands.first().and_then(|b| b.epsg())
    }

    /// Copy the values of the bands at `indices` for pixel `(row, col)` into `out`.
    ///
    /// Returns `false` (leaving `out` partially written) when any value is
    /// not finite.
    pub fn read_pixel(&self, row: usize, col: usize, indices: &[usize], out: &mut Vec<f64>) -> bool {
        out.clear();
        for &i in indices {
            let v = match self.bands[i].get(row, col) {
                Ok(v) => v,
                Err(_) => return false,
            };
            if !v.is_finite() {
                return false;
            }
            out.push(v);
        }
        true
    }
}
