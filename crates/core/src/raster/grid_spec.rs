//! The campaign pixel grid.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};

/// Shape, georeferencing and CRS shared by every raster of a campaign.
///
/// Archive images are resampled onto this grid, so composites built from
/// different scenes line up pixel for pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub epsg: u32,
}

impl GridSpec {
    /// North-up grid of `pixel_size` cells covering `(min_x, min_y, max_x, max_y)`.
    ///
    /// The far edges are rounded up to a whole pixel.
    pub fn covering(bounds: (f64, f64, f64, f64), pixel_size: f64, epsg: u32) -> Result<Self> {
        let (min_x, min_y, max_x, max_y) = bounds;
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(Error::InvalidParameter {
                name: "pixel_size",
                value: pixel_size.to_string(),
                reason: "must be a positive number".into(),
            });
        }
        if !(max_x > min_x && max_y > min_y) {
            return Err(Error::Geometry(format!(
                "degenerate bounds ({min_x}, {min_y}, {max_x}, {max_y})"
            )));
        }

        let cols = ((max_x - min_x) / pixel_size).ceil().max(1.0) as usize;
        let rows = ((max_y - min_y) / pixel_size).ceil().max(1.0) as usize;

        Ok(Self {
            transform: GeoTransform::new(min_x, max_y, pixel_size, -pixel_size),
            rows,
            cols,
            epsg,
        })
    }

    /// Number of cells on the grid.
    pub fn pixel_count(&self) -> u64 {
        self.rows as u64 * self.cols as u64
    }

    /// A raster on this grid filled with `fill`.
    pub fn blank<T: RasterElement>(&self, fill: T) -> Raster<T> {
        let mut raster = Raster::filled(self.rows, self.cols, fill);
        raster.set_transform(self.transform);
        raster.set_epsg(Some(self.epsg));
        raster
    }

    /// Whether a raster sits exactly on this grid.
    pub fn matches<T: RasterElement>(&self, raster: &Raster<T>) -> bool {
        raster.shape() == (self.rows, self.cols) && raster.transform().approx_eq(&self.transform)
    }

    /// Bounding box of the grid.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }
}
