//! The export sink collaborator.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::raster::{BandStack, GeoTransform, Raster};

/// Default pixel ceiling for the composite and RGB exports.
pub const COMPOSITE_MAX_PIXELS: u64 = 10_000_000_000_000;
/// Default pixel ceiling for the classified export.
pub const PRODUCT_MAX_PIXELS: u64 = 10_000_000;

/// On-disk encoding requested for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    GeoTiff,
}

/// Pixels handed to a sink.
#[derive(Debug, Clone, Copy)]
pub enum ExportRaster<'a> {
    /// Float bands, one TIFF page per band.
    Bands(&'a BandStack),
    /// Class codes, nodata 255.
    Classes(&'a Raster<u8>),
}

impl ExportRaster<'_> {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            ExportRaster::Bands(stack) => stack.shape(),
            ExportRaster::Classes(raster) => raster.shape(),
        }
    }

    pub fn transform(&self) -> GeoTransform {
        match self {
            ExportRaster::Bands(stack) => stack.transform(),
            ExportRaster::Classes(raster) => *raster.transform(),
        }
    }

    pub fn band_count(&self) -> usize {
        match self {
            ExportRaster::Bands(stack) => stack.len(),
            ExportRaster::Classes(_) => 1,
        }
    }
}

/// A named raster export clipped to `region`, written at `scale` metres
/// (or degrees) per pixel.
#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    pub name: String,
    pub raster: ExportRaster<'a>,
    pub scale: f64,
    /// `(min_x, min_y, max_x, max_y)`
    pub region: (f64, f64, f64, f64),
    pub max_pixels: u64,
    pub format: ExportFormat,
}

impl ExportRequest<'_> {
    /// Pixel count of the written raster at the requested scale.
    pub fn pixel_count(&self) -> u64 {
        let (rows, cols) = self.output_shape();
        rows as u64 * cols as u64
    }

    /// `(rows, cols)` once the raster is resampled to `scale`.
    pub fn output_shape(&self) -> (usize, usize) {
        let (rows, cols) = self.raster.shape();
        let cell = self.raster.transform().cell_size();
        if !(self.scale.is_finite() && self.scale > 0.0) || (self.scale - cell).abs() < 1e-9 * cell.max(1.0) {
            return (rows, cols);
        }
        let factor = cell / self.scale;
        let r = ((rows as f64) * factor).ceil().max(1.0) as usize;
        let c = ((cols as f64) * factor).ceil().max(1.0) as usize;
        (r, c)
    }
}

/// What a sink reports back after a successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub name: String,
    /// Where the product ended up (path, URI, task id).
    pub location: String,
    pub pixels: u64,
    /// Number of pieces the product was written as (1 unless tiled).
    pub parts: usize,
}

/// Receives named raster products.
///
/// A sink must refuse a request whose pixel count exceeds `max_pixels` with
/// [`crate::Error::ExportLimitExceeded`] rather than write a partial product.
pub trait ExportSink: Send + Sync {
    fn export(&self, request: ExportRequest<'_>) -> impl Future<Output = Result<ExportReceipt>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raster: &Raster<u8>, scale: f64) -> ExportRequest<'_> {
        ExportRequest {
            name: "Landsat_Classified_2000".into(),
            raster: ExportRaster::Classes(raster),
            scale,
            region: raster.bounds(),
            max_pixels: PRODUCT_MAX_PIXELS,
            format: ExportFormat::GeoTiff,
        }
    }

    #[test]
    fn pixel_count_at_native_scale() {
        let mut r = Raster::filled(40, 25, 0u8);
        r.set_transform(GeoTransform::new(0.0, 1200.0, 30.0, -30.0));
        assert_eq!(request(&r, 30.0).pixel_count(), 1000);
    }

    #[test]
    fn coarser_scale_shrinks_output() {
        let mut r = Raster::filled(40, 25, 0u8);
        r.set_transform(GeoTransform::new(0.0, 1200.0, 30.0, -30.0));
        assert_eq!(request(&r, 60.0).output_shape(), (20, 13));
    }
}
