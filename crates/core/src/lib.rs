//! # covermap core
//!
//! Core types and I/O shared by every covermap crate.
//!
//! This crate provides:
//! - `Raster<T>` and `BandStack`: single- and multi-band georeferenced grids
//! - `GeoTransform` / `GridSpec`: affine georeferencing and the campaign grid
//! - `RegionOfInterest` and `LabeledSampleSet`: the campaign's vector inputs
//! - `SensorTable`: year → Landsat archive resolution
//! - `ImageryArchive`, `ExportSink`: the archive and export collaborator interfaces
//! - GeoTIFF reading and writing

pub mod archive;
pub mod error;
pub mod export;
pub mod io;
pub mod raster;
pub mod sensor;
pub mod vector;

pub use archive::{ImageryArchive, RawImage};
pub use error::{Error, Result};
pub use export::{ExportFormat, ExportRaster, ExportReceipt, ExportRequest, ExportSink};
pub use raster::{BandStack, GeoTransform, GridSpec, Raster, RasterElement};
pub use sensor::{ArchiveQuery, CommonBand, SensorSpec, SensorTable};
pub use vector::{ClassCatalog, ClassCode, LabeledSample, LabeledSampleSet, RegionOfInterest};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{BandStack, GeoTransform, GridSpec, Raster, RasterElement};
    pub use crate::sensor::{CommonBand, SensorSpec, SensorTable};
    pub use crate::vector::{ClassCode, LabeledSampleSet, RegionOfInterest};
}
