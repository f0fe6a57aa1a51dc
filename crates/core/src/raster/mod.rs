//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
mod grid_spec;
mod stack;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use grid_spec::GridSpec;
pub use stack::BandStack;
