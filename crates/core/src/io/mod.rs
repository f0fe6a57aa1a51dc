//! GeoTIFF I/O

mod native;

pub use native::{
    read_band_stack, read_geotiff, read_geotiff_from_buffer, write_band_stack, write_class_geotiff,
    write_geotiff, write_geotiff_to_buffer, GeoTiffOptions,
};
