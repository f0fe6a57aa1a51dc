//! Vector inputs of a campaign: the region of interest and the labeled
//! reference samples.
//!
//! Both are read once from GeoJSON and shared read-only by every year.

mod classes;
mod geojson_io;
mod roi;
mod samples;

pub use classes::{ClassCatalog, ClassCode, ClassInfo};
pub use geojson_io::{read_geometries, read_labeled_features};
pub use roi::RegionOfInterest;
pub use samples::{LabeledSample, LabeledSampleSet};
