//! # covermap algorithms
//!
//! The per-year processing chain, from archive scenes to an accuracy report.
//!
//! ## Modules
//!
//! - **radiometry**: Collection 2 Level-2 scale factors (reflectance, kelvin)
//! - **compositing**: per-pixel median composite clipped to the ROI
//! - **sampling**: feature vectors under labeled geometries, train/test split
//! - **classification**: classifier traits, gradient tree boosting, raster prediction
//! - **accuracy**: error matrix, overall accuracy, kappa, producer's/consumer's accuracy

pub mod accuracy;
pub mod classification;
pub mod compositing;
mod maybe_rayon;
pub mod radiometry;
pub mod sampling;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::accuracy::{evaluate, AccuracyReport, ConfusionMatrix};
    pub use crate::classification::{
        classify_raster, Classifier, GradientTreeBoost, TrainedModel, CLASS_NODATA,
    };
    pub use crate::compositing::{median_composite, median_of};
    pub use crate::radiometry::{correct, correct_collection, ScaleFactors};
    pub use crate::sampling::{sample_regions, split, FeatureVector, SplitParams, TrainTestSplit};
    pub use covermap_core::prelude::*;
}
