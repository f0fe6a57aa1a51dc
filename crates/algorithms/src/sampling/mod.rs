//! Training data extraction.
//!
//! - [`sample_regions`]: read composite band values under labeled geometries
//! - [`split`]: seeded random train/test partition of the sampled vectors

mod regions;
mod split;

pub use regions::{sample_regions, sample_pixels};
pub use split::{split, SplitParams, TrainTestSplit};

use std::collections::BTreeMap;

use covermap_core::ClassCode;
use serde::Serialize;

/// Band values of one composite pixel under a labeled sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub class: ClassCode,
    pub values: Vec<f64>,
    pub row: usize,
    pub col: usize,
}

/// Vectors per class, ascending by class code.
pub fn class_counts(features: &[FeatureVector]) -> BTreeMap<ClassCode, usize> {
    let mut counts = BTreeMap::new();
    for f in features {
        *counts.entry(f.class).or_insert(0) += 1;
    }
    counts
}
