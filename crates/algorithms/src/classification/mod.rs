//! Supervised per-pixel classification.
//!
//! [`Classifier`] fits a [`TrainedModel`] on one year's training vectors;
//! [`classify_raster`] applies it to every valid pixel of that year's
//! composite. The only classifier shipped is [`GradientTreeBoost`].

mod gbdt;

pub use gbdt::{BoostedTrees, GradientTreeBoost, RegressionTree};

use covermap_core::raster::{BandStack, Raster};
use covermap_core::{ClassCode, Error, Result};

use crate::maybe_rayon::*;
use crate::sampling::FeatureVector;

/// Class code written to pixels that could not be classified.
pub const CLASS_NODATA: ClassCode = u8::MAX;

/// Something that can be fit to labeled feature vectors.
pub trait Classifier: Send + Sync {
    type Model: TrainedModel;

    /// Fit a model distinguishing `classes`.
    ///
    /// Every class in `classes` must have at least one training vector,
    /// otherwise this fails with `Error::InsufficientTrainingData`.
    fn train(&self, train: &[FeatureVector], classes: &[ClassCode]) -> Result<Self::Model>;
}

/// A fitted model. Always answers with one of its classes.
pub trait TrainedModel: Send + Sync {
    /// Classes the model can predict, ascending.
    fn classes(&self) -> &[ClassCode];

    /// Length of the feature vectors the model was trained on.
    fn feature_count(&self) -> usize;

    fn predict(&self, features: &[f64]) -> ClassCode;
}

/// Classify every pixel of `composite` using `bands` as features, in the
/// order the model was trained with.
///
/// Pixels where any feature band is not finite get [`CLASS_NODATA`].
pub fn classify_raster<M, S>(model: &M, composite: &BandStack, bands: &[S]) -> Result<Raster<u8>>
where
    M: TrainedModel,
    S: AsRef<str>,
{
    if bands.len() != model.feature_count() {
        return Err(Error::InvalidParameter {
            name: "bands",
            value: bands.len().to_string(),
            reason: format!("model expects {} features", model.feature_count()),
        });
    }
    let indices = composite.indices_of(bands)?;
    let (rows, cols) = composite.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![CLASS_NODATA; cols];
            let mut values = Vec::with_capacity(indices.len());
            for (col, out) in row_data.iter_mut().enumerate() {
                if composite.read_pixel(row, col, &indices, &mut values) {
                    *out = model.predict(&values);
                }
            }
            row_data
        })
        .collect();

    let mut output = composite.band_at(indices[0]).with_same_meta::<u8>(CLASS_NODATA);
    output.set_nodata(Some(CLASS_NODATA));
    output.replace_data(data)?;
    Ok(output)
}
