//! Held-out accuracy assessment.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use covermap_core::{ClassCode, Error, Result};

use crate::classification::TrainedModel;
use crate::maybe_rayon::*;
use crate::sampling::FeatureVector;

/// Error matrix: rows are true classes, columns predicted classes, both in
/// `classes` order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    classes: Vec<ClassCode>,
    counts: Array2<u64>,
}

impl ConfusionMatrix {
    pub fn new(classes: Vec<ClassCode>) -> Self {
        let n = classes.len();
        Self {
            classes,
            counts: Array2::zeros((n, n)),
        }
    }

    /// Tally `(true, predicted)` pairs. Codes outside `classes` are an error.
    pub fn from_pairs<I>(classes: Vec<ClassCode>, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ClassCode, ClassCode)>,
    {
        let mut m = Self::new(classes);
        for (actual, predicted) in pairs {
            m.add(actual, predicted)?;
        }
        Ok(m)
    }

    pub fn add(&mut self, actual: ClassCode, predicted: ClassCode) -> Result<()> {
        let i = self.index(actual)?;
        let j = self.index(predicted)?;
        self.counts[[i, j]] += 1;
        Ok(())
    }

    fn index(&self, class: ClassCode) -> Result<usize> {
        self.classes
            .iter()
            .position(|&c| c == class)
            .ok_or_else(|| Error::Algorithm(format!("class {class} is not in the error matrix")))
    }

    pub fn classes(&self) -> &[ClassCode] {
        &self.classes
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    pub fn correct(&self) -> u64 {
        self.counts.diag().sum()
    }

    /// `trace / total`; 0 for an empty matrix.
    pub fn overall_accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.correct() as f64 / total as f64
    }

    /// Cohen's kappa, `(po - pe) / (1 - pe)` with the expected agreement `pe`
    /// from the row and column marginals.
    ///
    /// When `pe == 1` (a single class in play) kappa is 1 for perfect
    /// agreement and 0 otherwise.
    pub fn kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        let po = self.correct() as f64 / n;
        let rows = self.counts.sum_axis(ndarray::Axis(1));
        let cols = self.counts.sum_axis(ndarray::Axis(0));
        let pe: f64 = rows
            .iter()
            .zip(cols.iter())
            .map(|(&r, &c)| (r as f64 / n) * (c as f64 / n))
            .sum();
        if (1.0 - pe).abs() < 1e-12 {
            return if (po - 1.0).abs() < 1e-12 { 1.0 } else { 0.0 };
        }
        (po - pe) / (1.0 - pe)
    }

    /// Per true class: share of its reference pixels classified correctly.
    /// `None` for classes absent from the test set.
    pub fn producers_accuracy(&self) -> Vec<Option<f64>> {
        let rows = self.counts.sum_axis(ndarray::Axis(1));
        rows.iter()
            .enumerate()
            .map(|(i, &r)| (r > 0).then(|| self.counts[[i, i]] as f64 / r as f64))
            .collect()
    }

    /// Per predicted class: share of its predictions that were right.
    /// `None` for classes never predicted.
    pub fn consumers_accuracy(&self) -> Vec<Option<f64>> {
        let cols = self.counts.sum_axis(ndarray::Axis(0));
        cols.iter()
            .enumerate()
            .map(|(j, &c)| (c > 0).then(|| self.counts[[j, j]] as f64 / c as f64))
            .collect()
    }

    /// Rows of the matrix as nested vectors.
    pub fn to_rows(&self) -> Vec<Vec<u64>> {
        self.counts.rows().into_iter().map(|r| r.to_vec()).collect()
    }
}

/// Serializable accuracy record of one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub classes: Vec<ClassCode>,
    pub confusion_matrix: Vec<Vec<u64>>,
    pub overall_accuracy: f64,
    pub kappa: f64,
    pub producers_accuracy: Vec<Option<f64>>,
    pub consumers_accuracy: Vec<Option<f64>>,
    pub test_size: u64,
}

impl From<&ConfusionMatrix> for AccuracyReport {
    fn from(m: &ConfusionMatrix) -> Self {
        Self {
            classes: m.classes().to_vec(),
            confusion_matrix: m.to_rows(),
            overall_accuracy: m.overall_accuracy(),
            kappa: m.kappa(),
            producers_accuracy: m.producers_accuracy(),
            consumers_accuracy: m.consumers_accuracy(),
            test_size: m.total(),
        }
    }
}

/// Error matrix of `model` over the test vectors, indexed by the model's classes.
pub fn confusion_matrix<M: TrainedModel>(model: &M, test: &[FeatureVector]) -> Result<ConfusionMatrix> {
    if test.is_empty() {
        return Err(Error::EmptyTestSet);
    }
    let predicted: Vec<ClassCode> = test.par_iter().map(|f| model.predict(&f.values)).collect();
    ConfusionMatrix::from_pairs(
        model.classes().to_vec(),
        test.iter().map(|f| f.class).zip(predicted),
    )
}

/// Classify the test vectors and summarise the agreement.
pub fn evaluate<M: TrainedModel>(model: &M, test: &[FeatureVector]) -> Result<AccuracyReport> {
    Ok(AccuracyReport::from(&confusion_matrix(model, test)?))
}
