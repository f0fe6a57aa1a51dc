//! Gradient tree boosting for multiclass classification.
//!
//! Friedman's multiclass logistic (K-class deviance) boosting: every round
//! fits one least-squares regression tree per class to the residuals
//! `y_k - p_k` of the current softmax probabilities, on a random subsample of
//! the training rows, and sets each leaf to a single Newton step
//! `(K - 1) / K * sum(r) / sum(|r| (1 - |r|))`, shrunk by the learning rate.

mod tree;

pub use tree::RegressionTree;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use covermap_core::{ClassCode, Error, Result};

use super::{Classifier, TrainedModel};
use crate::maybe_rayon::*;
use crate::sampling::FeatureVector;
use tree::TreeParams;

/// Hyperparameters of the boosted ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientTreeBoost {
    /// Boosting rounds.
    pub tree_count: usize,
    /// Learning rate applied to every tree.
    pub shrinkage: f64,
    /// Leaf budget of each regression tree.
    pub max_leaf_nodes: usize,
    pub min_samples_leaf: usize,
    /// Fraction of training rows drawn (without replacement) per round.
    pub sampling_rate: f64,
    pub seed: u64,
}

impl Default for GradientTreeBoost {
    fn default() -> Self {
        Self {
            tree_count: 100,
            shrinkage: 0.1,
            max_leaf_nodes: 32,
            min_samples_leaf: 1,
            sampling_rate: 0.8,
            seed: 0,
        }
    }
}

impl GradientTreeBoost {
    pub fn validate(&self) -> Result<()> {
        let bad = |name: &'static str, value: String, reason: &str| Error::InvalidParameter {
            name,
            value,
            reason: reason.into(),
        };
        if self.tree_count == 0 {
            return Err(bad("tree_count", "0".into(), "need at least one tree"));
        }
        if !(self.shrinkage > 0.0 && self.shrinkage <= 1.0) {
            return Err(bad("shrinkage", self.shrinkage.to_string(), "must be in (0, 1]"));
        }
        if self.max_leaf_nodes < 2 {
            return Err(bad(
                "max_leaf_nodes",
                self.max_leaf_nodes.to_string(),
                "must be at least 2",
            ));
        }
        if !(self.sampling_rate > 0.0 && self.sampling_rate <= 1.0) {
            return Err(bad(
                "sampling_rate",
                self.sampling_rate.to_string(),
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// A fitted ensemble: `rounds[m][k]` is round `m`'s tree for class `k`.
#[derive(Debug, Clone)]
pub struct BoostedTrees {
    classes: Vec<ClassCode>,
    feature_count: usize,
    rounds: Vec<Vec<RegressionTree>>,
}

impl BoostedTrees {
    /// Raw additive score per class.
    pub fn scores(&self, features: &[f64]) -> Vec<f64> {
        let mut scores = vec![0.0; self.classes.len()];
        for round in &self.rounds {
            for (s, tree) in scores.iter_mut().zip(round) {
                *s += tree.predict(features);
            }
        }
        scores
    }

    /// Softmax class probabilities, in [`TrainedModel::classes`] order.
    pub fn probabilities(&self, features: &[f64]) -> Vec<f64> {
        let mut p = self.scores(features);
        softmax(&mut p);
        p
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }
}

impl TrainedModel for BoostedTrees {
    fn classes(&self) -> &[ClassCode] {
        &self.classes
    }

    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn predict(&self, features: &[f64]) -> ClassCode {
        let scores = self.scores(features);
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(k, _)| k);
        self.classes[best]
    }
}

fn softmax(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    for s in scores.iter_mut() {
        *s /= sum;
    }
}

impl Classifier for GradientTreeBoost {
    type Model = BoostedTrees;

    fn train(&self, train: &[FeatureVector], classes: &[ClassCode]) -> Result<BoostedTrees> {
        self.validate()?;
        let mut classes = classes.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.is_empty() {
            return Err(Error::InvalidParameter {
                name: "classes",
                value: "[]".into(),
                reason: "no classes to train".into(),
            });
        }

        let k_count = classes.len();
        let n = train.len();
        let d = train.first().map_or(0, |f| f.values.len());
        if d == 0 {
            return Err(Error::InsufficientTrainingData { class: classes[0] });
        }

        let mut labels = Vec::with_capacity(n);
        let mut x = Array2::<f64>::zeros((n, d));
        for (i, f) in train.iter().enumerate() {
            if f.values.len() != d {
                return Err(Error::Algorithm(format!(
                    "feature vector {i} has {} values, expected {d}",
                    f.values.len()
                )));
            }
            let k = classes.binary_search(&f.class).map_err(|_| {
                Error::Algorithm(format!("training vector {i} has unknown class {}", f.class))
            })?;
            labels.push(k);
            x.row_mut(i).assign(&ndarray::ArrayView1::from(&f.values[..]));
        }
        for (k, &class) in classes.iter().enumerate() {
            if !labels.contains(&k) {
                return Err(Error::InsufficientTrainingData { class });
            }
        }

        let tree_params = TreeParams {
            max_leaf_nodes: self.max_leaf_nodes,
            min_samples_leaf: self.min_samples_leaf,
        };
        let newton_factor = (k_count as f64 - 1.0) / k_count as f64;
        let subsample = ((n as f64 * self.sampling_rate).ceil() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut scores = Array2::<f64>::zeros((n, k_count));
        let mut all_rows: Vec<usize> = (0..n).collect();
        let mut rounds = Vec::with_capacity(self.tree_count);

        for _ in 0..self.tree_count {
            // residuals[k][i] = y_ik - p_ik
            let mut residuals = vec![vec![0.0; n]; k_count];
            for i in 0..n {
                let mut p = scores.row(i).to_vec();
                softmax(&mut p);
                for k in 0..k_count {
                    let y = if labels[i] == k { 1.0 } else { 0.0 };
                    residuals[k][i] = y - p[k];
                }
            }

            all_rows.shuffle(&mut rng);
            let mut sample = all_rows[..subsample].to_vec();
            sample.sort_unstable();

            let xv = x.view();
            let round: Vec<RegressionTree> = (0..k_count)
                .into_par_iter()
                .map(|k| {
                    let r = &residuals[k];
                    let mut tree = RegressionTree::fit(xv, r, sample.clone(), tree_params, |rows| {
                        let num: f64 = rows.iter().map(|&i| r[i]).sum();
                        let den: f64 = rows.iter().map(|&i| r[i].abs() * (1.0 - r[i].abs())).sum();
                        if den < 1e-12 {
                            0.0
                        } else {
                            newton_factor * num / den
                        }
                    });
                    tree.scale(self.shrinkage);
                    tree
                })
                .collect();

            for (i, f) in train.iter().enumerate() {
                for (k, tree) in round.iter().enumerate() {
                    scores[[i, k]] += tree.predict(&f.values);
                }
            }
            rounds.push(round);
        }

        tracing::debug!(
            rounds = rounds.len(),
            classes = k_count,
            rows = n,
            features = d,
            "gradient tree boost trained"
        );
        Ok(BoostedTrees {
            classes,
            feature_count: d,
            rounds,
        })
    }
}
