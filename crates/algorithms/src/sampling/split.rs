use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use covermap_core::{ClassCode, Error, Result};

use super::FeatureVector;

/// Parameters of the train/test partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Expected share of vectors held out for testing.
    pub test_fraction: f64,
    pub seed: u64,
    /// Hold out `round(n * test_fraction)` vectors of every class instead of
    /// drawing each vector independently.
    pub stratified: bool,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            stratified: false,
        }
    }
}

impl SplitParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(Error::InvalidParameter {
                name: "test_fraction",
                value: self.test_fraction.to_string(),
                reason: "must be in [0, 1)".into(),
            });
        }
        Ok(())
    }

    /// Derive the per-year parameters: same fraction, seed mixed with the year
    /// so every year gets an independent but reproducible draw.
    pub fn for_year(&self, year: i32) -> Self {
        Self {
            seed: self.seed ^ year as u64,
            ..*self
        }
    }
}

/// Disjoint training and test subsets.
#[derive(Debug, Clone, Default)]
pub struct TrainTestSplit {
    pub train: Vec<FeatureVector>,
    pub test: Vec<FeatureVector>,
}

impl TrainTestSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition `features` into train and test.
///
/// Unstratified: every vector draws `u` uniformly from `[0, 1)` and goes to
/// training when `u < 1 - test_fraction`. Each vector lands on exactly one
/// side and relative order is preserved within each side.
pub fn split(features: Vec<FeatureVector>, params: &SplitParams) -> Result<TrainTestSplit> {
    params.validate()?;
    let mut rng = StdRng::seed_from_u64(params.seed);

    if !params.stratified {
        let threshold = 1.0 - params.test_fraction;
        let (train, test): (Vec<_>, Vec<_>) = features
            .into_iter()
            .partition(|_| rng.gen::<f64>() < threshold);
        return Ok(TrainTestSplit { train, test });
    }

    let mut by_class: BTreeMap<ClassCode, Vec<usize>> = BTreeMap::new();
    for (i, f) in features.iter().enumerate() {
        by_class.entry(f.class).or_default().push(i);
    }
    let mut is_test = vec![false; features.len()];
    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        let n_test = (members.len() as f64 * params.test_fraction).round() as usize;
        for &i in &members[..n_test] {
            is_test[i] = true;
        }
    }

    let mut out = TrainTestSplit::default();
    for (f, test) in features.into_iter().zip(is_test) {
        if test {
            out.test.push(f);
        } else {
            out.train.push(f);
        }
    }
    Ok(out)
}
