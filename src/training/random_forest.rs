//! Random forest of bootstrapped CART trees

use super::decision_tree::DecisionTree;
use super::linear_models::argmax_rows;
use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Every feature
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => ((n_features as f64).sqrt() as usize).max(1),
            MaxFeatures::All => n_features,
        }
    }
}

/// Random forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
    /// Zero for regression
    n_classes: usize,
    feature_importances: Option<Array1<f64>>,
}

impl RandomForest {
    pub fn new_classifier(n_estimators: usize, n_classes: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: 42,
            n_classes: n_classes.max(1),
            feature_importances: None,
        }
    }

    pub fn new_regressor(n_estimators: usize) -> Self {
        Self {
            max_features: MaxFeatures::All,
            n_classes: 0,
            ..Self::new_classifier(n_estimators, 1)
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn is_classifier(&self) -> bool {
        self.n_classes > 0
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PipelineError::ComputationError("cannot fit a forest on zero rows".to_string()));
        }

        let max_features = self.max_features.resolve(x.ncols());

        // Each tree owns a seed derived from its index, so the result is
        // independent of how rayon schedules the work
        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = self.random_state.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let rows: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut tree = if self.is_classifier() {
                    DecisionTree::new_classifier(self.n_classes)
                } else {
                    DecisionTree::new_regressor()
                };
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree = tree
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_random_state(rng.gen());

                tree.fit_rows(x, y, &rows)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances(x.ncols());
        Ok(self)
    }

    fn compute_feature_importances(&mut self, n_features: usize) {
        let mut total = vec![0.0; n_features];
        for imp in self.trees.iter().filter_map(|t| t.importances()) {
            for (acc, v) in total.iter_mut().zip(imp.iter()) {
                *acc += v;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    /// Mean of the trees' leaf proportions
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut mean = Array2::zeros((x.nrows(), self.n_classes.max(1)));
        for proba in &per_tree {
            mean += proba;
        }
        Ok(mean / per_tree.len() as f64)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Estimator for RandomForest {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.is_classifier() {
            return Ok(argmax_rows(&self.predict_proba(x)?));
        }
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_values(x))
            .collect::<Result<Vec<_>>>()?;

        let mut mean = Array1::zeros(x.nrows());
        for pred in &per_tree {
            mean += pred;
        }
        Ok(mean / per_tree.len() as f64)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 3), |(i, j)| {
            let class = (i % 3) as f64;
            match j {
                0 => class * 4.0 + (i as f64 * 0.37).sin(),
                1 => (i as f64 * 1.3).cos(),
                _ => class * -2.0 + (i as f64 * 0.11).sin() * 0.5,
            }
        });
        let y = Array1::from_iter((0..60).map(|i| (i % 3) as f64));
        (x, y)
    }

    #[test]
    fn test_forest_classifier() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new_classifier(25, 3).with_max_depth(6);
        forest.fit(&x, &y).unwrap();
        let pred = forest.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 57);
        assert_eq!(forest.n_trees(), 25);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (x, y) = blobs();
        let mut a = RandomForest::new_classifier(10, 3);
        let mut b = RandomForest::new_classifier(10, 3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_forest_regressor_and_importances() {
        let x = Array2::from_shape_fn((50, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 4) as f64 });
        let y = x.column(0).mapv(|v| v * 2.0);
        let mut forest = RandomForest::new_regressor(20).with_min_samples_leaf(2);
        forest.fit(&x, &y).unwrap();

        let pred = forest.predict(&x).unwrap();
        let mae = (&pred - &y).mapv(f64::abs).mean().unwrap();
        assert!(mae < 5.0, "mae {}", mae);

        let imp = forest.feature_importances().unwrap();
        assert!(imp[0] > imp[1]);
        assert!((imp.sum() - 1.0).abs() < 1e-9);
    }
}
