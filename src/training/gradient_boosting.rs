//! Gradient boosting with regression trees
//!
//! Regression boosts the squared loss. Two classes boost a single logit;
//! any other class count boosts one softmax output per class.

use super::decision_tree::DecisionTree;
use super::linear_models::{argmax_rows, softmax_rows};
use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gradient boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: 42,
        }
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Per-class one-hot targets for class indices
pub(crate) fn one_hot(y: &Array1<f64>, n_classes: usize) -> Array2<f64> {
    let mut out = Array2::zeros((y.len(), n_classes));
    for (i, &label) in y.iter().enumerate() {
        let class = (label.round().max(0.0) as usize).min(n_classes - 1);
        out[[i, class]] = 1.0;
    }
    out
}

/// Log-odds or log-prior starting scores
pub(crate) fn initial_scores(y: &Array1<f64>, n_classes: usize) -> Vec<f64> {
    let n = y.len().max(1) as f64;
    let clamp = |p: f64| p.clamp(1e-6, 1.0 - 1e-6);
    match n_classes {
        0 => vec![y.mean().unwrap_or(0.0)],
        2 => {
            let p = clamp(y.iter().filter(|&&v| v >= 0.5).count() as f64 / n);
            vec![(p / (1.0 - p)).ln()]
        }
        k => (0..k)
            .map(|c| {
                let p = clamp(y.iter().filter(|&&v| v.round() as usize == c).count() as f64 / n);
                p.ln()
            })
            .collect(),
    }
}

/// Gradient boosting model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    config: GradientBoostingConfig,
    /// Zero for regression
    n_classes: usize,
    init: Vec<f64>,
    /// One tree per output per stage
    stages: Vec<Vec<DecisionTree>>,
    feature_importances: Option<Array1<f64>>,
}

impl GradientBoosting {
    pub fn new_regressor(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            n_classes: 0,
            init: Vec::new(),
            stages: Vec::new(),
            feature_importances: None,
        }
    }

    pub fn new_classifier(config: GradientBoostingConfig, n_classes: usize) -> Self {
        Self {
            n_classes: n_classes.max(1),
            ..Self::new_regressor(config)
        }
    }

    fn n_outputs(&self) -> usize {
        match self.n_classes {
            0 | 2 => 1,
            k => k,
        }
    }

    fn base_tree(&self, stage: usize, output: usize) -> DecisionTree {
        DecisionTree::new_regressor()
            .with_max_depth(self.config.max_depth)
            .with_min_samples_split(self.config.min_samples_split)
            .with_min_samples_leaf(self.config.min_samples_leaf)
            .with_random_state(
                self.config
                    .random_state
                    .wrapping_add((stage * self.n_outputs() + output) as u64),
            )
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n = x.nrows();
        if n != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n == 0 {
            return Err(PipelineError::ComputationError("cannot boost on zero rows".to_string()));
        }

        let outputs = self.n_outputs();
        self.init = initial_scores(y, self.n_classes);
        let mut scores = Array2::from_shape_fn((n, outputs), |(_, k)| self.init[k]);
        let targets = match self.n_classes {
            0 | 2 => y.clone().insert_axis(Axis(1)),
            k => one_hot(y, k),
        };

        self.stages.clear();
        for stage in 0..self.config.n_estimators {
            let residuals = self.negative_gradient(&scores, &targets);
            let mut trees = Vec::with_capacity(outputs);
            for k in 0..outputs {
                let mut tree = self.base_tree(stage, k);
                tree.fit(x, &residuals.column(k).to_owned())?;
                let update = tree.predict_values(x)?;
                scores.column_mut(k).scaled_add(self.config.learning_rate, &update);
                trees.push(tree);
            }
            self.stages.push(trees);
        }

        self.compute_feature_importances(x.ncols());
        debug!(stages = self.stages.len(), outputs, "gradient boosting fitted");
        Ok(self)
    }

    fn negative_gradient(&self, scores: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        match self.n_classes {
            0 => targets - scores,
            2 => targets - &scores.mapv(sigmoid),
            _ => {
                let mut proba = scores.clone();
                softmax_rows(&mut proba);
                targets - &proba
            }
        }
    }

    fn compute_feature_importances(&mut self, n_features: usize) {
        let mut total = Array1::<f64>::zeros(n_features);
        for imp in self.stages.iter().flatten().filter_map(|t| t.importances()) {
            total += imp;
        }
        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        self.feature_importances = Some(total);
    }

    /// Raw additive scores (`n_rows x n_outputs`)
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.init.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut scores = Array2::from_shape_fn((x.nrows(), self.n_outputs()), |(_, k)| self.init[k]);
        for trees in &self.stages {
            for (k, tree) in trees.iter().enumerate() {
                let update = tree.predict_values(x)?;
                scores.column_mut(k).scaled_add(self.config.learning_rate, &update);
            }
        }
        Ok(scores)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores_to_proba(scores, self.n_classes))
    }
}

/// Class probabilities from boosted scores
pub(crate) fn scores_to_proba(mut scores: Array2<f64>, n_classes: usize) -> Array2<f64> {
    if n_classes == 2 {
        let p = scores.column(0).mapv(sigmoid);
        let mut proba = Array2::zeros((scores.nrows(), 2));
        proba.column_mut(1).assign(&p);
        proba.column_mut(0).assign(&p.mapv(|v| 1.0 - v));
        proba
    } else {
        softmax_rows(&mut scores);
        scores
    }
}

impl Estimator for GradientBoosting {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_classes == 0 {
            Ok(self.decision_function(x)?.column(0).to_owned())
        } else {
            Ok(argmax_rows(&self.predict_proba(x)?))
        }
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GradientBoostingConfig {
        GradientBoostingConfig {
            n_estimators: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_regressor_reduces_error() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 / 4.0 } else { (i % 3) as f64 });
        let y = x.column(0).mapv(|v| v.sin() * 3.0);

        let mut model = GradientBoosting::new_regressor(config());
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        let mse = (&pred - &y).mapv(|e| e * e).mean().unwrap();
        let baseline = y.var(0.0);
        assert!(mse < baseline * 0.1, "mse {} baseline {}", mse, baseline);
    }

    #[test]
    fn test_binary_classifier() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..30).map(|i| if i >= 15 { 1.0 } else { 0.0 }));

        let mut model = GradientBoosting::new_classifier(config(), 2);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[[29, 1]] > 0.7);
        assert!(proba[[0, 1]] < 0.3);
    }

    #[test]
    fn test_multiclass_classifier() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..30).map(|i| (i / 10) as f64));

        let mut model = GradientBoosting::new_classifier(config(), 3);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        let imp = model.feature_importances().unwrap();
        assert!((imp[0] - 1.0).abs() < 1e-12);
    }
}
