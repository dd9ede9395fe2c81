//! XGBoost-style gradient boosting with second-order approximation
//!
//! - Leaf weights `w* = -G / (H + lambda)`
//! - Split gain `0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)] - γ`
//! - Children must carry at least `min_child_weight` hessian mass
//! - Each round draws a row subsample and a column subsample

use super::gradient_boosting::{initial_scores, one_hot, scores_to_proba, sigmoid};
use super::linear_models::{argmax_rows, softmax_rows};
use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// XGBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// Minimum loss reduction to make a split
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum XGBNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: Box<XGBNode>,
        right: Box<XGBNode>,
    },
}

impl XGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                XGBNode::Leaf { weight } => return *weight,
                XGBNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => node = if sample[*feature] <= *threshold { left } else { right },
            }
        }
    }

    fn accumulate_gain(&self, totals: &mut [f64]) {
        if let XGBNode::Split {
            feature,
            gain,
            left,
            right,
            ..
        } = self
        {
            totals[*feature] += gain;
            left.accumulate_gain(totals);
            right.accumulate_gain(totals);
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    config: &'a XGBoostConfig,
}

impl TreeBuilder<'_> {
    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.config.reg_lambda)
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.config.reg_lambda)
    }

    fn build(&self, rows: Vec<usize>, depth: usize) -> XGBNode {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();

        if depth >= self.config.max_depth || rows.len() < 2 || h < 2.0 * self.config.min_child_weight {
            return XGBNode::Leaf {
                weight: self.leaf_weight(g, h),
            };
        }

        let best = self
            .features
            .par_iter()
            .filter_map(|&f| self.best_split_for_feature(&rows, f, g, h))
            .collect::<Vec<_>>()
            .into_iter()
            .fold(None, |acc: Option<(usize, f64, f64)>, c| match acc {
                Some(a) if a.2 >= c.2 => Some(a),
                _ => Some(c),
            });

        match best {
            Some((feature, threshold, gain)) => {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                    rows.iter().partition(|&&i| self.x[[i, feature]] <= threshold);
                XGBNode::Split {
                    feature,
                    threshold,
                    gain,
                    left: Box::new(self.build(left_rows, depth + 1)),
                    right: Box::new(self.build(right_rows, depth + 1)),
                }
            }
            None => XGBNode::Leaf {
                weight: self.leaf_weight(g, h),
            },
        }
    }

    /// Exact greedy sweep over sorted feature values
    fn best_split_for_feature(&self, rows: &[usize], feature: usize, g: f64, h: f64) -> Option<(usize, f64, f64)> {
        let mut sorted: Vec<(f64, usize)> = rows.iter().map(|&i| (self.x[[i, feature]], i)).collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let parent = self.score(g, h);
        let mut gl = 0.0;
        let mut hl = 0.0;
        let mut best: Option<(usize, f64, f64)> = None;

        for k in 0..sorted.len() - 1 {
            let (value, i) = sorted[k];
            gl += self.grad[i];
            hl += self.hess[i];
            let next = sorted[k + 1].0;
            if next <= value {
                continue;
            }
            let (gr, hr) = (g - gl, h - hl);
            if hl < self.config.min_child_weight || hr < self.config.min_child_weight {
                continue;
            }
            let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.config.gamma;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.2) {
                best = Some((feature, value + (next - value) / 2.0, gain));
            }
        }
        best
    }
}

/// Uniform sample of `ceil(n * ratio)` distinct indices, sorted
fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if ratio >= 1.0 {
        return indices;
    }
    indices.shuffle(rng);
    indices.truncate(((n as f64 * ratio).ceil() as usize).clamp(1, n));
    indices.sort_unstable();
    indices
}

/// Second-order boosted trees for regression and classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoost {
    config: XGBoostConfig,
    /// Zero for regression
    n_classes: usize,
    n_features: usize,
    base_scores: Vec<f64>,
    /// One tree per output per round
    rounds: Vec<Vec<XGBNode>>,
}

impl XGBoost {
    pub fn new_regressor(config: XGBoostConfig) -> Self {
        Self {
            config,
            n_classes: 0,
            n_features: 0,
            base_scores: Vec::new(),
            rounds: Vec::new(),
        }
    }

    pub fn new_classifier(config: XGBoostConfig, n_classes: usize) -> Self {
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

    /// Gradient and hessian per row for output `k`
    fn derivatives(&self, scores: &Array2<f64>, targets: &Array2<f64>, k: usize) -> (Vec<f64>, Vec<f64>) {
        match self.n_classes {
            0 => {
                let grad = scores.column(k).iter().zip(targets.column(k)).map(|(s, t)| s - t).collect();
                (grad, vec![1.0; scores.nrows()])
            }
            2 => scores
                .column(0)
                .iter()
                .zip(targets.column(0))
                .map(|(&s, &t)| {
                    let p = sigmoid(s);
                    (p - t, (p * (1.0 - p)).max(1e-16))
                })
                .unzip(),
            _ => {
                let mut proba = scores.clone();
                softmax_rows(&mut proba);
                proba
                    .column(k)
                    .iter()
                    .zip(targets.column(k))
                    .map(|(&p, &t)| (p - t, (2.0 * p * (1.0 - p)).max(1e-16)))
                    .unzip()
            }
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let (n, n_features) = x.dim();
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
        self.n_features = n_features;
        self.base_scores = initial_scores(y, self.n_classes);
        let targets = match self.n_classes {
            0 | 2 => y.clone().insert_axis(Axis(1)),
            k => one_hot(y, k),
        };
        let mut scores = Array2::from_shape_fn((n, outputs), |(_, k)| self.base_scores[k]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        self.rounds.clear();
        for _ in 0..self.config.n_estimators {
            let rows = subsample(&mut rng, n, self.config.subsample);
            let features = subsample(&mut rng, n_features, self.config.colsample_bytree);

            let mut trees = Vec::with_capacity(outputs);
            for k in 0..outputs {
                let (grad, hess) = self.derivatives(&scores, &targets, k);
                let builder = TreeBuilder {
                    x,
                    grad: &grad,
                    hess: &hess,
                    features: &features,
                    config: &self.config,
                };
                trees.push(builder.build(rows.clone(), 0));
            }

            // Scores advance on every row, not only the sampled ones
            for (k, tree) in trees.iter().enumerate() {
                for (i, row) in x.rows().into_iter().enumerate() {
                    scores[[i, k]] += self.config.learning_rate * tree.predict(row);
                }
            }
            self.rounds.push(trees);
        }

        debug!(rounds = self.rounds.len(), outputs, "xgboost fitted");
        Ok(self)
    }

    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.base_scores.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut scores = Array2::from_shape_fn((x.nrows(), self.n_outputs()), |(_, k)| self.base_scores[k]);
        for trees in &self.rounds {
            for (k, tree) in trees.iter().enumerate() {
                for (i, row) in x.rows().into_iter().enumerate() {
                    scores[[i, k]] += self.config.learning_rate * tree.predict(row);
                }
            }
        }
        Ok(scores)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(scores_to_proba(self.decision_function(x)?, self.n_classes))
    }
}

impl Estimator for XGBoost {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_classes == 0 {
            Ok(self.decision_function(x)?.column(0).to_owned())
        } else {
            Ok(argmax_rows(&self.predict_proba(x)?))
        }
    }

    /// Total split gain per feature, normalised
    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.rounds.is_empty() {
            return None;
        }
        let mut totals = vec![0.0; self.n_features];
        for tree in self.rounds.iter().flatten() {
            tree.accumulate_gain(&mut totals);
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        Some(Array1::from_vec(totals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> XGBoostConfig {
        XGBoostConfig {
            n_estimators: 60,
            learning_rate: 0.3,
            subsample: 0.8,
            colsample_bytree: 0.8,
            ..Default::default()
        }
    }

    #[test]
    fn test_regressor() {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| if j == 0 { i as f64 / 6.0 } else { (i % 5) as f64 });
        let y = x.column(0).mapv(|v| v * v);

        let mut model = XGBoost::new_regressor(config());
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        let mse = (&pred - &y).mapv(|e| e * e).mean().unwrap();
        assert!(mse < y.var(0.0) * 0.1, "mse {}", mse);

        let imp = model.feature_importances().unwrap();
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_binary_classifier() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = Array1::from_iter((0..40).map(|i| if i < 20 { 0.0 } else { 1.0 }));

        let mut model = XGBoost::new_classifier(config(), 2);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_multiclass_classifier() {
        let x = Array2::from_shape_fn((45, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..45).map(|i| (i / 15) as f64));

        let mut model = XGBoost::new_classifier(config(), 3);
        model.fit(&x, &y).unwrap();
        let correct = model.predict(&x).unwrap().iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 43);
        let proba = model.predict_proba(&x).unwrap();
        assert!((proba.row(7).sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_subsample_sizes() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert_eq!(subsample(&mut rng, 10, 0.8).len(), 8);
        assert_eq!(subsample(&mut rng, 3, 1.0), vec![0, 1, 2]);
    }
}
