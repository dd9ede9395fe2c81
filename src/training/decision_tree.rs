//! CART decision tree shared by the single-tree, forest and boosting families

use super::linear_models::argmax_rows;
use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Class proportions for classification, `[mean]` for regression
    Leaf { value: Vec<f64>, n_samples: usize },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Variance of the target (regression)
    Mse,
}

/// Running sufficient statistics of one side of a split
#[derive(Debug, Clone)]
struct NodeStats {
    n: f64,
    counts: Vec<f64>,
    sum: f64,
    sq_sum: f64,
}

impl NodeStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            n: 0.0,
            counts: vec![0.0; n_classes],
            sum: 0.0,
            sq_sum: 0.0,
        }
    }

    fn add(&mut self, yi: f64, sign: f64, criterion: Criterion) {
        self.n += sign;
        match criterion {
            Criterion::Gini => {
                let class = yi.round().max(0.0) as usize;
                if let Some(c) = self.counts.get_mut(class) {
                    *c += sign;
                }
            }
            Criterion::Mse => {
                self.sum += sign * yi;
                self.sq_sum += sign * yi * yi;
            }
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.n <= 0.0 {
            return 0.0;
        }
        match criterion {
            Criterion::Gini => 1.0 - self.counts.iter().map(|c| (c / self.n).powi(2)).sum::<f64>(),
            Criterion::Mse => (self.sq_sum / self.n - (self.sum / self.n).powi(2)).max(0.0),
        }
    }

    fn leaf_value(&self, criterion: Criterion) -> Vec<f64> {
        match criterion {
            Criterion::Gini if self.n > 0.0 => self.counts.iter().map(|c| c / self.n).collect(),
            Criterion::Gini => self.counts.clone(),
            Criterion::Mse if self.n > 0.0 => vec![self.sum / self.n],
            Criterion::Mse => vec![0.0],
        }
    }
}

struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    /// Weighted impurity decrease `n * imp - n_l * imp_l - n_r * imp_r`
    decrease: f64,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at random for each split (all when `None`)
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: u64,
    n_classes: usize,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl DecisionTree {
    /// Classifier over class indices `0..n_classes`
    pub fn new_classifier(n_classes: usize) -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: 42,
            n_classes: n_classes.max(1),
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::Mse,
            n_classes: 0,
            ..Self::new_classifier(1)
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

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn is_classifier(&self) -> bool {
        self.criterion == Criterion::Gini
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.fit_rows(x, y, &rows)
    }

    /// Fit on a multiset of row indices (bootstrap samples repeat rows)
    pub fn fit_rows(&mut self, x: &Array2<f64>, y: &Array1<f64>, rows: &[usize]) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if rows.is_empty() {
            return Err(PipelineError::ComputationError("cannot grow a tree on zero rows".to_string()));
        }

        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);

        self.root = Some(self.build(x, y, rows.to_vec(), 0, &mut importances, &mut rng));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    fn stats(&self, y: &Array1<f64>, rows: &[usize]) -> NodeStats {
        let mut stats = NodeStats::empty(self.n_classes);
        for &i in rows {
            stats.add(y[i], 1.0, self.criterion);
        }
        stats
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
        rng: &mut Xoshiro256PlusPlus,
    ) -> TreeNode {
        let n_samples = rows.len();
        let stats = self.stats(y, &rows);
        let impurity = stats.impurity(self.criterion);

        let leaf = |stats: &NodeStats| TreeNode::Leaf {
            value: stats.leaf_value(self.criterion),
            n_samples,
        };

        if n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || impurity <= 1e-12
        {
            return leaf(&stats);
        }

        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(mf) = self.max_features.filter(|&mf| mf < self.n_features) {
            features.shuffle(rng);
            features.truncate(mf.max(1));
        }

        let Some(best) = self.best_split(x, y, &rows, &features, &stats, impurity) else {
            return leaf(&stats);
        };

        importances[best.feature_idx] += best.decrease;

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

        let left = Box::new(self.build(x, y, left_rows, depth + 1, importances, rng));
        let right = Box::new(self.build(x, y, right_rows, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Sorted sweep over each candidate feature, scanned in parallel
    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        features: &[usize],
        parent: &NodeStats,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let min_leaf = self.min_samples_leaf.max(1) as f64;
        let parent_weighted = parent.n * parent_impurity;

        let candidates: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut sorted: Vec<(f64, f64)> = rows.iter().map(|&i| (x[[i, feature_idx]], y[i])).collect();
                sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut left = NodeStats::empty(self.n_classes);
                let mut right = parent.clone();
                let mut best: Option<SplitCandidate> = None;

                for i in 0..sorted.len() - 1 {
                    let (value, yi) = sorted[i];
                    left.add(yi, 1.0, self.criterion);
                    right.add(yi, -1.0, self.criterion);

                    let next = sorted[i + 1].0;
                    if next <= value || left.n < min_leaf || right.n < min_leaf {
                        continue;
                    }

                    let decrease = parent_weighted
                        - left.n * left.impurity(self.criterion)
                        - right.n * right.impurity(self.criterion);
                    if decrease > 1e-12 && best.as_ref().map_or(true, |b| decrease > b.decrease) {
                        best = Some(SplitCandidate {
                            feature_idx,
                            threshold: value + (next - value) / 2.0,
                            decrease,
                        });
                    }
                }
                best
            })
            .collect();

        // First feature wins ties so results do not depend on thread timing
        candidates.into_iter().flatten().fold(None, |acc: Option<SplitCandidate>, c| match acc {
            Some(a) if a.decrease >= c.decrease => Some(a),
            _ => Some(c),
        })
    }

    fn leaf_for<'a>(&'a self, node: &'a TreeNode, sample: ndarray::ArrayView1<f64>) -> &'a [f64] {
        let mut node = node;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Leaf class proportions per row (`n_rows x n_classes`)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        let k = self.n_classes.max(1);
        let mut proba = Array2::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (j, &p) in self.leaf_for(root, row).iter().enumerate().take(k) {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    /// Leaf mean per row (regression trees)
    pub fn predict_values(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.leaf_for(root, row).first().copied().unwrap_or(0.0))
            .collect())
    }

    pub fn importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }

    pub fn n_leaves(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }
}

impl Estimator for DecisionTree {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.is_classifier() {
            Ok(argmax_rows(&self.predict_proba(x)?))
        } else {
            self.predict_values(x)
        }
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_separates() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier(2);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn test_regressor_fits_steps() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert_eq!(pred, y);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_max_depth_and_min_leaf() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..20).map(|i| (i % 2) as f64));

        let mut tree = DecisionTree::new_classifier(2).with_max_depth(2).with_min_samples_leaf(3);
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_importance_ignores_constant_feature() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier(2);
        tree.fit(&x, &y).unwrap();
        let importances = tree.importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_proba_rows_sum_to_one() {
        let x = array![[0.0], [0.0], [1.0], [1.0], [1.0]];
        let y = array![0.0, 1.0, 1.0, 2.0, 2.0];
        let mut tree = DecisionTree::new_classifier(3).with_max_depth(1);
        tree.fit(&x, &y).unwrap();
        let proba = tree.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }
}
