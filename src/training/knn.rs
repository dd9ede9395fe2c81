//! K-nearest-neighbour classifier

use super::linear_models::argmax_rows;
use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Vote weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    Uniform,
    /// Inverse distance; exact matches take the whole vote
    Distance,
}

/// Max-heap entry keeping the k smallest distances; ties favour the earlier row
#[derive(PartialEq)]
struct Neighbor {
    dist: f64,
    index: usize,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then(self.index.cmp(&other.index))
    }
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum::<f64>().sqrt()
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    n_classes: usize,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl KNNClassifier {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            weights: WeightScheme::Uniform,
            n_classes: 0,
            x_train: None,
            y_train: None,
        }
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    /// Store the training rows; `y` holds class indices `0..n_classes`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(PipelineError::ComputationError("no training rows for neighbours".to_string()));
        }
        self.n_classes = n_classes.max(1);
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(self)
    }

    fn nearest(&self, point: ArrayView1<f64>, x_train: &Array2<f64>) -> Vec<Neighbor> {
        let k = self.n_neighbors.min(x_train.nrows());
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (index, row) in x_train.rows().into_iter().enumerate() {
            let candidate = Neighbor {
                dist: euclidean(point, row),
                index,
            };
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|top| candidate < *top) {
                heap.pop();
                heap.push(candidate);
            }
        }
        heap.into_vec()
    }

    fn vote(&self, neighbors: &[Neighbor], y_train: &Array1<f64>) -> Vec<f64> {
        let mut probs = vec![0.0; self.n_classes];
        let exact = neighbors.iter().any(|n| n.dist == 0.0);
        for n in neighbors {
            let weight = match self.weights {
                WeightScheme::Uniform => 1.0,
                WeightScheme::Distance if exact => f64::from(u8::from(n.dist == 0.0)),
                WeightScheme::Distance => 1.0 / n.dist,
            };
            let class = (y_train[n.index].round().max(0.0) as usize).min(self.n_classes - 1);
            probs[class] += weight;
        }
        let total: f64 = probs.iter().sum();
        if total > 0.0 {
            probs.iter_mut().for_each(|p| *p /= total);
        }
        probs
    }

    /// Weighted class shares among the neighbours (parallel over rows)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        let y_train = self.y_train.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", x_train.ncols()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.vote(&self.nearest(x.row(i), x_train), y_train))
            .collect();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), self.n_classes), flat)?)
    }
}

impl Estimator for KNNClassifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_rows(&self.predict_proba(x)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn clusters() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [5.0, 5.0],
            [5.1, 5.2],
            [5.2, 4.9],
        ];
        (x, array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn test_majority_vote() {
        let (x, y) = clusters();
        let mut knn = KNNClassifier::new(3);
        knn.fit(&x, &y, 2).unwrap();
        let pred = knn.predict(&array![[0.1, 0.1], [4.9, 5.0]]).unwrap();
        assert_eq!(pred, array![0.0, 1.0]);
    }

    #[test]
    fn test_distance_weighting_prefers_close_rows() {
        let x = array![[0.0], [1.0], [1.1], [1.2]];
        let y = array![0.0, 1.0, 1.0, 1.0];
        let mut knn = KNNClassifier::new(4).with_weights(WeightScheme::Distance);
        knn.fit(&x, &y, 2).unwrap();
        // Uniform voting would pick class 1; inverse distance favours the single close row
        let proba = knn.predict_proba(&array![[0.05]]).unwrap();
        assert!(proba[[0, 0]] > proba[[0, 1]]);
    }

    #[test]
    fn test_exact_match_takes_vote() {
        let (x, y) = clusters();
        let mut knn = KNNClassifier::new(5).with_weights(WeightScheme::Distance);
        knn.fit(&x, &y, 2).unwrap();
        let proba = knn.predict_proba(&array![[5.0, 5.0]]).unwrap();
        assert_eq!(proba[[0, 1]], 1.0);
    }

    #[test]
    fn test_k_larger_than_train() {
        let (x, y) = clusters();
        let mut knn = KNNClassifier::new(50);
        knn.fit(&x, &y, 2).unwrap();
        assert_eq!(knn.predict(&x).unwrap().len(), 6);
    }
}
