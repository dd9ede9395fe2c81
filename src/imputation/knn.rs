//! KNN-based imputation

use crate::error::{PipelineError, Result};
use crate::imputation::{is_missing, Imputer};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Ordered float for priority queue
#[derive(Debug, Clone, Copy)]
struct DistanceIdx(f64, usize);

impl PartialEq for DistanceIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DistanceIdx {}

impl PartialOrd for DistanceIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max heap by distance, then by row so earlier rows win ties
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// How neighbour values are averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnnWeights {
    Uniform,
    Distance,
}

/// KNN imputer over the nan-euclidean distance.
///
/// Every fitted row is a potential donor, not only complete rows. A missing
/// entry in column `j` is filled from the `k` nearest rows that observe `j`.
/// The distance between two rows only uses coordinates present in both,
/// scaled up by `n_features / n_shared`. Rows sharing no coordinate are not
/// neighbours; when no donor is left the column mean is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNImputer {
    /// Number of neighbors
    n_neighbors: usize,
    weights: KnnWeights,
    fit_data: Option<Array2<f64>>,
    /// Per-column mean of the observed values, `None` for an all-missing column
    column_means: Option<Vec<Option<f64>>>,
}

impl KNNImputer {
    /// Create new KNN imputer
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            weights: KnnWeights::Uniform,
            fit_data: None,
            column_means: None,
        }
    }

    /// Set weighting scheme
    pub fn with_weights(mut self, weights: KnnWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// nan-euclidean distance, `None` when the rows share no observed coordinate
    fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<f64> {
        let mut shared = 0usize;
        let mut accum = 0.0f64;
        for (&ai, &bi) in a.iter().zip(b.iter()) {
            if is_missing(ai) || is_missing(bi) {
                continue;
            }
            shared += 1;
            accum += (ai - bi).powi(2);
        }
        if shared == 0 {
            return None;
        }
        Some((a.len() as f64 / shared as f64 * accum).sqrt())
    }

    /// k nearest donors for column `col`, nearest first
    fn find_neighbors(&self, data: &Array2<f64>, sample: ArrayView1<f64>, col: usize) -> Vec<(usize, f64)> {
        let k = self.n_neighbors;
        let mut heap: BinaryHeap<DistanceIdx> = BinaryHeap::with_capacity(k + 1);

        for (i, row) in data.outer_iter().enumerate() {
            if is_missing(row[col]) {
                continue;
            }
            let Some(dist) = Self::distance(sample, row) else {
                continue;
            };
            let candidate = DistanceIdx(dist, i);
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|DistanceIdx(d, i)| (i, d))
            .collect()
    }

    fn impute_value(&self, data: &Array2<f64>, neighbors: &[(usize, f64)], col: usize) -> Option<f64> {
        let fallback = self
            .column_means
            .as_ref()
            .and_then(|means| means.get(col).copied().flatten());

        if neighbors.is_empty() {
            return fallback;
        }

        match self.weights {
            KnnWeights::Distance => {
                if let Some(&(idx, _)) = neighbors.iter().find(|(_, d)| *d < 1e-12) {
                    return Some(data[[idx, col]]);
                }
                let (weighted, total) = neighbors.iter().fold((0.0, 0.0), |(ws, wt), &(idx, d)| {
                    (ws + data[[idx, col]] / d, wt + 1.0 / d)
                });
                if total > 0.0 {
                    Some(weighted / total)
                } else {
                    fallback
                }
            }
            KnnWeights::Uniform => {
                let sum: f64 = neighbors.iter().map(|&(idx, _)| data[[idx, col]]).sum();
                Some(sum / neighbors.len() as f64)
            }
        }
    }
}

impl Default for KNNImputer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Imputer for KNNImputer {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(PipelineError::ValidationError(
                "cannot fit imputer on an empty matrix".to_string(),
            ));
        }

        let means = x
            .columns()
            .into_iter()
            .map(|col| {
                let observed: Vec<f64> = col.iter().copied().filter(|v| !is_missing(*v)).collect();
                crate::stats::mean(&observed)
            })
            .collect();

        self.fit_data = Some(x.clone());
        self.column_means = Some(means);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let data = self.fit_data.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != data.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", data.ncols()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let fills: Vec<Vec<(usize, f64)>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                (0..x.ncols())
                    .filter(|&j| is_missing(row[j]))
                    .filter_map(|j| {
                        let neighbors = self.find_neighbors(data, row, j);
                        self.impute_value(data, &neighbors, j).map(|v| (j, v))
                    })
                    .collect()
            })
            .collect();

        let mut result = x.clone();
        for (i, row_fills) in fills.into_iter().enumerate() {
            for (j, v) in row_fills {
                result[[i, j]] = v;
            }
        }
        Ok(result)
    }
}
