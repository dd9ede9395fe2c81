//! Gaussian Naive Bayes

use super::linear_models::{argmax_rows, softmax_rows};
use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// `n_classes x n_features`
    means: Array2<f64>,
    variances: Array2<f64>,
    /// Log prior per class; `None` for classes absent from training
    log_priors: Vec<Option<f64>>,
    /// Portion of the largest feature variance added to every variance
    pub var_smoothing: f64,
    is_fitted: bool,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            means: Array2::zeros((0, 0)),
            variances: Array2::zeros((0, 0)),
            log_priors: Vec::new(),
            var_smoothing: 1e-9,
            is_fitted: false,
        }
    }

    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    /// `y` holds class indices `0..n_classes`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<&mut Self> {
        let (n, p) = x.dim();
        if n != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n == 0 {
            return Err(PipelineError::ComputationError("cannot fit on zero rows".to_string()));
        }
        let k = n_classes.max(1);

        let epsilon = self.var_smoothing * x.var_axis(Axis(0), 0.0).fold(0.0f64, |m, &v| m.max(v));
        let mut means = Array2::zeros((k, p));
        let mut variances = Array2::from_elem((k, p), epsilon);
        let mut log_priors = vec![None; k];

        for class in 0..k {
            let rows: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, &v)| v.round() as usize == class)
                .map(|(i, _)| i)
                .collect();
            if rows.is_empty() {
                continue;
            }
            let subset = x.select(Axis(0), &rows);
            if let Some(mean) = subset.mean_axis(Axis(0)) {
                means.row_mut(class).assign(&mean);
            }
            let var = subset.var_axis(Axis(0), 0.0) + epsilon;
            variances.row_mut(class).assign(&var);
            log_priors[class] = Some((rows.len() as f64 / n as f64).ln());
        }

        // Guard against a zero variance when every feature is constant
        variances.mapv_inplace(|v| if v > 0.0 { v } else { 1e-9 });

        self.means = means;
        self.variances = variances;
        self.log_priors = log_priors;
        self.is_fitted = true;
        Ok(self)
    }

    /// Joint log-likelihood per row and class
    pub fn joint_log_likelihood(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        if x.ncols() != self.means.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", self.means.ncols()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let k = self.log_priors.len();
        let mut out = Array2::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (c, prior) in self.log_priors.iter().enumerate() {
                let Some(mut ll) = *prior else {
                    out[[i, c]] = f64::NEG_INFINITY;
                    continue;
                };
                for j in 0..row.len() {
                    let var = self.variances[[c, j]];
                    let diff = row[j] - self.means[[c, j]];
                    ll -= 0.5 * (2.0 * PI * var).ln() + diff * diff / (2.0 * var);
                }
                out[[i, c]] = ll;
            }
        }
        Ok(out)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut jll = self.joint_log_likelihood(x)?;
        softmax_rows(&mut jll);
        Ok(jll)
    }
}

impl Estimator for GaussianNaiveBayes {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_rows(&self.joint_log_likelihood(x)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 2.0],
            [1.2, 1.8],
            [0.8, 2.2],
            [5.0, 6.0],
            [5.3, 5.8],
            [4.9, 6.1],
        ];
        (x, array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn test_gaussian_naive_bayes() {
        let (x, y) = data();
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y, 2).unwrap();
        assert_eq!(nb.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_proba_normalised() {
        let (x, y) = data();
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y, 2).unwrap();
        let proba = nb.predict_proba(&array![[3.0, 4.0]]).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_absent_class_never_predicted() {
        let (x, y) = data();
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y, 3).unwrap();
        assert!(nb.predict(&x).unwrap().iter().all(|&c| c < 2.0));
    }

    #[test]
    fn test_absent_class_survives_json() {
        let (x, y) = data();
        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y, 3).unwrap();
        let json = serde_json::to_string(&nb).unwrap();
        let restored: GaussianNaiveBayes = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), y);
        assert_eq!(restored.predict_proba(&x).unwrap().column(2).sum(), 0.0);
    }
}
