//! Kernel support vector machines
//!
//! Both the classifier and the regressor solve their dual by cyclic
//! coordinate descent over a precomputed kernel matrix. The bias is folded
//! into the kernel (`K + 1`), which removes the equality constraint of the
//! classic dual and lets every coordinate update be solved exactly.

use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of samples for eager kernel matrix computation.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel bandwidth selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// `1 / (n_features * var(X))`
    Scale,
    Fixed(f64),
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter
    pub c: f64,
    pub gamma: Gamma,
    /// Width of the insensitive tube (regression only)
    pub epsilon: f64,
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: Gamma::Scale,
            epsilon: 0.1,
            tol: 1e-3,
            max_iter: 1000,
        }
    }
}

impl SVMConfig {
    fn resolve_gamma(&self, x: &Array2<f64>) -> f64 {
        match self.gamma {
            Gamma::Fixed(g) => g,
            Gamma::Scale => {
                let var = x.var(0.0);
                if var > 0.0 && x.ncols() > 0 {
                    1.0 / (x.ncols() as f64 * var)
                } else {
                    1.0
                }
            }
        }
    }
}

/// RBF kernel plus the constant bias feature
fn kernel(a: ArrayView1<f64>, b: ArrayView1<f64>, gamma: f64) -> f64 {
    let dist: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum();
    (-gamma * dist).exp() + 1.0
}

fn kernel_matrix(x: &Array2<f64>, gamma: f64) -> Result<Array2<f64>> {
    let n = x.nrows();
    if n > MAX_KERNEL_MATRIX_SAMPLES {
        return Err(PipelineError::ComputationError(format!(
            "{} training rows exceed the {} supported by the kernel solver",
            n, MAX_KERNEL_MATRIX_SAMPLES
        )));
    }
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| (0..n).map(|j| kernel(x.row(i), x.row(j), gamma)).collect())
        .collect();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((n, n), flat)?)
}

/// Kernel expansion `f(x) = sum_i coef_i * K(x, sv_i)`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KernelExpansion {
    support_vectors: Array2<f64>,
    coefficients: Array1<f64>,
}

impl KernelExpansion {
    fn from_dual(x: &Array2<f64>, coef: &Array1<f64>) -> Self {
        let support: Vec<usize> = coef
            .iter()
            .enumerate()
            .filter(|(_, c)| c.abs() > 1e-10)
            .map(|(i, _)| i)
            .collect();
        Self {
            support_vectors: x.select(Axis(0), &support),
            coefficients: coef.select(Axis(0), &support),
        }
    }

    fn decision(&self, x: &Array2<f64>, gamma: f64) -> Array1<f64> {
        let values: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                self.support_vectors
                    .rows()
                    .into_iter()
                    .zip(self.coefficients.iter())
                    .map(|(sv, c)| c * kernel(x.row(i), sv, gamma))
                    .sum()
            })
            .collect();
        Array1::from_vec(values)
    }

    fn n_support(&self) -> usize {
        self.support_vectors.nrows()
    }
}

/// Binary soft-margin dual over labels in {-1, +1}; returns `alpha_i * y_i`
fn solve_binary(k: &Array2<f64>, y: &[f64], config: &SVMConfig) -> Array1<f64> {
    let n = y.len();
    let mut alpha = vec![0.0; n];
    // f_i = sum_j alpha_j y_j K_ij
    let mut f = vec![0.0; n];

    for _ in 0..config.max_iter {
        let mut max_change = 0.0f64;
        for i in 0..n {
            let q_ii = k[[i, i]];
            if q_ii <= 0.0 {
                continue;
            }
            let grad = y[i] * f[i] - 1.0;
            let new = (alpha[i] - grad / q_ii).clamp(0.0, config.c);
            let delta = new - alpha[i];
            if delta.abs() > 1e-12 {
                alpha[i] = new;
                let scale = delta * y[i];
                for (j, fj) in f.iter_mut().enumerate() {
                    *fj += scale * k[[i, j]];
                }
                max_change = max_change.max(delta.abs());
            }
        }
        if max_change < config.tol {
            break;
        }
    }
    Array1::from_iter(alpha.iter().zip(y).map(|(a, yi)| a * yi))
}

/// Support vector classifier with an RBF kernel; one-vs-rest beyond two classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    gamma: f64,
    n_classes: usize,
    /// One machine for two classes, one per class otherwise
    machines: Vec<KernelExpansion>,
    is_fitted: bool,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            gamma: 1.0,
            n_classes: 0,
            machines: Vec::new(),
            is_fitted: false,
        }
    }

    /// `y` holds class indices `0..n_classes`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.n_classes = n_classes.max(1);
        self.gamma = self.config.resolve_gamma(x);
        let k = kernel_matrix(x, self.gamma)?;

        let positives: Vec<usize> = match self.n_classes {
            1 => Vec::new(),
            2 => vec![1],
            n => (0..n).collect(),
        };
        self.machines = positives
            .par_iter()
            .map(|&class| {
                let signs: Vec<f64> = y
                    .iter()
                    .map(|&v| if v.round() as usize == class { 1.0 } else { -1.0 })
                    .collect();
                KernelExpansion::from_dual(x, &solve_binary(&k, &signs, &self.config))
            })
            .collect();

        self.is_fitted = true;
        debug!(machines = self.machines.len(), gamma = self.gamma, "svc fitted");
        Ok(self)
    }

    /// Margin per row and machine
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut out = Array2::zeros((x.nrows(), self.machines.len()));
        for (m, machine) in self.machines.iter().enumerate() {
            out.column_mut(m).assign(&machine.decision(x, self.gamma));
        }
        Ok(out)
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(KernelExpansion::n_support).sum()
    }
}

impl Estimator for SVMClassifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(match self.n_classes {
            1 => Array1::zeros(x.nrows()),
            2 => scores.column(0).mapv(|s| if s > 0.0 { 1.0 } else { 0.0 }),
            _ => super::linear_models::argmax_rows(&scores),
        })
    }
}

/// Epsilon-insensitive support vector regressor with an RBF kernel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    config: SVMConfig,
    gamma: f64,
    expansion: Option<KernelExpansion>,
}

impl SVMRegressor {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            gamma: 1.0,
            expansion: None,
        }
    }

    /// Minimises `0.5 b'Kb - y'b + eps * |b|_1` subject to `|b_i| <= C`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n = x.nrows();
        if n != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.gamma = self.config.resolve_gamma(x);
        let k = kernel_matrix(x, self.gamma)?;
        let (c, eps) = (self.config.c, self.config.epsilon);

        let mut beta = vec![0.0; n];
        let mut f = vec![0.0; n];
        for _ in 0..self.config.max_iter {
            let mut max_change = 0.0f64;
            for i in 0..n {
                let k_ii = k[[i, i]];
                if k_ii <= 0.0 {
                    continue;
                }
                let z = beta[i] - (f[i] - y[i]) / k_ii;
                let shrunk = z.signum() * (z.abs() - eps / k_ii).max(0.0);
                let new = shrunk.clamp(-c, c);
                let delta = new - beta[i];
                if delta.abs() > 1e-12 {
                    beta[i] = new;
                    for (j, fj) in f.iter_mut().enumerate() {
                        *fj += delta * k[[i, j]];
                    }
                    max_change = max_change.max(delta.abs());
                }
            }
            if max_change < self.config.tol {
                break;
            }
        }

        self.expansion = Some(KernelExpansion::from_dual(x, &Array1::from_vec(beta)));
        Ok(self)
    }

    pub fn n_support_vectors(&self) -> usize {
        self.expansion.as_ref().map_or(0, KernelExpansion::n_support)
    }
}

impl Estimator for SVMRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let expansion = self.expansion.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        Ok(expansion.decision(x, self.gamma))
    }
}
