//! Linear families: least squares with optional L1/L2 penalties, and
//! multinomial logistic regression

use super::models::Estimator;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve `A x = b` for symmetric positive (semi-)definite `A`.
///
/// A ridge proportional to the mean diagonal is added and grown until the
/// factorisation succeeds, so rank-deficient normal equations still solve.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let scale = (a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64).max(1e-12);

    for attempt in 0..6 {
        let jitter = if attempt == 0 { 0.0 } else { scale * 10f64.powi(attempt * 2 - 14) };
        if let Some(x) = cholesky_attempt(a, b, jitter) {
            return Some(x);
        }
    }
    None
}

fn cholesky_attempt(a: &Array2<f64>, b: &Array1<f64>, jitter: f64) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] + jitter - sum;
                if diag <= 1e-12 * (a[[i, i]].abs() + jitter).max(1e-300) {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (z[i] - sum) / l[[i, i]];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

fn check_rows(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(PipelineError::ComputationError("cannot fit on zero rows".to_string()));
    }
    Ok(())
}

/// Regularisation applied by [`LinearRegression`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Penalty {
    /// Ordinary least squares
    None,
    /// `alpha * ||w||^2`, solved in closed form
    Ridge { alpha: f64 },
    /// `alpha * ||w||_1` on the mean squared loss
    Lasso { alpha: f64 },
    /// `alpha * (l1_ratio * ||w||_1 + (1 - l1_ratio) / 2 * ||w||^2)`
    ElasticNet { alpha: f64, l1_ratio: f64 },
}

/// Least-squares regressor with an intercept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub penalty: Penalty,
    pub max_iter: usize,
    pub tol: f64,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new(Penalty::None)
    }
}

impl LinearRegression {
    pub fn new(penalty: Penalty) -> Self {
        Self {
            penalty,
            max_iter: 1000,
            tol: 1e-4,
            coefficients: None,
            intercept: 0.0,
        }
    }

    /// Set the coordinate-descent iteration cap
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_rows(x, y)?;

        // Centre so the intercept drops out of the penalised problem
        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.mean().unwrap_or(0.0);
        let xc = x - &x_mean;
        let yc = y - y_mean;

        let coefficients = match self.penalty {
            Penalty::None => Self::solve_normal(&xc, &yc, 0.0)?,
            Penalty::Ridge { alpha } => Self::solve_normal(&xc, &yc, alpha)?,
            Penalty::Lasso { alpha } => self.coordinate_descent(&xc, &yc, alpha, 1.0),
            Penalty::ElasticNet { alpha, l1_ratio } => self.coordinate_descent(&xc, &yc, alpha, l1_ratio),
        };

        self.intercept = y_mean - x_mean.dot(&coefficients);
        self.coefficients = Some(coefficients);
        Ok(self)
    }

    fn solve_normal(xc: &Array2<f64>, yc: &Array1<f64>, alpha: f64) -> Result<Array1<f64>> {
        let mut xtx = xc.t().dot(xc);
        for i in 0..xtx.nrows() {
            xtx[[i, i]] += alpha;
        }
        let xty = xc.t().dot(yc);
        cholesky_solve(&xtx, &xty)
            .ok_or_else(|| PipelineError::ComputationError("normal equations are singular".to_string()))
    }

    /// Cyclic coordinate descent on
    /// `1/(2n) ||y - Xw||^2 + alpha * l1 * ||w||_1 + alpha * (1 - l1) / 2 * ||w||^2`
    fn coordinate_descent(&self, xc: &Array2<f64>, yc: &Array1<f64>, alpha: f64, l1_ratio: f64) -> Array1<f64> {
        let (n, p) = xc.dim();
        let n_f = n as f64;
        let l1 = alpha * l1_ratio;
        let l2 = alpha * (1.0 - l1_ratio);

        let col_sq: Vec<f64> = (0..p).map(|j| xc.column(j).dot(&xc.column(j)) / n_f).collect();
        let mut w = Array1::<f64>::zeros(p);
        let mut residual = yc.clone();
        let y_scale = yc.iter().map(|v| v.abs()).fold(0.0, f64::max).max(1e-12);

        for _ in 0..self.max_iter {
            let mut max_delta = 0.0f64;
            for j in 0..p {
                if col_sq[j] == 0.0 {
                    continue;
                }
                let col = xc.column(j);
                let old = w[j];
                let rho = col.dot(&residual) / n_f + col_sq[j] * old;
                let new = soft_threshold(rho, l1) / (col_sq[j] + l2);
                if new != old {
                    residual.scaled_add(old - new, &col);
                    w[j] = new;
                    max_delta = max_delta.max((new - old).abs());
                }
            }
            if max_delta < self.tol * y_scale {
                break;
            }
        }
        w
    }
}

impl Estimator for LinearRegression {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let w = self.coefficients.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        Ok(x.dot(w) + self.intercept)
    }
}

/// Multinomial logistic regression with an L2 penalty `1 / (2C) ||W||^2`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    n_classes: usize,
    /// `n_features x n_classes`
    weights: Option<Array2<f64>>,
    intercepts: Array1<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

pub(crate) fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
}

/// Index of the largest value per row; the first wins ties
pub(crate) fn argmax_rows(scores: &Array2<f64>) -> Array1<f64> {
    scores
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (i, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = i;
                }
            }
            best as f64
        })
        .collect()
}

impl LogisticRegression {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            max_iter: 1000,
            tol: 1e-6,
            n_classes: 0,
            weights: None,
            intercepts: Array1::zeros(0),
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// `y` holds class indices `0..n_classes`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<&mut Self> {
        check_rows(x, y)?;
        let (n, p) = x.dim();
        let k = n_classes.max(1);
        let n_f = n as f64;

        let mut onehot = Array2::<f64>::zeros((n, k));
        for (i, &label) in y.iter().enumerate() {
            onehot[[i, (label.round() as usize).min(k - 1)]] = 1.0;
        }

        // Step from the Lipschitz bound of the mean softmax loss
        let max_row_norm = x
            .rows()
            .into_iter()
            .map(|r| r.dot(&r) + 1.0)
            .fold(0.0, f64::max);
        let reg = 1.0 / (self.c * n_f);
        let step = 1.0 / (0.5 * max_row_norm + reg);

        let mut w = Array2::<f64>::zeros((p, k));
        let mut b = Array1::<f64>::zeros(k);
        // Nesterov momentum on (w, b)
        let mut w_prev = w.clone();
        let mut b_prev = b.clone();

        for iter in 0..self.max_iter {
            let momentum = iter as f64 / (iter as f64 + 3.0);
            let w_look = &w + &((&w - &w_prev) * momentum);
            let b_look = &b + &((&b - &b_prev) * momentum);

            let mut probs = x.dot(&w_look) + &b_look;
            softmax_rows(&mut probs);
            let diff = probs - &onehot;

            let grad_w = x.t().dot(&diff) / n_f + &w_look * reg;
            let grad_b = diff.sum_axis(Axis(0)) / n_f;

            w_prev = w;
            b_prev = b;
            w = &w_look - &(&grad_w * step);
            b = &b_look - &(&grad_b * step);

            let grad_norm = grad_w.iter().chain(grad_b.iter()).map(|g| g * g).sum::<f64>().sqrt();
            if grad_norm < self.tol {
                break;
            }
        }

        self.n_classes = k;
        self.weights = Some(w);
        self.intercepts = b;
        Ok(self)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let w = self.weights.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        let mut scores = x.dot(w) + &self.intercepts;
        softmax_rows(&mut scores);
        Ok(scores)
    }
}

impl Estimator for LogisticRegression {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_rows(&self.predict_proba(x)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn line_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[1.0, 0.5], [2.0, 1.0], [3.0, 0.0], [4.0, 2.0], [5.0, 1.5], [6.0, 0.2]];
        let y = x.column(0).mapv(|v| 2.0 * v) + &x.column(1).mapv(|v| -1.0 * v) + 3.0;
        (x, y)
    }

    #[test]
    fn test_ols_recovers_coefficients() {
        let (x, y) = line_data();
        let mut model = LinearRegression::default();
        model.fit(&x, &y).unwrap();
        let w = model.coefficients().unwrap();
        assert!((w[0] - 2.0).abs() < 1e-8);
        assert!((w[1] + 1.0).abs() < 1e-8);
        assert!((model.intercept() - 3.0).abs() < 1e-8);
    }

    #[test]
    fn test_ridge_shrinks() {
        let (x, y) = line_data();
        let mut ols = LinearRegression::default();
        ols.fit(&x, &y).unwrap();
        let mut ridge = LinearRegression::new(Penalty::Ridge { alpha: 10.0 });
        ridge.fit(&x, &y).unwrap();
        let norm = |m: &LinearRegression| m.coefficients().unwrap().mapv(|v| v * v).sum();
        assert!(norm(&ridge) < norm(&ols));
    }

    #[test]
    fn test_lasso_zeroes_noise_feature() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 5) as f64 * 0.01 });
        let y = x.column(0).mapv(|v| 3.0 * v);
        let mut lasso = LinearRegression::new(Penalty::Lasso { alpha: 0.5 }).with_max_iter(2000);
        lasso.fit(&x, &y).unwrap();
        let w = lasso.coefficients().unwrap();
        assert_eq!(w[1], 0.0);
        assert!((w[0] - 3.0).abs() < 0.1);
    }

    #[test]
    fn test_duplicate_columns_still_solve() {
        let x = Array2::from_shape_fn((10, 2), |(i, _)| i as f64);
        let y = Array1::from_iter((0..10).map(|i| i as f64 * 4.0));
        let mut model = LinearRegression::default();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert!((pred[9] - 36.0).abs() < 1e-4);
    }

    #[test]
    fn test_logistic_multiclass() {
        let x = array![[0.0, 0.0], [0.2, 0.1], [5.0, 5.0], [5.2, 4.9], [0.0, 5.0], [0.1, 5.2]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let mut model = LogisticRegression::new(1.0).with_max_iter(2000);
        model.fit(&x, &y, 3).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unfitted_predict() {
        let model = LogisticRegression::default();
        assert!(matches!(model.predict(&Array2::zeros((1, 1))), Err(PipelineError::ModelNotFitted)));
    }
}
