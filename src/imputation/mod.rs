//! Missing-value imputation for outlier cleaning
//!
//! Cleaning masks out-of-bounds cells as `NaN` and hands the matrix to an
//! [`Imputer`], which fills every `NaN` from the observed cells.

mod knn;

pub use knn::{KNNImputer, KnnWeights};

use crate::error::Result;
use ndarray::Array2;

/// Fills `NaN` cells of a numeric matrix
pub trait Imputer: Send + Sync {
    /// Learn from the observed cells of `x`
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Copy of `x` with no `NaN` left, same shape
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}

/// Marker test for a masked cell
#[inline]
pub fn is_missing(v: f64) -> bool {
    v.is_nan()
}

/// Count of masked cells in `x`
pub fn missing_count(x: &Array2<f64>) -> usize {
    x.iter().filter(|v| is_missing(**v)).count()
}
