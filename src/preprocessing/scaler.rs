//! Standard scaling of feature matrices

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standard scaling (z-score normalization): (x - mean) / std.
///
/// Uses the population standard deviation; a constant column gets scale 1
/// so it maps to zeros instead of NaN.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    /// Create a new scaler
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.mean.is_some()
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }

    /// Fit the scaler to the data
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(PipelineError::ValidationError(
                "cannot fit scaler on zero rows".to_string(),
            ));
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::ComputationError("empty matrix".to_string()))?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > 0.0 { s } else { 1.0 });
        self.mean = Some(mean);
        self.scale = Some(scale);
        Ok(self)
    }

    /// Transform the data
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = self.params()?;
        self.check_width(x, mean.len())?;
        Ok((x - mean) / scale)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Inverse transform the data
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, scale) = self.params()?;
        self.check_width(x, mean.len())?;
        Ok(x * scale + mean)
    }

    fn params(&self) -> Result<(&Array1<f64>, &Array1<f64>)> {
        match (&self.mean, &self.scale) {
            (Some(m), Some(s)) => Ok((m, s)),
            _ => Err(PipelineError::ModelNotFitted),
        }
    }

    fn check_width(&self, x: &Array2<f64>, expected: usize) -> Result<()> {
        if x.ncols() != expected {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", expected),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }
}
