//! Normality tests
//!
//! Shapiro-Wilk (Royston's approximation) for small and medium samples,
//! Anderson-Darling for large ones.

use super::special::{normal_cdf, normal_ppf, normal_sf};
use super::{mean, sample_std, sorted};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Anderson-Darling critical values at 15%, 10%, 5%, 2.5% and 1%
const AD_CRITICAL: [f64; 5] = [0.576, 0.656, 0.787, 0.918, 1.092];

/// Outcome of a normality test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityResult {
    pub test_name: String,
    pub statistic: f64,
    pub p_value: f64,
    pub is_normal: bool,
    pub alpha: f64,
    pub interpretation: String,
}

impl NormalityResult {
    fn new(test_name: &str, statistic: f64, p_value: f64, is_normal: bool, alpha: f64) -> Self {
        let interpretation = if is_normal {
            format!("Data appears normally distributed (p = {:.4})", p_value)
        } else {
            format!("Data does not appear normally distributed (p = {:.4})", p_value)
        };
        Self {
            test_name: test_name.to_string(),
            statistic,
            p_value,
            is_normal,
            alpha,
            interpretation,
        }
    }
}

/// Pick the test by sample size and interpret it at `alpha`.
///
/// Needs more than three values. Samples smaller than `shapiro_max_samples`
/// use Shapiro-Wilk; larger ones use Anderson-Darling, whose decision comes
/// from the 5% critical value and whose p-value is only reported coarsely
/// (0.05 when accepted, 0.01 otherwise).
pub fn normality_test(values: &[f64], alpha: f64, shapiro_max_samples: usize) -> Result<NormalityResult> {
    if values.len() <= 3 {
        return Err(PipelineError::ComputationError(format!(
            "normality test needs more than 3 values, got {}",
            values.len()
        )));
    }

    if values.len() < shapiro_max_samples {
        let (w, p) = shapiro_wilk(values)?;
        Ok(NormalityResult::new("Shapiro-Wilk", w, p, p > alpha, alpha))
    } else {
        let (a2, critical) = anderson_darling(values)?;
        let is_normal = a2 < critical[2];
        let p = if is_normal { 0.05 } else { 0.01 };
        Ok(NormalityResult::new("Anderson-Darling", a2, p, is_normal, alpha))
    }
}

/// Shapiro-Wilk W statistic and p-value
pub fn shapiro_wilk(values: &[f64]) -> Result<(f64, f64)> {
    let n = values.len();
    if n < 3 {
        return Err(PipelineError::ComputationError(
            "Shapiro-Wilk needs at least 3 values".to_string(),
        ));
    }

    let x = sorted(values);
    if x[n - 1] - x[0] <= f64::EPSILON * x[n - 1].abs().max(1.0) {
        return Err(PipelineError::ComputationError(
            "Shapiro-Wilk is undefined for a constant sample".to_string(),
        ));
    }

    let a = shapiro_coefficients(n);
    let m = mean(&x).unwrap_or(0.0);
    let ss: f64 = x.iter().map(|v| (v - m).powi(2)).sum();
    let num: f64 = a.iter().zip(&x).map(|(ai, xi)| ai * xi).sum();
    let w = (num * num / ss).min(1.0);

    let p = shapiro_p_value(w, n);
    if !w.is_finite() || !p.is_finite() {
        return Err(PipelineError::ComputationError(
            "Shapiro-Wilk produced a non-finite result".to_string(),
        ));
    }
    Ok((w, p.clamp(0.0, 1.0)))
}

fn shapiro_coefficients(n: usize) -> Vec<f64> {
    if n == 3 {
        let s = 0.5f64.sqrt();
        return vec![-s, 0.0, s];
    }

    let nf = n as f64;
    let m: Vec<f64> = (1..=n)
        .map(|i| normal_ppf((i as f64 - 0.375) / (nf + 0.25)))
        .collect();
    let mm: f64 = m.iter().map(|v| v * v).sum();
    let u = 1.0 / nf.sqrt();

    let poly = |c: f64, coeffs: [f64; 5]| {
        c + coeffs[0] * u + coeffs[1] * u.powi(2) + coeffs[2] * u.powi(3) + coeffs[3] * u.powi(4)
            + coeffs[4] * u.powi(5)
    };

    let mut a = vec![0.0; n];
    let an = poly(
        m[n - 1] / mm.sqrt(),
        [0.221_157, -0.147_981, -2.071_190, 4.434_685, -2.706_056],
    );

    if n > 5 {
        let an1 = poly(
            m[n - 2] / mm.sqrt(),
            [0.042_981, -0.293_762, -1.752_461, 5.682_633, -3.582_633],
        );
        let phi = (mm - 2.0 * m[n - 1].powi(2) - 2.0 * m[n - 2].powi(2))
            / (1.0 - 2.0 * an.powi(2) - 2.0 * an1.powi(2));
        for i in 2..n - 2 {
            a[i] = m[i] / phi.sqrt();
        }
        a[1] = -an1;
        a[n - 2] = an1;
    } else {
        let phi = (mm - 2.0 * m[n - 1].powi(2)) / (1.0 - 2.0 * an.powi(2));
        for i in 1..n - 1 {
            a[i] = m[i] / phi.sqrt();
        }
    }
    a[0] = -an;
    a[n - 1] = an;
    a
}

fn shapiro_p_value(w: f64, n: usize) -> f64 {
    if w >= 1.0 {
        return 1.0;
    }
    let nf = n as f64;

    if n == 3 {
        let p = 6.0 / std::f64::consts::PI * (w.sqrt().asin() - 0.75f64.sqrt().asin());
        return p.max(0.0);
    }

    let y = (1.0 - w).ln();
    let (w1, mu, sigma) = if n <= 11 {
        let gamma = 0.459 * nf - 2.273;
        if y >= gamma {
            return 0.0;
        }
        let w1 = -(gamma - y).ln();
        let mu = 0.5440 - 0.39978 * nf + 0.025_054 * nf.powi(2) - 0.000_671_4 * nf.powi(3);
        let sigma = (1.3822 - 0.77857 * nf + 0.062_767 * nf.powi(2) - 0.002_032_2 * nf.powi(3)).exp();
        (w1, mu, sigma)
    } else {
        let ln_n = nf.ln();
        let mu = -1.5861 - 0.31082 * ln_n - 0.083_751 * ln_n.powi(2) + 0.003_891_5 * ln_n.powi(3);
        let sigma = (-0.4803 - 0.082_676 * ln_n + 0.003_030_2 * ln_n.powi(2)).exp();
        (y, mu, sigma)
    };

    normal_sf((w1 - mu) / sigma)
}

/// Anderson-Darling A² against a normal with estimated parameters, plus the
/// sample-size adjusted critical values
pub fn anderson_darling(values: &[f64]) -> Result<(f64, [f64; 5])> {
    let n = values.len();
    let std = sample_std(values).unwrap_or(0.0);
    if n < 2 || std <= 0.0 {
        return Err(PipelineError::ComputationError(
            "Anderson-Darling is undefined for a constant sample".to_string(),
        ));
    }

    let m = mean(values).unwrap_or(0.0);
    let z: Vec<f64> = sorted(values).iter().map(|v| (v - m) / std).collect();
    let nf = n as f64;

    let s: f64 = (0..n)
        .map(|i| {
            let weight = (2 * i + 1) as f64;
            weight * (normal_cdf(z[i]).ln() + normal_sf(z[n - 1 - i]).ln())
        })
        .sum();
    let a2 = -nf - s / nf;

    if !a2.is_finite() {
        return Err(PipelineError::ComputationError(
            "Anderson-Darling produced a non-finite statistic".to_string(),
        ));
    }

    let adj = 1.0 + 4.0 / nf - 25.0 / (nf * nf);
    let critical = AD_CRITICAL.map(|c| c / adj);
    Ok((a2, critical))
}
