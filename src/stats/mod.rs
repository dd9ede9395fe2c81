//! Descriptive statistics and hypothesis tests on plain slices
//!
//! Everything here takes already-cleaned values (no nulls, all finite).

pub mod histogram;
pub mod normality;
pub mod special;

pub use histogram::{histogram, Histogram};
pub use normality::{anderson_darling, shapiro_wilk, NormalityResult};

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Variance with `ddof` delta degrees of freedom, `None` when `n <= ddof`
pub fn variance(values: &[f64], ddof: usize) -> Option<f64> {
    let n = values.len();
    if n <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (n - ddof) as f64)
}

/// Sample standard deviation (ddof 1)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    variance(values, 1).map(f64::sqrt)
}

/// Copy and sort ascending
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Quantile of ascending-sorted data with linear interpolation between
/// the two nearest ranks
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// First and third quartiles
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    let s = sorted(values);
    Some((quantile_sorted(&s, 0.25)?, quantile_sorted(&s, 0.75)?))
}

/// 1-based ranks with ties sharing their average rank
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}
