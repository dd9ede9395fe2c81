//! Pairwise correlation of numeric columns
//!
//! Rows with a null in any numeric column are dropped first, so every pair
//! is computed on the same rows. Each pair gets Pearson, Spearman and
//! Kendall tau-b coefficients with two-sided p-values; undefined results
//! (constant column, too few rows, non-finite arithmetic) are `None`.

use crate::error::{PipelineError, Result};
use crate::stats::{self, special};
use crate::utils::table;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    pub const ALL: [CorrelationMethod; 3] = [
        CorrelationMethod::Pearson,
        CorrelationMethod::Spearman,
        CorrelationMethod::Kendall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
            CorrelationMethod::Kendall => "kendall",
        }
    }

    /// Coefficient and p-value of `x` against `y`
    pub fn compute(&self, x: &[f64], y: &[f64]) -> CorrelationCell {
        let result = match self {
            CorrelationMethod::Pearson => pearson(x, y),
            CorrelationMethod::Spearman => spearman(x, y),
            CorrelationMethod::Kendall => kendall_tau_b(x, y),
        };
        match result {
            Some((r, p)) if r.is_finite() && p.is_finite() => CorrelationCell {
                correlation: Some(r),
                p_value: Some(p),
            },
            Some((r, _)) if r.is_finite() => CorrelationCell {
                correlation: Some(r),
                p_value: None,
            },
            _ => CorrelationCell::undefined(),
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationCell {
    pub correlation: Option<f64>,
    pub p_value: Option<f64>,
}

impl CorrelationCell {
    pub fn undefined() -> Self {
        Self {
            correlation: None,
            p_value: None,
        }
    }

    fn diagonal() -> Self {
        Self {
            correlation: Some(1.0),
            p_value: Some(0.0),
        }
    }
}

/// One unordered column pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    pub variable1: String,
    pub variable2: String,
    pub pearson: CorrelationCell,
    pub spearman: CorrelationCell,
    pub kendall: CorrelationCell,
    /// Mean of the defined absolute coefficients, 0 when none is defined
    pub average_abs_correlation: f64,
}

impl PairCorrelation {
    pub fn cell(&self, method: CorrelationMethod) -> &CorrelationCell {
        match method {
            CorrelationMethod::Pearson => &self.pearson,
            CorrelationMethod::Spearman => &self.spearman,
            CorrelationMethod::Kendall => &self.kendall,
        }
    }
}

/// Symmetric matrix for one method, indexed like `CorrelationReport::variables`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub method: CorrelationMethod,
    pub cells: Vec<Vec<CorrelationCell>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub methods: Vec<CorrelationMethod>,
    pub n_variables: usize,
    pub variables: Vec<String>,
    pub matrices: Vec<CorrelationMatrix>,
    /// Pairs sorted by descending average absolute coefficient
    pub correlations: Vec<PairCorrelation>,
    pub total_correlations: usize,
    /// Rows left after dropping incomplete ones
    pub samples_used: usize,
}

impl CorrelationReport {
    /// The `n` strongest pairs
    pub fn top(&self, n: usize) -> &[PairCorrelation] {
        &self.correlations[..n.min(self.correlations.len())]
    }

    pub fn matrix(&self, method: CorrelationMethod) -> Option<&CorrelationMatrix> {
        self.matrices.iter().find(|m| m.method == method)
    }

    /// Cell for a named pair
    pub fn get(&self, method: CorrelationMethod, a: &str, b: &str) -> Option<CorrelationCell> {
        let i = self.variables.iter().position(|v| v == a)?;
        let j = self.variables.iter().position(|v| v == b)?;
        self.matrix(method).map(|m| m.cells[i][j])
    }

    /// Nested `{method: {a: {b: {correlation, p_value}}}}` view
    pub fn matrices_json(&self) -> serde_json::Value {
        let mut methods = serde_json::Map::new();
        for matrix in &self.matrices {
            let mut rows = serde_json::Map::new();
            for (i, a) in self.variables.iter().enumerate() {
                let mut row = serde_json::Map::new();
                for (j, b) in self.variables.iter().enumerate() {
                    row.insert(b.clone(), serde_json::json!(matrix.cells[i][j]));
                }
                rows.insert(a.clone(), serde_json::Value::Object(row));
            }
            methods.insert(matrix.method.to_string(), serde_json::Value::Object(rows));
        }
        serde_json::Value::Object(methods)
    }
}

/// Correlate every pair of numeric columns in `df`
pub fn correlate(df: &DataFrame) -> Result<CorrelationReport> {
    let variables = table::numeric_columns(df);
    if variables.len() < 2 {
        return Err(PipelineError::ValidationError(format!(
            "correlation needs at least 2 numeric columns, found {}",
            variables.len()
        )));
    }

    let columns = complete_cases(df, &variables)?;
    let samples_used = columns.first().map_or(0, Vec::len);
    let k = variables.len();

    let pairs: Vec<(usize, usize)> = (0..k)
        .flat_map(|i| (i + 1..k).map(move |j| (i, j)))
        .collect();

    let cells: Vec<[CorrelationCell; 3]> = pairs
        .par_iter()
        .map(|&(i, j)| CorrelationMethod::ALL.map(|m| m.compute(&columns[i], &columns[j])))
        .collect();

    let mut matrices: Vec<CorrelationMatrix> = CorrelationMethod::ALL
        .iter()
        .map(|&method| CorrelationMatrix {
            method,
            cells: (0..k)
                .map(|i| {
                    (0..k)
                        .map(|j| if i == j { CorrelationCell::diagonal() } else { CorrelationCell::undefined() })
                        .collect()
                })
                .collect(),
        })
        .collect();

    let mut correlations = Vec::with_capacity(pairs.len());
    for (&(i, j), pair_cells) in pairs.iter().zip(&cells) {
        for (matrix, cell) in matrices.iter_mut().zip(pair_cells) {
            matrix.cells[i][j] = *cell;
            matrix.cells[j][i] = *cell;
        }

        let defined: Vec<f64> = pair_cells.iter().filter_map(|c| c.correlation).map(f64::abs).collect();
        if defined.len() < pair_cells.len() {
            warn!(a = %variables[i], b = %variables[j], "some coefficients undefined");
        }

        correlations.push(PairCorrelation {
            variable1: variables[i].clone(),
            variable2: variables[j].clone(),
            pearson: pair_cells[0],
            spearman: pair_cells[1],
            kendall: pair_cells[2],
            average_abs_correlation: stats::mean(&defined).unwrap_or(0.0),
        });
    }

    // Stable: ties keep enumeration order
    correlations.sort_by(|a, b| b.average_abs_correlation.total_cmp(&a.average_abs_correlation));

    info!(variables = k, pairs = correlations.len(), samples_used, "correlations computed");

    Ok(CorrelationReport {
        methods: CorrelationMethod::ALL.to_vec(),
        n_variables: k,
        variables,
        matrices,
        total_correlations: correlations.len(),
        correlations,
        samples_used,
    })
}

/// Column vectors restricted to rows where every named column is present
fn complete_cases(df: &DataFrame, names: &[String]) -> Result<Vec<Vec<f64>>> {
    let raw: Vec<Vec<Option<f64>>> = names
        .iter()
        .map(|n| table::column_f64(df, n))
        .collect::<Result<_>>()?;

    let keep: Vec<usize> = (0..df.height())
        .filter(|&i| raw.iter().all(|col| col[i].is_some()))
        .collect();

    Ok(raw
        .iter()
        .map(|col| keep.iter().filter_map(|&i| col[i]).collect())
        .collect())
}

/// Pearson r with a Student t p-value on n - 2 degrees of freedom
pub fn pearson(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len();
    if n < 3 || n != y.len() {
        return None;
    }

    let x_mean = stats::mean(x)?;
    let y_mean = stats::mean(y)?;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let (dx, dy) = (a - x_mean, b - y_mean);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }

    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = (n - 2) as f64;
    let p = if (1.0 - r.abs()) < 1e-15 {
        0.0
    } else {
        let t = r * (df / (1.0 - r * r)).sqrt();
        special::student_t_two_sided(t, df)
    };
    Some((r, p))
}

/// Spearman rho: Pearson on average ranks
pub fn spearman(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    pearson(&stats::average_ranks(x), &stats::average_ranks(y))
}

/// Kendall tau-b with the tie-corrected normal approximation for the p-value.
///
/// Counting uses Knight's merge-sort method, O(n log n).
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len();
    if n < 3 || n != y.len() {
        return None;
    }

    let mut pairs: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let x_ties = tie_groups(pairs.iter().map(|p| p.0));
    let joint_ties: f64 = run_lengths(&pairs, |a, b| a == b)
        .into_iter()
        .map(|t| pair_count(t))
        .sum();

    let mut ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let mut buffer = ys.clone();
    let swaps = merge_count(&mut ys, &mut buffer) as f64;
    let y_ties = tie_groups(ys.iter().copied());

    let n0 = pair_count(n);
    let n1: f64 = x_ties.iter().map(|&t| pair_count(t)).sum();
    let n2: f64 = y_ties.iter().map(|&t| pair_count(t)).sum();
    if n0 - n1 <= 0.0 || n0 - n2 <= 0.0 {
        return None;
    }

    let s = n0 - n1 - n2 + joint_ties - 2.0 * swaps;
    let tau = (s / ((n0 - n1) * (n0 - n2)).sqrt()).clamp(-1.0, 1.0);

    let nf = n as f64;
    let tie_sums = |ties: &[usize]| {
        ties.iter().fold((0.0, 0.0, 0.0), |(v0, v1, v2), &t| {
            let t = t as f64;
            (
                v0 + t * (t - 1.0) * (2.0 * t + 5.0),
                v1 + t * (t - 1.0),
                v2 + t * (t - 1.0) * (t - 2.0),
            )
        })
    };
    let (xt0, xt1, xt2) = tie_sums(&x_ties);
    let (yt0, yt1, yt2) = tie_sums(&y_ties);

    let var_s = (nf * (nf - 1.0) * (2.0 * nf + 5.0) - xt0 - yt0) / 18.0
        + xt1 * yt1 / (2.0 * nf * (nf - 1.0))
        + xt2 * yt2 / (9.0 * nf * (nf - 1.0) * (nf - 2.0));
    if var_s <= 0.0 {
        return Some((tau, f64::NAN));
    }

    let z = s / var_s.sqrt();
    let p = special::erfc(z.abs() / std::f64::consts::SQRT_2).min(1.0);
    Some((tau, p))
}

fn pair_count(t: usize) -> f64 {
    let t = t as f64;
    t * (t - 1.0) / 2.0
}

/// Sizes of runs of equal adjacent items
fn run_lengths<T, F: Fn(&T, &T) -> bool>(items: &[T], same: F) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=items.len() {
        if i == items.len() || !same(&items[i - 1], &items[i]) {
            runs.push(i - start);
            start = i;
        }
    }
    runs
}

/// Sizes of tie groups (runs longer than one) in a sorted sequence
fn tie_groups(sorted: impl Iterator<Item = f64>) -> Vec<usize> {
    let values: Vec<f64> = sorted.collect();
    run_lengths(&values, |a, b| a == b)
        .into_iter()
        .filter(|&t| t > 1)
        .collect()
}

/// Stable merge sort of `values`, returning the number of inversions
fn merge_count(values: &mut [f64], buffer: &mut [f64]) -> u64 {
    let n = values.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut swaps = {
        let (left, right) = values.split_at_mut(mid);
        let (lbuf, rbuf) = buffer.split_at_mut(mid);
        merge_count(left, lbuf) + merge_count(right, rbuf)
    };

    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < n {
        if values[j] < values[i] {
            buffer[k] = values[j];
            swaps += (mid - i) as u64;
            j += 1;
        } else {
            buffer[k] = values[i];
            i += 1;
        }
        k += 1;
    }
    buffer[k..k + mid - i].copy_from_slice(&values[i..mid]);
    k += mid - i;
    buffer[k..k + n - j].copy_from_slice(&values[j..n]);
    values.copy_from_slice(&buffer[..n]);
    swaps
}
