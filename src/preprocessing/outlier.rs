//! IQR outlier detection and cleaning
//!
//! Bounds are `[Q1 - k·IQR, Q3 + k·IQR]`, computed per column from that
//! column's own linearly interpolated quartiles. A value exactly on a bound
//! is not an outlier. Cleaning nulls every value outside its column's bounds
//! and then fills the gaps with one KNN imputer fitted across all cleaned
//! columns together; no rows are removed.

use crate::error::{PipelineError, Result};
use crate::imputation::{missing_count, Imputer, KNNImputer};
use crate::stats;
use crate::utils::round_to;
use crate::utils::table::{self, column_kind};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Fitted bounds for a column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    /// IQR bounds of a sample with multiplier `k`
    pub fn from_values(values: &[f64], k: f64) -> Result<Self> {
        if k < 0.0 || !k.is_finite() {
            return Err(PipelineError::ValidationError(format!(
                "outlier multiplier k must be a non-negative number, got {}",
                k
            )));
        }
        let (q1, q3) = stats::quartiles(values).ok_or_else(|| {
            PipelineError::ComputationError("cannot compute quartiles of an empty column".to_string())
        })?;
        let iqr = q3 - q1;
        Ok(Self {
            lower: q1 - k * iqr,
            upper: q3 + k * iqr,
        })
    }

    /// True when `v` lies strictly outside the bounds
    pub fn is_outlier(&self, v: f64) -> bool {
        v < self.lower || v > self.upper
    }

    pub fn count(&self, values: &[f64]) -> usize {
        values.iter().filter(|&&v| self.is_outlier(v)).count()
    }
}

/// Per-column outlier counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnOutlierReport {
    pub column: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub outliers_count: usize,
    /// Share of all rows, in percent
    pub outliers_percentage: f64,
}

/// Before/after figures of a cleaning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub n_neighbors: usize,
    pub total_outliers_after: usize,
    pub outliers_cleaned: usize,
    pub rows_before: usize,
    pub rows_after: usize,
    pub rows_removed: usize,
    pub columns_after: Vec<ColumnOutlierReport>,
}

/// Result of an outlier analysis, optionally with the cleaned table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierAnalysis {
    pub method: String,
    pub k: f64,
    pub columns_analyzed: Vec<String>,
    pub columns: Vec<ColumnOutlierReport>,
    pub total_outliers_before: usize,
    pub cleaning: Option<CleaningReport>,
    #[serde(skip)]
    pub cleaned: Option<DataFrame>,
}

/// IQR outlier detector over a set of numeric columns
#[derive(Debug, Clone)]
pub struct OutlierDetector {
    k: f64,
    columns: Option<Vec<String>>,
    bounds: Vec<(String, OutlierBounds)>,
    is_fitted: bool,
}

impl OutlierDetector {
    /// Create with IQR multiplier `k`
    pub fn iqr(k: f64) -> Self {
        Self {
            k,
            columns: None,
            bounds: Vec::new(),
            is_fitted: false,
        }
    }

    /// Set specific columns to process
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Compute bounds for every target column.
    ///
    /// Without explicit columns all numeric columns are used. Explicitly
    /// named columns must exist and be numeric.
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let columns = match &self.columns {
            Some(cols) => {
                for name in cols {
                    let col = table::column(df, name)?;
                    if !column_kind(col.dtype()).is_numeric() {
                        return Err(PipelineError::ValidationError(format!(
                            "column '{}' is not numeric",
                            name
                        )));
                    }
                }
                cols.clone()
            }
            None => table::numeric_columns(df),
        };

        self.bounds.clear();
        for name in &columns {
            let values = observed(df, name)?;
            self.bounds.push((name.clone(), OutlierBounds::from_values(&values, self.k)?));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Get the computed bounds, in column order
    pub fn bounds(&self) -> &[(String, OutlierBounds)] {
        &self.bounds
    }

    /// Count outliers per column of `df` against the fitted bounds
    pub fn report(&self, df: &DataFrame) -> Result<Vec<ColumnOutlierReport>> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        let rows = df.height().max(1) as f64;
        self.bounds
            .iter()
            .map(|(name, bounds)| {
                let count = bounds.count(&observed(df, name)?);
                Ok(ColumnOutlierReport {
                    column: name.clone(),
                    lower_bound: bounds.lower,
                    upper_bound: bounds.upper,
                    outliers_count: count,
                    outliers_percentage: round_to(count as f64 / rows * 100.0, 2),
                })
            })
            .collect()
    }

    /// Target columns as a matrix with `NaN` for nulls and out-of-bound values
    fn masked_matrix(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        let n = df.height();
        let mut x = Array2::from_elem((n, self.bounds.len()), f64::NAN);
        for (j, (name, bounds)) in self.bounds.iter().enumerate() {
            for (i, v) in table::column_f64(df, name)?.into_iter().enumerate() {
                if let Some(v) = v.filter(|v| !bounds.is_outlier(*v)) {
                    x[[i, j]] = v;
                }
            }
        }
        Ok(x)
    }
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self::iqr(1.5)
    }
}

fn observed(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(table::column_f64(df, name)?.into_iter().flatten().collect())
}

/// IQR bounds of one numeric column
pub fn detect_bounds(df: &DataFrame, column: &str, k: f64) -> Result<OutlierBounds> {
    let mut detector = OutlierDetector::iqr(k).with_columns(vec![column.to_string()]);
    detector.fit(df)?;
    detector
        .bounds()
        .first()
        .map(|(_, b)| *b)
        .ok_or_else(|| PipelineError::ComputationError(format!("no bounds for '{}'", column)))
}

/// Null out-of-bound values in `columns` and refill them with a joint KNN imputer.
///
/// Cleaned columns come back as `Float64`; other columns are untouched.
pub fn clean(df: &DataFrame, columns: &[String], k: f64, n_neighbors: usize) -> Result<DataFrame> {
    if columns.is_empty() {
        return Err(PipelineError::ValidationError(
            "no columns selected for outlier cleaning".to_string(),
        ));
    }

    let mut detector = OutlierDetector::iqr(k).with_columns(columns.to_vec());
    detector.fit(df)?;
    let masked = detector.masked_matrix(df)?;
    debug!(columns = columns.len(), masked = missing_count(&masked), n_neighbors, "imputing masked cells");

    let mut imputer = KNNImputer::new(n_neighbors);
    let filled = imputer.fit_transform(&masked)?;

    let mut out = df.clone();
    for (j, (name, _)) in detector.bounds().iter().enumerate() {
        let values: Vec<Option<f64>> = filled
            .column(j)
            .iter()
            .map(|&v| if v.is_nan() { None } else { Some(v) })
            .collect();
        if values.iter().any(Option::is_none) {
            warn!(column = %name, "column has no observed values left, gaps stay null");
        }
        out.with_column(Series::new(name.as_str().into(), values))?;
    }
    Ok(out)
}

/// Report outliers in the numeric subset of `columns` and optionally clean them.
///
/// After-cleaning counts reuse the same `k`, recomputing bounds on the
/// cleaned table.
pub fn analyze_outliers(
    df: &DataFrame,
    columns: &[String],
    k: f64,
    clean_values: bool,
    n_neighbors: usize,
) -> Result<OutlierAnalysis> {
    for name in columns {
        table::column(df, name)?;
    }
    let numeric: Vec<String> = columns
        .iter()
        .filter(|name| {
            df.column(name.as_str())
                .map(|c| column_kind(c.dtype()).is_numeric())
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    if numeric.is_empty() {
        return Err(PipelineError::ValidationError(
            "no numeric columns selected for outlier analysis".to_string(),
        ));
    }

    let mut detector = OutlierDetector::iqr(k).with_columns(numeric.clone());
    detector.fit(df)?;
    let before = detector.report(df)?;
    let total_before: usize = before.iter().map(|r| r.outliers_count).sum();

    let (cleaning, cleaned) = if clean_values {
        let cleaned = clean(df, &numeric, k, n_neighbors)?;
        let mut after_detector = OutlierDetector::iqr(k).with_columns(numeric.clone());
        after_detector.fit(&cleaned)?;
        let after = after_detector.report(&cleaned)?;
        let total_after: usize = after.iter().map(|r| r.outliers_count).sum();

        info!(
            before = total_before,
            after = total_after,
            rows = cleaned.height(),
            "outliers cleaned"
        );

        let report = CleaningReport {
            n_neighbors,
            total_outliers_after: total_after,
            outliers_cleaned: total_before.saturating_sub(total_after),
            rows_before: df.height(),
            rows_after: cleaned.height(),
            rows_removed: df.height() - cleaned.height(),
            columns_after: after,
        };
        (Some(report), Some(cleaned))
    } else {
        (None, None)
    };

    Ok(OutlierAnalysis {
        method: "IQR".to_string(),
        k,
        columns_analyzed: numeric,
        columns: before,
        total_outliers_before: total_before,
        cleaning,
        cleaned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_df() -> DataFrame {
        df! {
            "normal" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
            "with_outliers" => &[1.0, 2.0, 3.0, 4.0, 5.0, 100.0, 7.0, 8.0, 9.0, -50.0],
            "label" => &["a", "b", "a", "b", "a", "b", "a", "b", "a", "b"],
        }
        .unwrap()
    }

    #[test]
    fn test_bounds_computation() {
        let df = df! { "x" => &[1i64, 2, 3, 4, 100] }.unwrap();
        let bounds = detect_bounds(&df, "x", 1.5).unwrap();
        assert_eq!(bounds.lower, -1.0);
        assert_eq!(bounds.upper, 7.0);
        assert!(bounds.is_outlier(100.0));
        assert!(!bounds.is_outlier(7.0));
    }

    #[test]
    fn test_detector_defaults_to_numeric_columns() {
        let mut detector = OutlierDetector::default();
        detector.fit(&create_test_df()).unwrap();
        let names: Vec<&str> = detector.bounds().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["normal", "with_outliers"]);
    }

    #[test]
    fn test_text_column_rejected() {
        let result = detect_bounds(&create_test_df(), "label", 1.5);
        assert!(matches!(result, Err(PipelineError::ValidationError(_))));
    }

    #[test]
    fn test_single_column_clean_imputes_mean() {
        let df = df! { "x" => &[1.0, 2.0, 3.0, 4.0, 100.0] }.unwrap();
        let cleaned = clean(&df, &["x".to_string()], 1.5, 1).unwrap();
        assert_eq!(cleaned.height(), 5);
        let values = table::column_f64(&cleaned, "x").unwrap();
        assert_eq!(values[4], Some(2.5));
        assert_eq!(values[0], Some(1.0));
    }

    #[test]
    fn test_analyze_with_cleaning() {
        let df = create_test_df();
        let columns = vec!["with_outliers".to_string(), "label".to_string()];
        let analysis = analyze_outliers(&df, &columns, 1.5, true, 3).unwrap();

        assert_eq!(analysis.columns_analyzed, vec!["with_outliers"]);
        assert_eq!(analysis.total_outliers_before, 2);
        assert_eq!(analysis.columns[0].outliers_percentage, 20.0);

        let cleaning = analysis.cleaning.unwrap();
        assert_eq!(cleaning.rows_before, 10);
        assert_eq!(cleaning.rows_after, 10);
        assert_eq!(cleaning.rows_removed, 0);
        assert!(cleaning.total_outliers_after <= analysis.total_outliers_before);
        assert!(analysis.cleaned.is_some());
    }

    #[test]
    fn test_analyze_rejects_non_numeric_only() {
        let result = analyze_outliers(&create_test_df(), &["label".to_string()], 1.5, false, 5);
        assert!(matches!(result, Err(PipelineError::ValidationError(_))));
    }

    #[test]
    fn test_negative_k_rejected() {
        assert!(OutlierBounds::from_values(&[1.0, 2.0], -1.0).is_err());
    }
}
