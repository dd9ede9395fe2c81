//! Data Preparer: feature/label selection and complete-case extraction

use crate::error::{PipelineError, Result};
use crate::utils::table::{self, column_kind, ColumnKind};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Feature columns plus one label, validated against a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSelection {
    pub features: Vec<String>,
    pub label: String,
}

impl FeatureSelection {
    /// Check that every name exists and the label is not also a feature
    pub fn validate(df: &DataFrame, features: &[String], label: &str) -> Result<Self> {
        if features.is_empty() {
            return Err(PipelineError::ValidationError(
                "at least one feature column is required".to_string(),
            ));
        }
        if features.iter().any(|f| f == label) {
            return Err(PipelineError::ValidationError(format!(
                "label column '{}' cannot also be a feature",
                label
            )));
        }
        let valid = table::valid_column_names(df);
        for name in features.iter().map(String::as_str).chain(std::iter::once(label)) {
            if !valid.iter().any(|v| v == name) {
                return Err(PipelineError::ValidationError(format!("column '{}' not found", name)));
            }
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = features.iter().find(|f| !seen.insert(f.as_str())) {
            return Err(PipelineError::ValidationError(format!(
                "feature '{}' selected more than once",
                dup
            )));
        }
        Ok(Self {
            features: features.to_vec(),
            label: label.to_string(),
        })
    }
}

/// Label values encoded as dense class indices
#[derive(Debug, Clone)]
pub struct ClassTarget {
    /// Class index per row, as `f64`
    pub y: Array1<f64>,
    /// Original class names; `labels[i]` is class `i`
    pub labels: Vec<String>,
}

/// Complete-case feature matrix and label for one selection
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub x: Array2<f64>,
    pub feature_names: Vec<String>,
    pub label: String,
    pub label_kind: ColumnKind,
    label_text: Vec<String>,
    label_numeric: Option<Vec<f64>>,
    /// Row count of the table before dropping incomplete rows
    pub original_rows: usize,
}

impl PreparedData {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    /// Label as a numeric target. Booleans map to 0/1; text is rejected.
    pub fn regression_target(&self) -> Result<Array1<f64>> {
        match &self.label_numeric {
            Some(values) => Ok(Array1::from_vec(values.clone())),
            None => Err(PipelineError::ValidationError(format!(
                "label '{}' is not numeric and cannot be used for regression",
                self.label
            ))),
        }
    }

    /// Label as class indices, classes sorted numerically for numeric labels,
    /// lexically for text and false before true for booleans
    pub fn class_target(&self) -> Result<ClassTarget> {
        let labels: Vec<String> = match &self.label_numeric {
            Some(values) => {
                let mut pairs: Vec<(f64, &str)> = values
                    .iter()
                    .copied()
                    .zip(self.label_text.iter().map(String::as_str))
                    .collect();
                pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
                pairs.dedup_by(|a, b| a.0.total_cmp(&b.0) == Ordering::Equal);
                pairs.into_iter().map(|(_, text)| text.to_string()).collect()
            }
            None => {
                let set: std::collections::BTreeSet<&str> =
                    self.label_text.iter().map(String::as_str).collect();
                set.into_iter().map(str::to_string).collect()
            }
        };

        let y: Vec<f64> = match &self.label_numeric {
            Some(values) => {
                let keys: Vec<f64> = {
                    let mut v = values.clone();
                    v.sort_by(f64::total_cmp);
                    v.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
                    v
                };
                values
                    .iter()
                    .map(|v| keys.partition_point(|k| k.total_cmp(v) == Ordering::Less) as f64)
                    .collect()
            }
            None => self
                .label_text
                .iter()
                .map(|v| labels.partition_point(|l| l.as_str() < v.as_str()) as f64)
                .collect(),
        };

        if labels.is_empty() {
            return Err(PipelineError::PreconditionError("label has no values".to_string()));
        }
        Ok(ClassTarget {
            y: Array1::from_vec(y),
            labels,
        })
    }
}

/// Select features and label, drop rows with any missing value among them and
/// split into a feature matrix and label.
///
/// Features must be numeric or boolean; encode text columns first.
pub fn prepare_data(df: &DataFrame, features: &[String], label: &str) -> Result<PreparedData> {
    let selection = FeatureSelection::validate(df, features, label)?;
    let mut wanted = selection.features.clone();
    wanted.push(selection.label.clone());
    let df = &table::select_columns(df, &wanted)?;

    for name in &selection.features {
        let kind = column_kind(table::column(df, name)?.dtype());
        if !(kind.is_numeric() || kind == ColumnKind::Boolean) {
            return Err(PipelineError::ValidationError(format!(
                "feature '{}' has {} values; encode it before training",
                name,
                kind.as_str()
            )));
        }
    }

    let feature_values = selection
        .features
        .iter()
        .map(|name| table::column_f64(df, name))
        .collect::<Result<Vec<_>>>()?;

    let label_kind = column_kind(table::column(df, label)?.dtype());
    let label_text = table::column_text(df, label)?;
    let label_numeric = if label_kind.is_numeric() || label_kind == ColumnKind::Boolean {
        Some(table::column_f64(df, label)?)
    } else {
        None
    };

    let n = df.height();
    let keep: Vec<usize> = (0..n)
        .filter(|&i| {
            feature_values.iter().all(|col| col[i].is_some())
                && label_text[i].is_some()
                && label_numeric.as_ref().map_or(true, |col| col[i].is_some())
        })
        .collect();

    if keep.is_empty() {
        return Err(PipelineError::PreconditionError(
            "no usable rows after dropping rows with missing values".to_string(),
        ));
    }

    let p = selection.features.len();
    let x = Array2::from_shape_fn((keep.len(), p), |(r, c)| {
        feature_values[c][keep[r]].unwrap_or(f64::NAN)
    });
    let texts: Vec<String> = keep
        .iter()
        .map(|&i| label_text[i].clone().unwrap_or_default())
        .collect();
    let numeric = label_numeric.map(|col| keep.iter().map(|&i| col[i].unwrap_or(f64::NAN)).collect());

    if keep.len() < n {
        debug!(dropped = n - keep.len(), "dropped incomplete rows");
    }
    info!(rows = keep.len(), features = p, label = %label, "data prepared");

    Ok(PreparedData {
        x,
        feature_names: selection.features,
        label: selection.label,
        label_kind,
        label_text: texts,
        label_numeric: numeric,
        original_rows: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> DataFrame {
        df! {
            "age" => &[Some(30i64), Some(41), None, Some(38), Some(52)],
            "income" => &[Some(1.5f64), Some(2.5), Some(3.0), None, Some(4.0)],
            "city" => &["Quito", "Lima", "Quito", "Cusco", "Lima"],
            "owner" => &[true, false, true, true, false],
        }
        .unwrap()
    }

    #[test]
    fn test_complete_case_rows() {
        let prepared = prepare_data(&sample(), &names(&["age", "income"]), "city").unwrap();
        assert_eq!(prepared.n_rows(), 3);
        assert_eq!(prepared.original_rows, 5);
        assert_eq!(prepared.x.row(2).to_vec(), vec![52.0, 4.0]);
    }

    #[test]
    fn test_text_classes_sorted_lexically() {
        let prepared = prepare_data(&sample(), &names(&["age", "income"]), "city").unwrap();
        let target = prepared.class_target().unwrap();
        assert_eq!(target.labels, names(&["Lima", "Quito"]));
        assert_eq!(target.y.to_vec(), vec![1.0, 0.0, 0.0]);
        assert!(prepared.regression_target().is_err());
    }

    #[test]
    fn test_boolean_label_false_before_true() {
        let prepared = prepare_data(&sample(), &names(&["age"]), "owner").unwrap();
        let target = prepared.class_target().unwrap();
        assert_eq!(target.labels, names(&["false", "true"]));
        assert_eq!(target.y.to_vec(), vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_numeric_classes_sorted_numerically() {
        let df = df! {
            "x" => &[1.0f64, 2.0, 3.0, 4.0],
            "grade" => &[10i64, 2, 10, 9],
        }
        .unwrap();
        let target = prepare_data(&df, &names(&["x"]), "grade").unwrap().class_target().unwrap();
        assert_eq!(target.labels, names(&["2", "9", "10"]));
        assert_eq!(target.y.to_vec(), vec![2.0, 0.0, 2.0, 1.0]);
    }

    #[test]
    fn test_unselected_columns_ignored() {
        // `city` is text but neither a feature nor the label
        let prepared = prepare_data(&sample(), &names(&["income", "age"]), "owner").unwrap();
        assert_eq!(prepared.feature_names, names(&["income", "age"]));
        assert_eq!(prepared.x.ncols(), 2);
        assert_eq!(prepared.x.row(0).to_vec(), vec![1.5, 30.0]);
        assert_eq!(prepared.original_rows, 5);
    }

    #[test]
    fn test_text_feature_rejected() {
        let err = prepare_data(&sample(), &names(&["city"]), "age").unwrap_err();
        assert!(matches!(err, PipelineError::ValidationError(_)));
    }

    #[test]
    fn test_zero_rows_is_precondition_error() {
        let df = df! {
            "a" => &[None::<f64>, None],
            "b" => &[1.0f64, 2.0],
        }
        .unwrap();
        let err = prepare_data(&df, &names(&["a"]), "b").unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionError(_)));
    }

    #[test]
    fn test_selection_rules() {
        let df = sample();
        assert!(matches!(
            FeatureSelection::validate(&df, &names(&["age", "city"]), "city"),
            Err(PipelineError::ValidationError(_))
        ));
        assert!(matches!(
            FeatureSelection::validate(&df, &names(&["height"]), "city"),
            Err(PipelineError::ValidationError(_))
        ));
        assert!(FeatureSelection::validate(&df, &names(&["age", "income"]), "city").is_ok());
    }
}
