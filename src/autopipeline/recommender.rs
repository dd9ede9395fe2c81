//! Task recommendation from the label column
//!
//! The decision looks only at the label's dtype and distinct non-null
//! count. Each outcome maps to a fixed, ranked list of model families.

use crate::config::RecommenderConfig;
use crate::error::Result;
use crate::training::ModelKind;
use crate::utils::table::{self, column_kind, dtype_name, ColumnKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

const UNIQUE_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Classification,
    Regression,
    Unknown,
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProblemType::Classification => "classification",
            ProblemType::Regression => "regression",
            ProblemType::Unknown => "unknown",
        })
    }
}

/// Catalogue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOption {
    pub model_type: ModelKind,
    pub name: String,
    pub description: String,
}

impl From<ModelKind> for ModelOption {
    fn from(kind: ModelKind) -> Self {
        Self {
            model_type: kind,
            name: kind.display_name().to_string(),
            description: kind.description().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecommendation {
    pub label_column: String,
    pub problem_type: ProblemType,
    pub data_type: String,
    pub unique_values: usize,
    pub total_values: usize,
    pub null_values: usize,
    /// Up to ten distinct values, as text
    pub unique_samples: Vec<String>,
    /// Why this problem type was chosen
    pub recommendation: String,
    /// Catalogue suited to the problem type
    pub available_models: Vec<ModelOption>,
    /// Every token the trainer accepts, whatever the problem type
    pub valid_models: Vec<ModelKind>,
}

use ModelKind::*;

const TEXT_CLASSIFIERS: &[ModelKind] = &[
    LogisticRegression,
    RandomForestClassification,
    XgboostClassification,
    GradientBoostingClassification,
    SvmClassification,
    DecisionTreeClassification,
    NaiveBayes,
    KnnClassification,
];

const BOOLEAN_CLASSIFIERS: &[ModelKind] = &[
    LogisticRegression,
    RandomForestClassification,
    XgboostClassification,
    SvmClassification,
    NaiveBayes,
];

const INTEGER_CLASSIFIERS: &[ModelKind] = &[
    LogisticRegression,
    RandomForestClassification,
    XgboostClassification,
    SvmClassification,
    KnnClassification,
    DecisionTreeClassification,
];

const FLOAT_CLASSIFIERS: &[ModelKind] = &[
    LogisticRegression,
    RandomForestClassification,
    XgboostClassification,
    SvmClassification,
];

const REGRESSORS: &[ModelKind] = &[
    LinearRegression,
    RidgeRegression,
    LassoRegression,
    ElasticNet,
    RandomForestRegression,
    XgboostRegression,
    GradientBoostingRegression,
    Svr,
];

const FALLBACK: &[ModelKind] = &[
    LinearRegression,
    LogisticRegression,
    RandomForestRegression,
    RandomForestClassification,
];

/// Decide the problem type and catalogue for one label column
pub fn recommend_task(df: &DataFrame, label: &str, config: &RecommenderConfig) -> Result<TaskRecommendation> {
    let col = table::column(df, label)?;
    let kind = column_kind(col.dtype());
    let values = table::column_text(df, label)?;
    let distinct = table::distinct_in_order(&values);
    let unique = distinct.len();
    let cutoff = config.classification_max_distinct;

    let (problem_type, catalogue, rationale) = match kind {
        ColumnKind::Text => (
            ProblemType::Classification,
            TEXT_CLASSIFIERS,
            format!("Text label with {} classes: classification", unique),
        ),
        ColumnKind::Boolean => (
            ProblemType::Classification,
            BOOLEAN_CLASSIFIERS,
            "Boolean label: binary classification".to_string(),
        ),
        ColumnKind::Integer if unique <= cutoff => (
            ProblemType::Classification,
            INTEGER_CLASSIFIERS,
            format!("Integer label with {} distinct values (<= {}): classification", unique, cutoff),
        ),
        ColumnKind::Float if unique <= cutoff => (
            ProblemType::Classification,
            FLOAT_CLASSIFIERS,
            format!("Float label with {} distinct values (<= {}): classification", unique, cutoff),
        ),
        ColumnKind::Integer | ColumnKind::Float => (
            ProblemType::Regression,
            REGRESSORS,
            format!("Numeric label with {} distinct values (> {}): regression", unique, cutoff),
        ),
        ColumnKind::Other => (
            ProblemType::Unknown,
            FALLBACK,
            format!("Label dtype {} is not recognised: problem type unknown", col.dtype()),
        ),
    };

    info!(label, %problem_type, unique, "task recommended");

    Ok(TaskRecommendation {
        label_column: label.to_string(),
        problem_type,
        data_type: dtype_name(col.dtype()),
        unique_values: unique,
        total_values: values.len(),
        null_values: values.iter().filter(|v| v.is_none()).count(),
        unique_samples: distinct.into_iter().take(UNIQUE_SAMPLE_LIMIT).collect(),
        recommendation: rationale,
        available_models: catalogue.iter().map(|&k| ModelOption::from(k)).collect(),
        valid_models: ModelKind::ALL.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> DataFrame {
        let n = 100;
        let age: Vec<i64> = (0..n).map(|i| 20 + (i % 7)).collect();
        let income: Vec<f64> = (0..n).map(|i| 1000.0 + i as f64 * 12.5).collect();
        let city: Vec<&str> = (0..n).map(|i| ["Lima", "Quito", "Cusco"][i as usize % 3]).collect();
        let flag: Vec<bool> = (0..n).map(|i| i % 2 == 0).collect();
        df! { "age" => age, "income" => income, "city" => city, "flag" => flag }.unwrap()
    }

    #[test]
    fn test_text_label_is_classification() {
        let rec = recommend_task(&fixture(), "city", &RecommenderConfig::default()).unwrap();
        assert_eq!(rec.problem_type, ProblemType::Classification);
        assert_eq!(rec.available_models.len(), 8);
        assert_eq!(rec.valid_models, ModelKind::ALL.to_vec());
        assert_eq!(rec.unique_samples, vec!["Lima", "Quito", "Cusco"]);
    }

    #[test]
    fn test_many_floats_is_regression() {
        let rec = recommend_task(&fixture(), "income", &RecommenderConfig::default()).unwrap();
        assert_eq!(rec.problem_type, ProblemType::Regression);
        assert_eq!(rec.available_models[0].model_type, ModelKind::LinearRegression);
        assert_eq!(rec.valid_models.len(), 16);
        assert_eq!(rec.unique_samples.len(), 10);
        assert_eq!(rec.total_values, 100);
    }

    #[test]
    fn test_integer_cutoff_is_configurable() {
        let rec = recommend_task(&fixture(), "age", &RecommenderConfig::default()).unwrap();
        assert_eq!(rec.problem_type, ProblemType::Classification);
        let offered: Vec<ModelKind> = rec.available_models.iter().map(|m| m.model_type).collect();
        assert_eq!(offered, INTEGER_CLASSIFIERS.to_vec());

        let strict = RecommenderConfig {
            classification_max_distinct: 5,
        };
        let rec = recommend_task(&fixture(), "age", &strict).unwrap();
        assert_eq!(rec.problem_type, ProblemType::Regression);
    }

    #[test]
    fn test_boolean_label() {
        let rec = recommend_task(&fixture(), "flag", &RecommenderConfig::default()).unwrap();
        assert_eq!(rec.problem_type, ProblemType::Classification);
        assert_eq!(rec.available_models.len(), 5);
        assert_eq!(rec.available_models[4].model_type, ModelKind::NaiveBayes);
    }

    #[test]
    fn test_nulls_ignored_in_distinct_count() {
        let df = df! { "y" => &[Some(1.5), None, Some(2.5), None] }.unwrap();
        let rec = recommend_task(&df, "y", &RecommenderConfig::default()).unwrap();
        assert_eq!(rec.unique_values, 2);
        assert_eq!(rec.null_values, 2);
        assert_eq!(rec.problem_type, ProblemType::Classification);
    }
}
