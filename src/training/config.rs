//! Model family tokens and their fixed hyper-parameters

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Learning task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Regression,
    Classification,
}

/// The sixteen trainable model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    RidgeRegression,
    LassoRegression,
    ElasticNet,
    RandomForestRegression,
    GradientBoostingRegression,
    XgboostRegression,
    Svr,
    LogisticRegression,
    RandomForestClassification,
    GradientBoostingClassification,
    XgboostClassification,
    SvmClassification,
    KnnClassification,
    NaiveBayes,
    DecisionTreeClassification,
}

impl ModelKind {
    pub const ALL: [ModelKind; 16] = [
        ModelKind::LinearRegression,
        ModelKind::RidgeRegression,
        ModelKind::LassoRegression,
        ModelKind::ElasticNet,
        ModelKind::RandomForestRegression,
        ModelKind::GradientBoostingRegression,
        ModelKind::XgboostRegression,
        ModelKind::Svr,
        ModelKind::LogisticRegression,
        ModelKind::RandomForestClassification,
        ModelKind::GradientBoostingClassification,
        ModelKind::XgboostClassification,
        ModelKind::SvmClassification,
        ModelKind::KnnClassification,
        ModelKind::NaiveBayes,
        ModelKind::DecisionTreeClassification,
    ];

    /// Wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "linear_regression",
            ModelKind::RidgeRegression => "ridge_regression",
            ModelKind::LassoRegression => "lasso_regression",
            ModelKind::ElasticNet => "elastic_net",
            ModelKind::RandomForestRegression => "random_forest_regression",
            ModelKind::GradientBoostingRegression => "gradient_boosting_regression",
            ModelKind::XgboostRegression => "xgboost_regression",
            ModelKind::Svr => "svr",
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::RandomForestClassification => "random_forest_classification",
            ModelKind::GradientBoostingClassification => "gradient_boosting_classification",
            ModelKind::XgboostClassification => "xgboost_classification",
            ModelKind::SvmClassification => "svm_classification",
            ModelKind::KnnClassification => "knn_classification",
            ModelKind::NaiveBayes => "naive_bayes",
            ModelKind::DecisionTreeClassification => "decision_tree_classification",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "Linear Regression",
            ModelKind::RidgeRegression => "Ridge Regression",
            ModelKind::LassoRegression => "Lasso Regression",
            ModelKind::ElasticNet => "Elastic Net",
            ModelKind::RandomForestRegression => "Random Forest Regressor",
            ModelKind::GradientBoostingRegression => "Gradient Boosting Regressor",
            ModelKind::XgboostRegression => "XGBoost Regressor",
            ModelKind::Svr => "Support Vector Regression",
            ModelKind::LogisticRegression => "Logistic Regression",
            ModelKind::RandomForestClassification => "Random Forest Classifier",
            ModelKind::GradientBoostingClassification => "Gradient Boosting Classifier",
            ModelKind::XgboostClassification => "XGBoost Classifier",
            ModelKind::SvmClassification => "Support Vector Machine",
            ModelKind::KnnClassification => "K-Nearest Neighbors",
            ModelKind::NaiveBayes => "Naive Bayes",
            ModelKind::DecisionTreeClassification => "Decision Tree Classifier",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "Ordinary least squares; fast and interpretable baseline",
            ModelKind::RidgeRegression => "Linear regression with L2 shrinkage for correlated features",
            ModelKind::LassoRegression => "Linear regression with L1 penalty that zeroes weak features",
            ModelKind::ElasticNet => "Blend of L1 and L2 penalties",
            ModelKind::RandomForestRegression => "Bagged regression trees, robust to outliers and nonlinearity",
            ModelKind::GradientBoostingRegression => "Sequentially boosted shallow trees",
            ModelKind::XgboostRegression => "Regularized second-order boosting with row and column sampling",
            ModelKind::Svr => "Kernel regression with an epsilon-insensitive loss",
            ModelKind::LogisticRegression => "Linear classifier with calibrated class probabilities",
            ModelKind::RandomForestClassification => "Bagged decision trees with random feature subsets",
            ModelKind::GradientBoostingClassification => "Sequentially boosted trees on the log-loss",
            ModelKind::XgboostClassification => "Regularized second-order boosting for classes",
            ModelKind::SvmClassification => "Maximum-margin classifier with an RBF kernel",
            ModelKind::KnnClassification => "Distance-weighted vote of the nearest training rows",
            ModelKind::NaiveBayes => "Gaussian class-conditional likelihoods; very fast",
            ModelKind::DecisionTreeClassification => "Single interpretable tree of threshold rules",
        }
    }

    pub fn task(&self) -> TaskType {
        match self {
            ModelKind::LinearRegression
            | ModelKind::RidgeRegression
            | ModelKind::LassoRegression
            | ModelKind::ElasticNet
            | ModelKind::RandomForestRegression
            | ModelKind::GradientBoostingRegression
            | ModelKind::XgboostRegression
            | ModelKind::Svr => TaskType::Regression,
            _ => TaskType::Classification,
        }
    }

    pub fn is_classifier(&self) -> bool {
        self.task() == TaskType::Classification
    }

    /// Comma-separated list of every token
    pub fn valid_tokens() -> String {
        Self::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == token)
            .ok_or_else(|| {
                PipelineError::ValidationError(format!(
                    "unknown model type '{}'; valid types: {}",
                    token,
                    Self::valid_tokens()
                ))
            })
    }
}

/// Fixed hyper-parameters per family
pub mod defaults {
    pub const RIDGE_ALPHA: f64 = 1.0;
    pub const LASSO_ALPHA: f64 = 0.1;
    pub const ELASTIC_NET_ALPHA: f64 = 0.1;
    pub const ELASTIC_NET_L1_RATIO: f64 = 0.5;
    pub const COORDINATE_DESCENT_ITERS: usize = 2000;

    pub const LOGISTIC_C: f64 = 1.0;
    pub const LOGISTIC_ITERS: usize = 2000;

    pub const FOREST_TREES: usize = 200;
    pub const FOREST_MAX_DEPTH: usize = 15;
    pub const FOREST_MIN_SPLIT: usize = 5;
    pub const FOREST_MIN_LEAF: usize = 2;

    pub const GB_TREES: usize = 150;
    pub const GB_LEARNING_RATE: f64 = 0.1;
    pub const GB_MAX_DEPTH: usize = 5;
    pub const GB_MIN_SPLIT: usize = 5;
    pub const GB_MIN_LEAF: usize = 2;

    pub const XGB_TREES: usize = 150;
    pub const XGB_LEARNING_RATE: f64 = 0.1;
    pub const XGB_MAX_DEPTH: usize = 6;
    pub const XGB_MIN_CHILD_WEIGHT: f64 = 3.0;
    pub const XGB_SUBSAMPLE: f64 = 0.8;
    pub const XGB_COLSAMPLE: f64 = 0.8;

    pub const SVM_C: f64 = 1.0;
    pub const SVR_EPSILON: f64 = 0.1;

    pub const KNN_NEIGHBORS: usize = 5;

    pub const TREE_MAX_DEPTH: usize = 10;
    pub const TREE_MIN_SPLIT: usize = 5;
    pub const TREE_MIN_LEAF: usize = 2;
}
