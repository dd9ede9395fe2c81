//! Model training module
//!
//! Sixteen model families behind one [`Trainer`]:
//! - Linear models (OLS, Ridge, Lasso, ElasticNet) and logistic regression
//! - Decision trees and Random Forests
//! - Gradient boosting and XGBoost-style second-order boosting
//! - Support Vector Machines (classification and regression)
//! - K-Nearest Neighbors and Gaussian Naive Bayes
//!
//! Dispatch is table-driven: [`ModelKind::strategy`] returns the fit function
//! and evaluation flags for a family.

mod config;
mod engine;
mod models;
mod registry;
pub mod split;
pub mod linear_models;
pub mod decision_tree;
pub mod random_forest;
pub mod gradient_boosting;
pub mod knn;
pub mod naive_bayes;
pub mod svm;
pub mod xgboost;

pub use config::{defaults, ModelKind, TaskType};
pub use engine::{TrainedModel, Trainer, TrainingArtifact, TrainingInfo};
pub(crate) use engine::{decode_labels, predict_with};
pub use models::{
    AverageScores, ClassScores, ClassificationMetrics, ClassificationReport, Estimator, FeatureImportance,
    ModelMetrics, RegressionMetrics,
};
pub use registry::{FitContext, FitFn, MetricKind, ModelStrategy};
pub use split::{stratified_split, train_test_split, TrainTestSplit};
pub use linear_models::{LinearRegression, LogisticRegression, Penalty};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use random_forest::{MaxFeatures, RandomForest};
pub use gradient_boosting::{GradientBoosting, GradientBoostingConfig};
pub use knn::{KNNClassifier, WeightScheme};
pub use naive_bayes::GaussianNaiveBayes;
pub use svm::{Gamma, SVMClassifier, SVMConfig, SVMRegressor};
pub use xgboost::{XGBoost, XGBoostConfig};
