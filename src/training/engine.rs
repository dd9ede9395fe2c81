//! Training engine: encode, prepare, split, scale, fit and evaluate one model

use super::config::ModelKind;
use super::decision_tree::DecisionTree;
use super::gradient_boosting::GradientBoosting;
use super::knn::KNNClassifier;
use super::linear_models::{LinearRegression, LogisticRegression};
use super::models::{ClassificationMetrics, Estimator, ModelMetrics, RegressionMetrics};
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use super::registry::{FitContext, MetricKind};
use super::split::{stratified_split, train_test_split};
use super::svm::{SVMClassifier, SVMRegressor};
use super::xgboost::XGBoost;
use crate::config::TrainingConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::prepare::prepare_data;
use crate::preprocessing::{encode_categorical, EncodingMap, StandardScaler};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Enum to hold trained model variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "state", rename_all = "snake_case")]
pub enum TrainedModel {
    Linear(LinearRegression),
    Logistic(LogisticRegression),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    XGBoost(XGBoost),
    Svc(SVMClassifier),
    Svr(SVMRegressor),
    Knn(KNNClassifier),
    NaiveBayes(GaussianNaiveBayes),
}

impl TrainedModel {
    pub fn estimator(&self) -> &dyn Estimator {
        match self {
            TrainedModel::Linear(m) => m,
            TrainedModel::Logistic(m) => m,
            TrainedModel::DecisionTree(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::XGBoost(m) => m,
            TrainedModel::Svc(m) => m,
            TrainedModel::Svr(m) => m,
            TrainedModel::Knn(m) => m,
            TrainedModel::NaiveBayes(m) => m,
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.estimator().predict(x)
    }

    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        self.estimator().feature_importances()
    }
}

/// Metadata recorded alongside a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingInfo {
    pub model_type: ModelKind,
    pub features_used: Vec<String>,
    pub label_column: String,
    pub training_samples: usize,
    pub test_samples: usize,
    /// Rows in the table before incomplete rows were dropped
    pub original_samples: usize,
    pub categorical_encoders: Vec<EncodingMap>,
}

/// Model, fitted scaler, held-out metrics and metadata of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub model: TrainedModel,
    pub scaler: StandardScaler,
    pub metrics: ModelMetrics,
    pub training_info: TrainingInfo,
    /// Class names by index; `None` for regression
    pub class_labels: Option<Vec<String>>,
    pub trained_at: DateTime<Utc>,
}

impl TrainingArtifact {
    /// Predict on raw (unscaled) feature rows in `features_used` order
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        predict_with(&self.model, &self.scaler, self.training_info.model_type, x)
    }

    /// Class names for predicted indices; regression values are rendered as text
    pub fn predict_labels(&self, x: &Array2<f64>) -> Result<Vec<String>> {
        let predictions = self.predict(x)?;
        Ok(decode_labels(&predictions, self.class_labels.as_deref()))
    }
}

pub(crate) fn predict_with(
    model: &TrainedModel,
    scaler: &StandardScaler,
    kind: ModelKind,
    x: &Array2<f64>,
) -> Result<Array1<f64>> {
    if kind.strategy().scaled {
        model.predict(&scaler.transform(x)?)
    } else {
        model.predict(x)
    }
}

pub(crate) fn decode_labels(predictions: &Array1<f64>, labels: Option<&[String]>) -> Vec<String> {
    predictions
        .iter()
        .map(|&p| match labels {
            Some(labels) => labels
                .get(p.round().max(0.0) as usize)
                .cloned()
                .unwrap_or_else(|| p.to_string()),
            None => p.to_string(),
        })
        .collect()
}

/// Main training engine
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train the family named by `token`; unknown tokens fail with the valid set
    pub fn train_token(&self, df: &DataFrame, features: &[String], label: &str, token: &str) -> Result<TrainingArtifact> {
        let kind: ModelKind = token.parse()?;
        self.train(df, features, label, kind)
    }

    /// Fit one model family and evaluate it on a held-out split
    pub fn train(&self, df: &DataFrame, features: &[String], label: &str, kind: ModelKind) -> Result<TrainingArtifact> {
        let start = Instant::now();
        let strategy = kind.strategy();

        let (encoded, encoders) = encode_categorical(df, features)?;
        let prepared = prepare_data(&encoded, features, label)?;
        if prepared.n_rows() < 2 {
            return Err(PipelineError::PreconditionError(format!(
                "need at least 2 usable rows to train, found {}",
                prepared.n_rows()
            )));
        }

        let (y, class_labels) = match strategy.metric {
            MetricKind::Classification => {
                let target = prepared.class_target()?;
                (target.y, Some(target.labels))
            }
            MetricKind::Regression => (prepared.regression_target()?, None),
        };
        let n_classes = class_labels.as_ref().map_or(0, Vec::len);

        let split = if n_classes >= 2 {
            stratified_split(&prepared.x, &y, self.config.test_size, self.config.random_state)?
        } else {
            train_test_split(&prepared.x, &y, self.config.test_size, self.config.random_state)?
        };

        let mut scaler = StandardScaler::new();
        scaler.fit(&split.x_train)?;
        let (x_train, x_test) = if strategy.scaled {
            (scaler.transform(&split.x_train)?, scaler.transform(&split.x_test)?)
        } else {
            (split.x_train.clone(), split.x_test.clone())
        };

        let ctx = FitContext {
            n_classes,
            seed: self.config.random_state,
        };
        let fit_start = Instant::now();
        let model = (strategy.fit)(&x_train, &split.y_train, &ctx)?;
        debug!(
            model = %kind,
            fit_secs = fit_start.elapsed().as_secs_f64(),
            "model fitted"
        );

        let y_pred = model.predict(&x_test)?;
        let (regression, classification) = match &class_labels {
            Some(labels) => (None, Some(ClassificationMetrics::compute(&split.y_test, &y_pred, labels))),
            None => (Some(RegressionMetrics::compute(&split.y_test, &y_pred)), None),
        };
        let feature_importance = if strategy.importances {
            model
                .feature_importances()
                .map(|values| ModelMetrics::importances_for(&prepared.feature_names, &values))
        } else {
            None
        };

        let metrics = ModelMetrics {
            task: kind.task(),
            regression,
            classification,
            feature_importance,
            training_time_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            model = %kind,
            label = %label,
            train = split.y_train.len(),
            test = split.y_test.len(),
            score = metrics.primary_score(),
            "model trained"
        );

        Ok(TrainingArtifact {
            model,
            scaler,
            metrics,
            training_info: TrainingInfo {
                model_type: kind,
                features_used: prepared.feature_names.clone(),
                label_column: prepared.label.clone(),
                training_samples: split.y_train.len(),
                test_samples: split.y_test.len(),
                original_samples: prepared.original_rows,
                categorical_encoders: encoders,
            },
            class_labels,
            trained_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn regression_frame() -> DataFrame {
        let x1: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let x2: Vec<f64> = (0..40).map(|i| ((i * 7) % 11) as f64).collect();
        let y: Vec<f64> = x1.iter().zip(&x2).map(|(a, b)| 3.0 * a - 2.0 * b + 1.0).collect();
        df! { "x1" => x1, "x2" => x2, "y" => y }.unwrap()
    }

    fn classification_frame() -> DataFrame {
        let x: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let shade: Vec<&str> = (0..40).map(|i| if i % 2 == 0 { "dark" } else { "light" }).collect();
        let label: Vec<&str> = (0..40).map(|i| if i < 20 { "low" } else { "high" }).collect();
        df! { "x" => x, "shade" => shade, "label" => label }.unwrap()
    }

    #[test]
    fn test_linear_regression_artifact() {
        let trainer = Trainer::default();
        let artifact = trainer
            .train(&regression_frame(), &names(&["x1", "x2"]), "y", ModelKind::LinearRegression)
            .unwrap();
        let reg = artifact.metrics.regression.as_ref().unwrap();
        assert!(reg.r2 > 0.999);
        assert_eq!(artifact.training_info.training_samples, 32);
        assert_eq!(artifact.training_info.test_samples, 8);
        assert!(artifact.metrics.feature_importance.is_none());
        assert!(artifact.class_labels.is_none());
    }

    #[test]
    fn test_classifier_encodes_features_and_names_classes() {
        let trainer = Trainer::default();
        let artifact = trainer
            .train(
                &classification_frame(),
                &names(&["x", "shade"]),
                "label",
                ModelKind::DecisionTreeClassification,
            )
            .unwrap();
        assert_eq!(artifact.class_labels, Some(names(&["high", "low"])));
        assert_eq!(artifact.training_info.categorical_encoders.len(), 1);
        let cls = artifact.metrics.classification.as_ref().unwrap();
        assert_eq!(cls.accuracy, 1.0);
        let importance = artifact.metrics.feature_importance.as_ref().unwrap();
        assert_eq!(importance[0].feature, "x");
        assert_eq!(importance[1].feature, "shade");
    }

    #[test]
    fn test_predict_labels_on_raw_rows() {
        let artifact = Trainer::default()
            .train(
                &classification_frame(),
                &names(&["x"]),
                "label",
                ModelKind::LogisticRegression,
            )
            .unwrap();
        let labels = artifact.predict_labels(&ndarray::array![[1.0], [38.0]]).unwrap();
        assert_eq!(labels, names(&["low", "high"]));
    }

    #[test]
    fn test_unknown_token_lists_valid_set() {
        let err = Trainer::default()
            .train_token(&regression_frame(), &names(&["x1"]), "y", "deep_forest")
            .unwrap_err();
        match err {
            PipelineError::ValidationError(msg) => assert!(msg.contains("linear_regression")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_text_label_for_regression_rejected() {
        let err = Trainer::default()
            .train(&classification_frame(), &names(&["x"]), "label", ModelKind::RidgeRegression)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValidationError(_)));
    }
}
