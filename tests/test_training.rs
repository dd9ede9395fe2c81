//! Integration test: every model family through the trainer

use datapilot::config::TrainingConfig;
use datapilot::error::PipelineError;
use datapilot::training::{MetricKind, ModelKind, TaskType, Trainer};
use polars::prelude::*;

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn regression_df() -> DataFrame {
    let n = 60;
    let x1: Vec<f64> = (0..n).map(|i| i as f64 / 3.0).collect();
    let x2: Vec<f64> = (0..n).map(|i| ((i * 13) % 17) as f64).collect();
    let target: Vec<f64> = x1
        .iter()
        .zip(&x2)
        .enumerate()
        .map(|(i, (a, b))| 0.4 * a + 0.05 * b + ((i % 5) as f64 - 2.0) * 0.01)
        .collect();
    df! { "x1" => x1, "x2" => x2, "target" => target }.unwrap()
}

fn classification_df() -> DataFrame {
    let n = 60;
    let f1: Vec<f64> = (0..n)
        .map(|i| if i % 2 == 0 { i as f64 / 100.0 } else { 10.0 + i as f64 / 100.0 })
        .collect();
    let f2: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
    let segment: Vec<&str> = (0..n).map(|i| ["north", "south", "east"][i % 3]).collect();
    let target: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "stay" } else { "churn" }).collect();
    df! { "f1" => f1, "f2" => f2, "segment" => segment, "target" => target }.unwrap()
}

fn multiclass_df() -> DataFrame {
    let n = 90;
    let x: Vec<f64> = (0..n).map(|i| (i % 3) as f64 * 10.0 + (i % 7) as f64 * 0.3).collect();
    let y: Vec<f64> = (0..n).map(|i| (i % 3) as f64 * -5.0 + (i % 4) as f64 * 0.2).collect();
    let grade: Vec<i64> = (0..n).map(|i| (i % 3) as i64 + 1).collect();
    df! { "x" => x, "y" => y, "grade" => grade }.unwrap()
}

#[test]
fn test_every_regressor_reports_regression_metrics() {
    let df = regression_df();
    let trainer = Trainer::new(TrainingConfig::default());
    for kind in ModelKind::ALL.into_iter().filter(|k| !k.is_classifier()) {
        let artifact = trainer
            .train(&df, &names(&["x1", "x2"]), "target", kind)
            .unwrap_or_else(|e| panic!("{} failed: {}", kind, e));
        assert_eq!(artifact.metrics.task, TaskType::Regression);
        let reg = artifact.metrics.regression.as_ref().unwrap();
        assert!(reg.rmse >= 0.0 && (reg.rmse * reg.rmse - reg.mse).abs() < 1e-9, "{}", kind);
        assert!(reg.r2 > 0.5, "{} r2 = {}", kind, reg.r2);
        assert_eq!(artifact.training_info.training_samples + artifact.training_info.test_samples, 60);
        assert_eq!(
            artifact.metrics.feature_importance.is_some(),
            kind.strategy().importances,
            "{}",
            kind
        );
    }
}

#[test]
fn test_every_classifier_reports_classification_metrics() {
    let df = classification_df();
    let trainer = Trainer::new(TrainingConfig::default());
    for kind in ModelKind::ALL.into_iter().filter(|k| k.is_classifier()) {
        let artifact = trainer
            .train(&df, &names(&["f1", "f2", "segment"]), "target", kind)
            .unwrap_or_else(|e| panic!("{} failed: {}", kind, e));
        assert_eq!(kind.strategy().metric, MetricKind::Classification);
        let cls = artifact.metrics.classification.as_ref().unwrap();
        assert_eq!(cls.labels, names(&["churn", "stay"]));
        assert_eq!(cls.confusion_matrix.len(), 2);
        let total: usize = cls.confusion_matrix.iter().flatten().sum();
        assert_eq!(total, artifact.training_info.test_samples);
        assert!(cls.accuracy >= 0.75, "{} accuracy = {}", kind, cls.accuracy);
        assert_eq!(artifact.training_info.categorical_encoders.len(), 1);
    }
}

#[test]
fn test_multiclass_uses_macro_average() {
    let df = multiclass_df();
    let trainer = Trainer::default();
    for kind in [
        ModelKind::LogisticRegression,
        ModelKind::RandomForestClassification,
        ModelKind::SvmClassification,
        ModelKind::KnnClassification,
        ModelKind::XgboostClassification,
    ] {
        let artifact = trainer.train(&df, &names(&["x", "y"]), "grade", kind).unwrap();
        let cls = artifact.metrics.classification.as_ref().unwrap();
        assert_eq!(cls.labels, names(&["1", "2", "3"]));
        let macro_avg = &cls.classification_report.macro_avg;
        assert!((cls.precision - macro_avg.precision).abs() < 1e-12, "{}", kind);
        assert!((cls.f1_score - macro_avg.f1_score).abs() < 1e-12, "{}", kind);
        // Each class holds round(30 * 0.2) = 6 rows out
        assert!(cls.classification_report.classes.iter().all(|c| c.support == 6));
    }
}

#[test]
fn test_importances_follow_requested_order() {
    let df = regression_df();
    let artifact = Trainer::default()
        .train(&df, &names(&["x2", "x1"]), "target", ModelKind::RandomForestRegression)
        .unwrap();
    let importance = artifact.metrics.feature_importance.unwrap();
    assert_eq!(importance[0].feature, "x2");
    assert_eq!(importance[1].feature, "x1");
    assert!(importance[1].importance > importance[0].importance);
}

#[test]
fn test_training_is_reproducible() {
    let df = classification_df();
    let trainer = Trainer::default();
    let features = names(&["f1", "f2"]);
    let a = trainer.train(&df, &features, "target", ModelKind::XgboostClassification).unwrap();
    let b = trainer.train(&df, &features, "target", ModelKind::XgboostClassification).unwrap();
    assert_eq!(
        a.metrics.classification.unwrap().accuracy,
        b.metrics.classification.unwrap().accuracy
    );
    assert_eq!(a.metrics.feature_importance, b.metrics.feature_importance);
}

#[test]
fn test_unknown_model_token() {
    let err = Trainer::default()
        .train_token(&regression_df(), &names(&["x1"]), "target", "neural_net")
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    for kind in ModelKind::ALL {
        assert!(err.to_string().contains(kind.as_str()));
    }
}

#[test]
fn test_zero_usable_rows() {
    let df = df! {
        "a" => &[None::<f64>, None, None],
        "b" => &[1.0, 2.0, 3.0],
    }
    .unwrap();
    let err = Trainer::default()
        .train(&df, &names(&["a"]), "b", ModelKind::LinearRegression)
        .unwrap_err();
    assert!(matches!(err, PipelineError::PreconditionError(_)));
}

#[test]
fn test_single_class_label_trains() {
    let df = df! {
        "x" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        "flag" => &["yes"; 6],
    }
    .unwrap();
    let artifact = Trainer::default()
        .train(&df, &names(&["x"]), "flag", ModelKind::NaiveBayes)
        .unwrap();
    let cls = artifact.metrics.classification.unwrap();
    assert_eq!(cls.labels, names(&["yes"]));
    assert_eq!(cls.accuracy, 1.0);
}
