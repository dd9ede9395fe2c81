//! Model-family dispatch table
//!
//! Each [`ModelKind`] maps to a [`ModelStrategy`]: how to fit it, whether it
//! sees standardized inputs, which metric family evaluates it and whether it
//! reports feature importances. Adding a family means adding one row here.

use super::config::{defaults, ModelKind};
use super::decision_tree::DecisionTree;
use super::engine::TrainedModel;
use super::gradient_boosting::{GradientBoosting, GradientBoostingConfig};
use super::knn::{KNNClassifier, WeightScheme};
use super::linear_models::{LinearRegression, LogisticRegression, Penalty};
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use super::svm::{SVMClassifier, SVMConfig, SVMRegressor};
use super::xgboost::{XGBoost, XGBoostConfig};
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Which metric bundle evaluates a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Regression,
    Classification,
}

/// Inputs every fit function receives besides the data
#[derive(Debug, Clone, Copy)]
pub struct FitContext {
    /// Number of classes; 0 for regression
    pub n_classes: usize,
    pub seed: u64,
}

pub type FitFn = fn(&Array2<f64>, &Array1<f64>, &FitContext) -> Result<TrainedModel>;

/// Dispatch entry for one model family
#[derive(Clone, Copy)]
pub struct ModelStrategy {
    pub fit: FitFn,
    /// Fit and predict on standardized features
    pub scaled: bool,
    pub metric: MetricKind,
    pub importances: bool,
}

impl std::fmt::Debug for ModelStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStrategy")
            .field("scaled", &self.scaled)
            .field("metric", &self.metric)
            .field("importances", &self.importances)
            .finish()
    }
}

const fn row(fit: FitFn, scaled: bool, metric: MetricKind, importances: bool) -> ModelStrategy {
    ModelStrategy {
        fit,
        scaled,
        metric,
        importances,
    }
}

impl ModelKind {
    pub fn strategy(&self) -> ModelStrategy {
        use MetricKind::{Classification as C, Regression as R};
        match self {
            ModelKind::LinearRegression => row(fit_linear, true, R, false),
            ModelKind::RidgeRegression => row(fit_ridge, true, R, false),
            ModelKind::LassoRegression => row(fit_lasso, true, R, false),
            ModelKind::ElasticNet => row(fit_elastic_net, true, R, false),
            ModelKind::RandomForestRegression => row(fit_forest_regressor, false, R, true),
            ModelKind::GradientBoostingRegression => row(fit_boosting_regressor, false, R, true),
            ModelKind::XgboostRegression => row(fit_xgb_regressor, false, R, true),
            ModelKind::Svr => row(fit_svr, true, R, false),
            ModelKind::LogisticRegression => row(fit_logistic, true, C, false),
            ModelKind::RandomForestClassification => row(fit_forest_classifier, false, C, true),
            ModelKind::GradientBoostingClassification => row(fit_boosting_classifier, false, C, true),
            ModelKind::XgboostClassification => row(fit_xgb_classifier, false, C, true),
            ModelKind::SvmClassification => row(fit_svc, true, C, false),
            ModelKind::KnnClassification => row(fit_knn, true, C, false),
            ModelKind::NaiveBayes => row(fit_naive_bayes, true, C, false),
            ModelKind::DecisionTreeClassification => row(fit_decision_tree, false, C, true),
        }
    }
}

fn linear(x: &Array2<f64>, y: &Array1<f64>, penalty: Penalty) -> Result<TrainedModel> {
    let mut model = LinearRegression::new(penalty).with_max_iter(defaults::COORDINATE_DESCENT_ITERS);
    model.fit(x, y)?;
    Ok(TrainedModel::Linear(model))
}

fn fit_linear(x: &Array2<f64>, y: &Array1<f64>, _: &FitContext) -> Result<TrainedModel> {
    linear(x, y, Penalty::None)
}

fn fit_ridge(x: &Array2<f64>, y: &Array1<f64>, _: &FitContext) -> Result<TrainedModel> {
    linear(x, y, Penalty::Ridge { alpha: defaults::RIDGE_ALPHA })
}

fn fit_lasso(x: &Array2<f64>, y: &Array1<f64>, _: &FitContext) -> Result<TrainedModel> {
    linear(x, y, Penalty::Lasso { alpha: defaults::LASSO_ALPHA })
}

fn fit_elastic_net(x: &Array2<f64>, y: &Array1<f64>, _: &FitContext) -> Result<TrainedModel> {
    linear(
        x,
        y,
        Penalty::ElasticNet {
            alpha: defaults::ELASTIC_NET_ALPHA,
            l1_ratio: defaults::ELASTIC_NET_L1_RATIO,
        },
    )
}

fn forest(model: RandomForest, x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = model
        .with_max_depth(defaults::FOREST_MAX_DEPTH)
        .with_min_samples_split(defaults::FOREST_MIN_SPLIT)
        .with_min_samples_leaf(defaults::FOREST_MIN_LEAF)
        .with_random_state(ctx.seed);
    model.fit(x, y)?;
    Ok(TrainedModel::RandomForest(model))
}

fn fit_forest_regressor(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    forest(RandomForest::new_regressor(defaults::FOREST_TREES), x, y, ctx)
}

fn fit_forest_classifier(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    forest(RandomForest::new_classifier(defaults::FOREST_TREES, ctx.n_classes), x, y, ctx)
}

fn boosting_config(ctx: &FitContext) -> GradientBoostingConfig {
    GradientBoostingConfig {
        n_estimators: defaults::GB_TREES,
        learning_rate: defaults::GB_LEARNING_RATE,
        max_depth: defaults::GB_MAX_DEPTH,
        min_samples_split: defaults::GB_MIN_SPLIT,
        min_samples_leaf: defaults::GB_MIN_LEAF,
        random_state: ctx.seed,
    }
}

fn fit_boosting_regressor(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = GradientBoosting::new_regressor(boosting_config(ctx));
    model.fit(x, y)?;
    Ok(TrainedModel::GradientBoosting(model))
}

fn fit_boosting_classifier(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = GradientBoosting::new_classifier(boosting_config(ctx), ctx.n_classes);
    model.fit(x, y)?;
    Ok(TrainedModel::GradientBoosting(model))
}

fn xgb_config(ctx: &FitContext) -> XGBoostConfig {
    XGBoostConfig {
        n_estimators: defaults::XGB_TREES,
        learning_rate: defaults::XGB_LEARNING_RATE,
        max_depth: defaults::XGB_MAX_DEPTH,
        min_child_weight: defaults::XGB_MIN_CHILD_WEIGHT,
        subsample: defaults::XGB_SUBSAMPLE,
        colsample_bytree: defaults::XGB_COLSAMPLE,
        random_state: ctx.seed,
        ..XGBoostConfig::default()
    }
}

fn fit_xgb_regressor(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = XGBoost::new_regressor(xgb_config(ctx));
    model.fit(x, y)?;
    Ok(TrainedModel::XGBoost(model))
}

fn fit_xgb_classifier(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = XGBoost::new_classifier(xgb_config(ctx), ctx.n_classes);
    model.fit(x, y)?;
    Ok(TrainedModel::XGBoost(model))
}

fn svm_config() -> SVMConfig {
    SVMConfig {
        c: defaults::SVM_C,
        epsilon: defaults::SVR_EPSILON,
        ..SVMConfig::default()
    }
}

fn fit_svr(x: &Array2<f64>, y: &Array1<f64>, _: &FitContext) -> Result<TrainedModel> {
    let mut model = SVMRegressor::new(svm_config());
    model.fit(x, y)?;
    Ok(TrainedModel::Svr(model))
}

fn fit_svc(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = SVMClassifier::new(svm_config());
    model.fit(x, y, ctx.n_classes)?;
    Ok(TrainedModel::Svc(model))
}

fn fit_logistic(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = LogisticRegression::new(defaults::LOGISTIC_C).with_max_iter(defaults::LOGISTIC_ITERS);
    model.fit(x, y, ctx.n_classes)?;
    Ok(TrainedModel::Logistic(model))
}

fn fit_knn(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = KNNClassifier::new(defaults::KNN_NEIGHBORS).with_weights(WeightScheme::Distance);
    model.fit(x, y, ctx.n_classes)?;
    Ok(TrainedModel::Knn(model))
}

fn fit_naive_bayes(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = GaussianNaiveBayes::new();
    model.fit(x, y, ctx.n_classes)?;
    Ok(TrainedModel::NaiveBayes(model))
}

fn fit_decision_tree(x: &Array2<f64>, y: &Array1<f64>, ctx: &FitContext) -> Result<TrainedModel> {
    let mut model = DecisionTree::new_classifier(ctx.n_classes)
        .with_max_depth(defaults::TREE_MAX_DEPTH)
        .with_min_samples_split(defaults::TREE_MIN_SPLIT)
        .with_min_samples_leaf(defaults::TREE_MIN_LEAF)
        .with_random_state(ctx.seed);
    model.fit(x, y)?;
    Ok(TrainedModel::DecisionTree(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_matches_task() {
        for kind in ModelKind::ALL {
            let expected = if kind.is_classifier() {
                MetricKind::Classification
            } else {
                MetricKind::Regression
            };
            assert_eq!(kind.strategy().metric, expected, "{}", kind);
        }
    }

    #[test]
    fn test_tree_families_unscaled_with_importances() {
        for kind in ModelKind::ALL {
            let s = kind.strategy();
            assert_eq!(s.scaled, !s.importances, "{}", kind);
        }
    }
}
