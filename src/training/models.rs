//! Evaluation metrics and the estimator trait shared by every model family

use super::config::TaskType;
use crate::error::Result;
use crate::utils::round_to;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Common interface of the fitted model families
pub trait Estimator: Send + Sync {
    /// Predict a value per row; classifiers return dense class indices as `f64`
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Normalised importance per input column (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Held-out regression scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let n = y_true.len().max(1) as f64;
        let errors: Vec<f64> = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p).collect();

        let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean = y_true.sum() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e * e).sum();

        // A constant target gives r2 = 1 for a perfect fit, 0 otherwise
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
        }
    }
}

/// Scores of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Averaged scores over all classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageScores {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassScores>,
    pub macro_avg: AverageScores,
    pub weighted_avg: AverageScores,
}

/// Held-out classification scores
///
/// Headline precision, recall and F1 follow one rule: with two classes they
/// describe the second class in sorted order, with more they are macro
/// averages, and with a single class they describe that class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub classification_report: ClassificationReport,
    /// Rows are true classes, columns predicted classes, both in `labels` order
    pub confusion_matrix: Vec<Vec<usize>>,
    pub labels: Vec<String>,
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    ratio(2.0 * precision * recall, precision + recall)
}

impl ClassificationMetrics {
    /// `y_true` and `y_pred` hold class indices into `labels`
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>, labels: &[String]) -> Self {
        let k = labels.len().max(1);
        let mut confusion = vec![vec![0usize; k]; k];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let (t, p) = (t.round() as usize, p.round() as usize);
            if t < k && p < k {
                confusion[t][p] += 1;
            }
        }

        let total: usize = confusion.iter().flatten().sum();
        let correct: usize = (0..k).map(|c| confusion[c][c]).sum();

        let classes: Vec<ClassScores> = (0..k)
            .map(|c| {
                let tp = confusion[c][c] as f64;
                let predicted: usize = (0..k).map(|r| confusion[r][c]).sum();
                let support: usize = confusion[c].iter().sum();
                let precision = ratio(tp, predicted as f64);
                let recall = ratio(tp, support as f64);
                ClassScores {
                    label: labels.get(c).cloned().unwrap_or_default(),
                    precision,
                    recall,
                    f1_score: f1(precision, recall),
                    support,
                }
            })
            .collect();

        let macro_avg = AverageScores {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / k as f64,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / k as f64,
            f1_score: classes.iter().map(|c| c.f1_score).sum::<f64>() / k as f64,
            support: total,
        };
        let weight = |f: fn(&ClassScores) -> f64| {
            ratio(
                classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>(),
                total as f64,
            )
        };
        let weighted_avg = AverageScores {
            precision: weight(|c| c.precision),
            recall: weight(|c| c.recall),
            f1_score: weight(|c| c.f1_score),
            support: total,
        };

        let (precision, recall, f1_score) = match k {
            1 => (classes[0].precision, classes[0].recall, classes[0].f1_score),
            2 => (classes[1].precision, classes[1].recall, classes[1].f1_score),
            _ => (macro_avg.precision, macro_avg.recall, macro_avg.f1_score),
        };

        Self {
            accuracy: ratio(correct as f64, total as f64),
            precision,
            recall,
            f1_score,
            classification_report: ClassificationReport {
                classes,
                macro_avg,
                weighted_avg,
            },
            confusion_matrix: confusion,
            labels: labels.to_vec(),
        }
    }
}

/// Importance of one requested feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Metrics bundle stored with a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub task: TaskType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub regression: Option<RegressionMetrics>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub classification: Option<ClassificationMetrics>,
    /// Present for tree and ensemble families, in requested feature order
    pub feature_importance: Option<Vec<FeatureImportance>>,
    pub training_time_secs: f64,
}

impl ModelMetrics {
    /// Pair importances with feature names, keeping the given order
    pub fn importances_for(names: &[String], values: &Array1<f64>) -> Vec<FeatureImportance> {
        names
            .iter()
            .zip(values.iter())
            .map(|(name, &v)| FeatureImportance {
                feature: name.clone(),
                importance: round_to(v, 6),
            })
            .collect()
    }

    /// Headline score: r2 for regression, accuracy for classification
    pub fn primary_score(&self) -> f64 {
        match (&self.regression, &self.classification) {
            (Some(r), _) => r.r2,
            (_, Some(c)) => c.accuracy,
            _ => 0.0,
        }
    }
}
