//! Pipeline configuration
//!
//! Every stage reads its knobs from one of the structs below. All of them
//! deserialize with `#[serde(default)]`, so a partial JSON document only
//! overrides the keys it names.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration shared by every stage of a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub summary: SummaryConfig,
    pub outliers: OutlierConfig,
    pub recommender: RecommenderConfig,
    pub training: TrainingConfig,
    pub export: ExportConfig,
}

impl PipelineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject values no stage can work with
    pub fn validate(&self) -> Result<()> {
        if self.loader.candidate_separators.is_empty() {
            return Err(PipelineError::ConfigError(
                "loader.candidate_separators must not be empty".to_string(),
            ));
        }
        if let Some(sep) = self.loader.candidate_separators.iter().find(|c| !c.is_ascii()) {
            return Err(PipelineError::ConfigError(format!(
                "separator {:?} is not an ASCII character",
                sep
            )));
        }
        if self.summary.outlier_k < 0.0 || self.outliers.k < 0.0 {
            return Err(PipelineError::ConfigError(
                "outlier multiplier k must be non-negative".to_string(),
            ));
        }
        if self.outliers.n_neighbors == 0 {
            return Err(PipelineError::ConfigError(
                "outliers.n_neighbors must be at least 1".to_string(),
            ));
        }
        if self.summary.histogram_min_bins == 0
            || self.summary.histogram_min_bins > self.summary.histogram_max_bins
        {
            return Err(PipelineError::ConfigError(
                "histogram bin bounds must satisfy 1 <= min <= max".to_string(),
            ));
        }
        if !(0.0 < self.training.test_size && self.training.test_size < 1.0) {
            return Err(PipelineError::ConfigError(format!(
                "training.test_size must be in (0, 1), got {}",
                self.training.test_size
            )));
        }
        Ok(())
    }

    /// Builder method to replace the summary configuration
    pub fn with_summary(mut self, summary: SummaryConfig) -> Self {
        self.summary = summary;
        self
    }

    /// Builder method to replace the recommender configuration
    pub fn with_recommender(mut self, recommender: RecommenderConfig) -> Self {
        self.recommender = recommender;
        self
    }

    /// Builder method to replace the training configuration
    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }
}

/// Tabular loader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Number of leading data lines inspected when sniffing the separator
    pub sniff_lines: usize,
    /// Number of leading bytes inspected when deciding the text encoding
    pub encoding_probe_bytes: usize,
    /// Separators tried, in priority order
    pub candidate_separators: Vec<char>,
    /// Lines starting with this character are ignored
    pub comment_prefix: char,
    /// Rows used for schema inference
    pub infer_schema_length: usize,
    /// Tokens read as null
    pub null_values: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            sniff_lines: 10,
            encoding_probe_bytes: 50_000,
            candidate_separators: vec![',', ';', '\t', '|', ' '],
            comment_prefix: '#',
            infer_schema_length: 1000,
            null_values: ["", "NA", "N/A", "NULL", "null", "None", "nan", "NaN"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Statistical summarizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub preview_rows: usize,
    pub top_n_categorical: usize,
    /// IQR multiplier used for the per-column outlier report
    pub outlier_k: f64,
    /// Significance level of the normality decision
    pub normality_alpha: f64,
    /// Sample sizes below this use Shapiro-Wilk, the rest Anderson-Darling
    pub shapiro_max_samples: usize,
    pub histogram_min_bins: usize,
    pub histogram_max_bins: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            preview_rows: 5,
            top_n_categorical: 10,
            outlier_k: 1.5,
            normality_alpha: 0.05,
            shapiro_max_samples: 5000,
            histogram_min_bins: 5,
            histogram_max_bins: 50,
        }
    }
}

impl SummaryConfig {
    /// Builder method to set the number of preview rows
    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    /// Builder method to set the number of reported categories
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n_categorical = top_n;
        self
    }
}

/// Outlier analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// IQR multiplier
    pub k: f64,
    /// Neighbours used by the KNN imputer
    pub n_neighbors: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            k: 1.5,
            n_neighbors: 5,
        }
    }
}

/// Task recommender settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Numeric labels with at most this many distinct values are treated as classes
    pub classification_max_distinct: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            classification_max_distinct: 10,
        }
    }
}

/// Data preparation and training settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seed for the split and every stochastic model
    pub random_state: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_state: 42,
        }
    }
}

impl TrainingConfig {
    /// Builder method to set the held-out fraction
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    /// Builder method to set the seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }
}

/// Artifact export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// File extension appended to download names
    pub extension: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            extension: "joblib".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.summary.preview_rows, 5);
        assert_eq!(config.summary.top_n_categorical, 10);
        assert_eq!(config.outliers.k, 1.5);
        assert_eq!(config.recommender.classification_max_distinct, 10);
        assert_eq!(config.training.random_state, 42);
        assert_eq!(config.loader.candidate_separators[0], ',');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"recommender": {"classification_max_distinct": 3}, "outliers": {"k": 3.0}}"#,
        )
        .unwrap();
        assert_eq!(config.recommender.classification_max_distinct, 3);
        assert_eq!(config.outliers.k, 3.0);
        assert_eq!(config.outliers.n_neighbors, 5);
        assert_eq!(config.training.test_size, 0.2);
    }

    #[test]
    fn test_invalid_test_size_rejected() {
        let result = PipelineConfig::from_json_str(r#"{"training": {"test_size": 1.5}}"#);
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_from_json_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"summary": {"preview_rows": 2}}"#).unwrap();
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.summary.preview_rows, 2);
    }
}
