//! Session-scoped pipeline record and its stage gate
//!
//! Every operation checks that the stages it depends on have run and fails
//! with [`PipelineError::PreconditionError`] otherwise. Loading a table
//! replaces the whole record; re-selecting features discards prepared data
//! and the trained artifact.

use super::prepare::{prepare_data, FeatureSelection};
use crate::analysis::{correlate, CorrelationReport, DataSummary, Summarizer};
use crate::autopipeline::{recommend_task, ProblemType, TaskRecommendation};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::export::{self, DownloadPackage};
use crate::preprocessing::{analyze_outliers, encode_categorical, EncodingMap, OutlierAnalysis, StandardScaler};
use crate::training::{
    stratified_split, train_test_split, ModelKind, TaskType, TrainTestSplit, Trainer, TrainingArtifact,
};
use crate::utils::DataLoader;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Furthest stage reached, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Empty,
    Loaded,
    FeaturesSelected,
    Cleaned,
    Encoded,
    Recommended,
    Prepared,
    /// A trained artifact is available for download
    Trained,
}

/// Train/test matrices with the scaler fitted on the training part
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    pub split: TrainTestSplit,
    pub scaler: StandardScaler,
    pub feature_names: Vec<String>,
    pub label: String,
    /// Class names when the label is treated as categorical
    pub class_labels: Option<Vec<String>>,
    pub original_rows: usize,
}

/// Snapshot of what a session holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub has_dataframe: bool,
    pub shape: Option<(usize, usize)>,
    pub filename: Option<String>,
    pub has_features_and_label: bool,
    pub features_count: usize,
    pub label: Option<String>,
    pub has_training_data: bool,
    pub has_trained_model: bool,
    pub model_type: Option<ModelKind>,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// One user's pipeline: the current table plus everything derived from it
#[derive(Debug, Clone)]
pub struct PipelineState {
    config: PipelineConfig,
    pub df: Option<DataFrame>,
    pub df_original: Option<DataFrame>,
    pub df_cleaned: Option<DataFrame>,
    pub filename: Option<String>,
    pub encoding: Option<String>,
    pub separator: Option<char>,
    pub selection: Option<FeatureSelection>,
    pub summary: Option<DataSummary>,
    pub outliers: Option<OutlierAnalysis>,
    pub encoders: Vec<EncodingMap>,
    pub recommendation: Option<TaskRecommendation>,
    pub prepared: Option<PreparedSplit>,
    pub artifact: Option<TrainingArtifact>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl PipelineState {
    pub fn new(config: PipelineConfig) -> Self {
        let now = Utc::now();
        Self {
            config,
            df: None,
            df_original: None,
            df_cleaned: None,
            filename: None,
            encoding: None,
            separator: None,
            selection: None,
            summary: None,
            outliers: None,
            encoders: Vec::new(),
            recommendation: None,
            prepared: None,
            artifact: None,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    fn table(&self) -> Result<&DataFrame> {
        self.df
            .as_ref()
            .ok_or_else(|| PipelineError::PreconditionError("no table loaded".to_string()))
    }

    fn selected(&self) -> Result<&FeatureSelection> {
        self.selection
            .as_ref()
            .ok_or_else(|| PipelineError::PreconditionError("no features/label selected".to_string()))
    }

    /// Furthest stage reached
    pub fn stage(&self) -> Stage {
        if self.df.is_none() {
            Stage::Empty
        } else if self.artifact.is_some() {
            Stage::Trained
        } else if self.prepared.is_some() {
            Stage::Prepared
        } else if self.recommendation.is_some() {
            Stage::Recommended
        } else if !self.encoders.is_empty() {
            Stage::Encoded
        } else if self.df_cleaned.is_some() && self.selection.is_some() {
            Stage::Cleaned
        } else if self.selection.is_some() {
            Stage::FeaturesSelected
        } else {
            Stage::Loaded
        }
    }

    /// Parse CSV bytes and replace everything held so far
    pub fn load_bytes(&mut self, bytes: &[u8], filename: Option<&str>) -> Result<(usize, usize)> {
        let loaded = DataLoader::new(self.config.loader.clone()).load_bytes(bytes)?;
        let shape = loaded.df.shape();

        let created_at = self.created_at;
        *self = Self::new(self.config.clone());
        self.created_at = created_at;
        self.df_original = Some(loaded.df.clone());
        self.df = Some(loaded.df);
        self.filename = filename.map(str::to_string);
        self.encoding = Some(loaded.encoding);
        self.separator = Some(loaded.separator);

        info!(
            rows = shape.0,
            columns = shape.1,
            filename = filename.unwrap_or("<bytes>"),
            "table loaded into session"
        );
        Ok(shape)
    }

    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<(usize, usize)> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::LoadError(format!("cannot read {}: {}", path.display(), e)))?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        self.load_bytes(&bytes, name.as_deref())
    }

    pub fn summarize(&mut self) -> Result<&DataSummary> {
        let summary = Summarizer::new(self.config.summary.clone()).summarize(self.table()?)?;
        self.touch();
        Ok(self.summary.insert(summary))
    }

    pub fn correlations(&self) -> Result<CorrelationReport> {
        correlate(self.table()?)
    }

    /// Report outliers; with `clean` set the cleaned table becomes current.
    /// `k` and `n_neighbors` default to the configured values.
    pub fn analyze_outliers(
        &mut self,
        columns: &[String],
        k: Option<f64>,
        clean: bool,
        n_neighbors: Option<usize>,
    ) -> Result<&OutlierAnalysis> {
        let k = k.unwrap_or(self.config.outliers.k);
        let n_neighbors = n_neighbors.unwrap_or(self.config.outliers.n_neighbors);
        let mut analysis = analyze_outliers(self.table()?, columns, k, clean, n_neighbors)?;

        if let Some(cleaned) = analysis.cleaned.take() {
            self.df_cleaned = Some(cleaned.clone());
            self.df = Some(cleaned);
            self.prepared = None;
            self.artifact = None;
        }
        self.touch();
        Ok(self.outliers.insert(analysis))
    }

    /// Validate and store a feature/label selection, discarding downstream results
    pub fn select_features(&mut self, features: &[String], label: &str) -> Result<&FeatureSelection> {
        let selection = FeatureSelection::validate(self.table()?, features, label)?;
        self.recommendation = None;
        self.prepared = None;
        self.artifact = None;
        self.touch();
        info!(features = selection.features.len(), label = %selection.label, "features selected");
        Ok(self.selection.insert(selection))
    }

    /// Label-encode text columns; `None` encodes the selected features
    pub fn encode_categoricals(&mut self, columns: Option<&[String]>) -> Result<&[EncodingMap]> {
        let selected = self.selected()?;
        let columns = match columns {
            Some(cols) => cols.to_vec(),
            None => selected.features.clone(),
        };
        let (encoded, maps) = encode_categorical(self.table()?, &columns)?;

        self.df = Some(encoded);
        for map in maps {
            self.encoders.retain(|m| m.column != map.column);
            self.encoders.push(map);
        }
        self.prepared = None;
        self.artifact = None;
        self.touch();
        Ok(&self.encoders)
    }

    /// Recommend a task for the selected label
    pub fn recommend_task(&mut self) -> Result<&TaskRecommendation> {
        let label = self.selected()?.label.clone();
        let recommendation = recommend_task(self.table()?, &label, &self.config.recommender)?;
        self.touch();
        Ok(self.recommendation.insert(recommendation))
    }

    /// Build and store train/test matrices for the current selection.
    ///
    /// Text features are encoded on the fly. The label is treated as classes
    /// when the recommendation (computed now if missing) says classification.
    pub fn prepare_data(&mut self) -> Result<&PreparedSplit> {
        let selection = self.selected()?.clone();
        let df = self.table()?;
        let problem = match &self.recommendation {
            Some(r) => r.problem_type,
            None => recommend_task(df, &selection.label, &self.config.recommender)?.problem_type,
        };

        let (encoded, _) = encode_categorical(df, &selection.features)?;
        let prepared = prepare_data(&encoded, &selection.features, &selection.label)?;
        if prepared.n_rows() < 2 {
            return Err(PipelineError::PreconditionError(format!(
                "need at least 2 usable rows, found {}",
                prepared.n_rows()
            )));
        }

        let training = &self.config.training;
        let (split, class_labels) = match (problem, prepared.regression_target()) {
            (ProblemType::Regression, Ok(y)) | (ProblemType::Unknown, Ok(y)) => (
                train_test_split(&prepared.x, &y, training.test_size, training.random_state)?,
                None,
            ),
            _ => {
                let target = prepared.class_target()?;
                let split = if target.labels.len() >= 2 {
                    stratified_split(&prepared.x, &target.y, training.test_size, training.random_state)?
                } else {
                    train_test_split(&prepared.x, &target.y, training.test_size, training.random_state)?
                };
                (split, Some(target.labels))
            }
        };

        let mut scaler = StandardScaler::new();
        scaler.fit(&split.x_train)?;

        let result = PreparedSplit {
            split,
            scaler,
            feature_names: prepared.feature_names,
            label: prepared.label,
            class_labels,
            original_rows: prepared.original_rows,
        };
        self.touch();
        Ok(self.prepared.insert(result))
    }

    /// Train a model family on the current table and selection
    pub fn train(&mut self, kind: ModelKind) -> Result<&TrainingArtifact> {
        let selection = self.selected()?.clone();
        let trainer = Trainer::new(self.config.training.clone());
        let mut artifact = trainer.train(self.table()?, &selection.features, &selection.label, kind)?;

        if let Some(rec) = &self.recommendation {
            let recommended = match rec.problem_type {
                ProblemType::Classification => Some(TaskType::Classification),
                ProblemType::Regression => Some(TaskType::Regression),
                ProblemType::Unknown => None,
            };
            if recommended.is_some_and(|task| task != kind.task()) {
                warn!(model = %kind, recommended = %rec.problem_type, "model task differs from recommendation");
            }
        }

        // Earlier session encodings of the selected features belong to the artifact too
        let mut encoders: Vec<EncodingMap> = self
            .encoders
            .iter()
            .filter(|m| selection.features.contains(&m.column))
            .cloned()
            .collect();
        encoders.append(&mut artifact.training_info.categorical_encoders);
        artifact.training_info.categorical_encoders = encoders;

        self.touch();
        Ok(self.artifact.insert(artifact))
    }

    /// Train from a model-type token
    pub fn train_token(&mut self, token: &str) -> Result<&TrainingArtifact> {
        let kind: ModelKind = token.parse()?;
        self.train(kind)
    }

    /// Package the trained artifact for download
    pub fn download(&self, filename: Option<&str>) -> Result<DownloadPackage> {
        let artifact = self
            .artifact
            .as_ref()
            .ok_or_else(|| PipelineError::PreconditionError("no trained model available".to_string()))?;
        export::package(artifact, filename, &self.config.export)
    }

    /// Drop everything and return to [`Stage::Empty`]
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
        info!("pipeline reset");
    }

    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            has_dataframe: self.df.is_some(),
            shape: self.df.as_ref().map(DataFrame::shape),
            filename: self.filename.clone(),
            has_features_and_label: self.selection.is_some(),
            features_count: self.selection.as_ref().map_or(0, |s| s.features.len()),
            label: self.selection.as_ref().map(|s| s.label.clone()),
            has_training_data: self.prepared.is_some(),
            has_trained_model: self.artifact.is_some(),
            model_type: self.artifact.as_ref().map(|a| a.training_info.model_type),
            stage: self.stage(),
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }
}
