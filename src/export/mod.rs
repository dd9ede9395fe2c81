//! Model export and serialization
//!
//! A trained artifact is packaged as one JSON blob holding the model, the
//! fitted scaler, metrics, training metadata and a save timestamp. The blob
//! keeps the historical `.joblib` file extension by default.

use crate::config::ExportConfig;
use crate::error::{PipelineError, Result};
use crate::preprocessing::StandardScaler;
use crate::training::{decode_labels, predict_with, ModelMetrics, TrainedModel, TrainingArtifact, TrainingInfo};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Serialized bytes ready for delivery
#[derive(Debug, Clone)]
pub struct DownloadPackage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub file_size_mb: f64,
}

impl DownloadPackage {
    /// Write the blob to `dir/filename`, returning the full path
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
        let path = dir.as_ref().join(&self.filename);
        self.write_to(&path)?;
        Ok(path)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&self.bytes)?;
        writer.flush()?;
        Ok(())
    }
}

/// Borrowed view serialized into the blob
#[derive(Serialize)]
struct SavedModelRef<'a> {
    model: &'a TrainedModel,
    scaler: &'a StandardScaler,
    metrics: &'a ModelMetrics,
    training_info: &'a TrainingInfo,
    class_labels: &'a Option<Vec<String>>,
    saved_at: DateTime<Utc>,
}

/// A model restored from a downloaded blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub model: TrainedModel,
    pub scaler: StandardScaler,
    pub metrics: ModelMetrics,
    pub training_info: TrainingInfo,
    #[serde(default)]
    pub class_labels: Option<Vec<String>>,
    pub saved_at: DateTime<Utc>,
}

impl SavedModel {
    /// Predict on raw feature rows, applying the stored scaler when the family needs it
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        predict_with(&self.model, &self.scaler, self.training_info.model_type, x)
    }

    pub fn predict_labels(&self, x: &Array2<f64>) -> Result<Vec<String>> {
        Ok(decode_labels(&self.predict(x)?, self.class_labels.as_deref()))
    }
}

/// `{model_type}_{label}_{YYYYmmdd_HHMMSS}.{ext}`
pub fn default_filename(artifact: &TrainingArtifact, at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        artifact.training_info.model_type,
        artifact.training_info.label_column,
        at.format("%Y%m%d_%H%M%S"),
        extension.trim_start_matches('.')
    )
}

fn with_extension(filename: &str, extension: &str) -> String {
    let ext = extension.trim_start_matches('.');
    if ext.is_empty() || filename.ends_with(&format!(".{}", ext)) {
        filename.to_string()
    } else {
        format!("{}.{}", filename, ext)
    }
}

/// Serialize an artifact into a downloadable blob
pub fn package(artifact: &TrainingArtifact, filename: Option<&str>, config: &ExportConfig) -> Result<DownloadPackage> {
    let saved_at = Utc::now();
    let blob = SavedModelRef {
        model: &artifact.model,
        scaler: &artifact.scaler,
        metrics: &artifact.metrics,
        training_info: &artifact.training_info,
        class_labels: &artifact.class_labels,
        saved_at,
    };
    let bytes = serde_json::to_vec(&blob)?;

    let filename = match filename.map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) => with_extension(name, &config.extension),
        None => default_filename(artifact, saved_at, &config.extension),
    };
    let file_size_mb = crate::utils::round_to(bytes.len() as f64 / (1024.0 * 1024.0), 2);

    info!(filename = %filename, bytes = bytes.len(), "model packaged");
    Ok(DownloadPackage {
        bytes,
        filename,
        file_size_mb,
    })
}

/// Restore a model from blob bytes produced by [`package`]
pub fn load_package(bytes: &[u8]) -> Result<SavedModel> {
    serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::SerializationError(format!("not a saved model: {}", e)))
}

/// Read and restore a saved model file
pub fn load_package_file(path: impl AsRef<Path>) -> Result<SavedModel> {
    let bytes = std::fs::read(path.as_ref())?;
    load_package(&bytes)
}
