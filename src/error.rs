//! Error types for the datapilot pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline.
///
/// The first four variants form the stage-facing taxonomy: malformed input,
/// stages invoked out of order, invalid selections or tokens, and numerical
/// failures. The rest wrap lower-level failures from the data stack.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Load error: {0}")]
    LoadError(String),

    #[error("Precondition failed: {0}")]
    PreconditionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl PipelineError {
    /// Stable discriminator used when an error is rendered as an `{error}` payload.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::LoadError(_) => "load_error",
            PipelineError::PreconditionError(_) => "precondition_error",
            PipelineError::ValidationError(_) => "validation_error",
            PipelineError::ComputationError(_) => "computation_error",
            PipelineError::DataError(_) => "data_error",
            PipelineError::ConfigError(_) => "config_error",
            PipelineError::IoError(_) => "io_error",
            PipelineError::SerializationError(_) => "serialization_error",
            PipelineError::ShapeError { .. } => "shape_error",
            PipelineError::ModelNotFitted => "model_not_fitted",
            PipelineError::SessionNotFound(_) => "session_not_found",
        }
    }

    /// JSON body of the form `{"error": ..., "kind": ...}`.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        })
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
