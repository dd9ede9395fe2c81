//! datapilot - guided analysis and model training for tabular data
//!
//! A session walks one table through an ordered pipeline:
//! load, summarize, correlate, clean outliers, select features and label,
//! encode, get a task recommendation, prepare, train and download.
//!
//! # Modules
//!
//! ## Pipeline
//! - [`pipeline`] - per-session state with stage preconditions, session store
//! - [`export`] - trained-model packaging and restore
//!
//! ## Analysis
//! - [`analysis`] - column summaries and pairwise correlations
//! - [`stats`] - quantiles, normality tests, histograms
//!
//! ## Data Processing
//! - [`preprocessing`] - outlier handling, label encoding, scaling
//! - [`imputation`] - nearest-neighbour imputation
//! - [`autopipeline`] - task recommendation
//!
//! ## Models
//! - [`training`] - sixteen model families, metrics and the trainer
//!
//! ## Infrastructure
//! - [`config`], [`logging`], [`utils`] - configuration, tracing setup, loading
//! - [`cli`] - command-line interface

// Core error handling
pub mod error;
pub mod config;
pub mod logging;

// Data access
pub mod utils;
pub mod stats;

// Analysis and preprocessing
pub mod analysis;
pub mod preprocessing;
pub mod imputation;
pub mod autopipeline;

// Models and pipeline
pub mod training;
pub mod pipeline;
pub mod export;

// Services
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result};

    // Configuration
    pub use crate::config::{
        ExportConfig, LoaderConfig, OutlierConfig, PipelineConfig, RecommenderConfig, SummaryConfig,
        TrainingConfig,
    };

    // Loading and analysis
    pub use crate::analysis::{correlate, summarize, CorrelationReport, DataSummary, Summarizer};
    pub use crate::utils::{load_csv_bytes, load_csv_path, DataLoader, LoadedTable};

    // Preprocessing
    pub use crate::autopipeline::{recommend_task, ProblemType, TaskRecommendation};
    pub use crate::preprocessing::{
        analyze_outliers, clean, detect_bounds, encode_categorical, EncodingMap, OutlierBounds, StandardScaler,
    };

    // Training
    pub use crate::training::{ModelKind, ModelMetrics, TaskType, Trainer, TrainingArtifact};

    // Pipeline
    pub use crate::export::{load_package, package, DownloadPackage, SavedModel};
    pub use crate::pipeline::{prepare_data, FeatureSelection, PipelineState, SessionStore, Stage};
}
