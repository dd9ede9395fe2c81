//! Command-line interface
//!
//! Each subcommand loads one CSV into a fresh [`PipelineState`], runs the
//! stages it needs and prints the result as JSON on stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::pipeline::PipelineState;
use crate::training::ModelKind;

#[derive(Parser, Debug)]
#[command(name = "datapilot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Guided analysis and model training for tabular data")]
#[command(long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Per-column statistics and a table preview
    Summary {
        /// Input CSV file
        csv: PathBuf,
    },

    /// Pairwise Pearson, Spearman and Kendall correlations
    Correlations {
        csv: PathBuf,

        /// Number of strongest pairs to print
        #[arg(long, default_value_t = 5)]
        top: usize,
    },

    /// IQR outlier report, optionally with KNN cleaning
    Outliers {
        csv: PathBuf,

        /// Columns to analyse (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// IQR multiplier
        #[arg(long)]
        k: Option<f64>,

        /// Null out outliers and impute them from nearest neighbours
        #[arg(long)]
        clean: bool,

        /// Neighbours used by the imputer
        #[arg(long)]
        neighbors: Option<usize>,
    },

    /// Suggest classification or regression for a label column
    Recommend {
        csv: PathBuf,

        #[arg(long)]
        label: String,
    },

    /// Train one model family and report held-out metrics
    Train {
        csv: PathBuf,

        /// Feature columns (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        features: Vec<String>,

        #[arg(long)]
        label: String,

        /// Model type token, e.g. random_forest_classification
        #[arg(long)]
        model: String,

        /// Write the trained model package here
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List the trainable model types
    Models,
}

/// Resolve the configuration, falling back to defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open(csv: &Path, config: &PipelineConfig) -> anyhow::Result<PipelineState> {
    let mut state = PipelineState::new(config.clone());
    state
        .load_path(csv)
        .with_context(|| format!("loading {}", csv.display()))?;
    Ok(state)
}

pub fn cmd_summary(csv: &Path, config: &PipelineConfig) -> anyhow::Result<()> {
    let mut state = open(csv, config)?;
    print_json(state.summarize()?)
}

pub fn cmd_correlations(csv: &Path, top: usize, config: &PipelineConfig) -> anyhow::Result<()> {
    let state = open(csv, config)?;
    let report = state.correlations()?;
    print_json(&json!({
        "variables": report.variables,
        "samples_used": report.samples_used,
        "total_correlations": report.total_correlations,
        "top_correlations": report.top(top),
        "matrices": report.matrices_json(),
    }))
}

pub fn cmd_outliers(
    csv: &Path,
    columns: &[String],
    k: Option<f64>,
    clean: bool,
    neighbors: Option<usize>,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    let mut state = open(csv, config)?;
    print_json(state.analyze_outliers(columns, k, clean, neighbors)?)
}

pub fn cmd_recommend(csv: &Path, label: &str, config: &PipelineConfig) -> anyhow::Result<()> {
    let mut state = open(csv, config)?;
    let features: Vec<String> = state
        .df
        .as_ref()
        .map(crate::utils::table::valid_column_names)
        .unwrap_or_default()
        .into_iter()
        .filter(|c| c != label)
        .collect();
    if features.is_empty() {
        anyhow::bail!("table has no columns besides '{}'", label);
    }
    state.select_features(&features, label)?;
    print_json(state.recommend_task()?)
}

pub fn cmd_train(
    csv: &Path,
    features: &[String],
    label: &str,
    model: &str,
    output: Option<&Path>,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    let kind: ModelKind = model.parse()?;
    let mut state = open(csv, config)?;
    state.select_features(features, label)?;
    let artifact = state.train(kind)?;
    let mut report = json!({
        "model_type": kind,
        "metrics": artifact.metrics,
        "training_info": artifact.training_info,
    });

    if let Some(output) = output {
        let name = output.file_name().and_then(|n| n.to_str());
        let package = state.download(name)?;
        let path = output.with_file_name(&package.filename);
        package
            .write_to(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        report["saved_to"] = json!(path.display().to_string());
        report["file_size_mb"] = json!(package.file_size_mb);
    }
    print_json(&report)
}

pub fn cmd_models() -> anyhow::Result<()> {
    let models: Vec<_> = ModelKind::ALL
        .iter()
        .map(|k| {
            json!({
                "model_type": k,
                "name": k.display_name(),
                "task": k.task(),
                "description": k.description(),
            })
        })
        .collect();
    print_json(&models)
}

/// Dispatch a parsed command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Summary { csv } => cmd_summary(&csv, &config),
        Commands::Correlations { csv, top } => cmd_correlations(&csv, top, &config),
        Commands::Outliers {
            csv,
            columns,
            k,
            clean,
            neighbors,
        } => cmd_outliers(&csv, &columns, k, clean, neighbors, &config),
        Commands::Recommend { csv, label } => cmd_recommend(&csv, &label, &config),
        Commands::Train {
            csv,
            features,
            label,
            model,
            output,
        } => cmd_train(&csv, &features, &label, &model, output.as_deref(), &config),
        Commands::Models => cmd_models(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_train() {
        let cli = Cli::try_parse_from([
            "datapilot",
            "train",
            "data.csv",
            "--features",
            "age,income",
            "--label",
            "bought",
            "--model",
            "naive_bayes",
        ])
        .unwrap();
        match cli.command {
            Commands::Train { features, model, .. } => {
                assert_eq!(features, vec!["age".to_string(), "income".to_string()]);
                assert_eq!(model, "naive_bayes");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_train_writes_package() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("data.csv");
        let mut text = String::from("x,y\n");
        for i in 0..20 {
            text.push_str(&format!("{},{}\n", i, 3 * i + 1));
        }
        std::fs::write(&csv, text).unwrap();

        let output = dir.path().join("model");
        cmd_train(
            &csv,
            &["x".to_string()],
            "y",
            "linear_regression",
            Some(&output),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert!(dir.path().join("model.joblib").exists());
    }
}
