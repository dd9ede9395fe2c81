//! Statistical summary of a table
//!
//! Each column is summarized independently. A failing sub-computation
//! (normality test, histogram, bounds) leaves its field empty and records a
//! warning on that column; it never fails the whole summary.

use crate::config::SummaryConfig;
use crate::error::Result;
use crate::preprocessing::OutlierBounds;
use crate::stats::{self, normality::normality_test, Histogram, NormalityResult};
use crate::utils::round_to;
use crate::utils::table::{self, column_kind, dtype_name, ColumnKind};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Whole-table summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSummary {
    /// (rows, columns)
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub data_types: BTreeMap<String, String>,
    pub memory_usage_mb: f64,
    /// Share of null cells over the whole table, in percent
    pub missing_values_percent: f64,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub preview: Vec<serde_json::Map<String, serde_json::Value>>,
    pub column_summaries: Vec<ColumnSummary>,
}

/// Per-column summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: String,
    pub kind: ColumnKind,
    pub non_null_count: usize,
    pub missing_percent: f64,
    /// Distinct values, null counted as one value
    pub unique_values: usize,
    pub numeric: Option<NumericSummary>,
    pub categorical: Option<CategoricalSummary>,
    /// Sub-results that could not be computed
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericSummary {
    pub mean: Option<f64>,
    /// Sample standard deviation; `None` with fewer than two values
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(rename = "25%")]
    pub q25: Option<f64>,
    #[serde(rename = "50%")]
    pub q50: Option<f64>,
    #[serde(rename = "75%")]
    pub q75: Option<f64>,
    pub outliers_detection: Option<OutlierDetection>,
    pub normality_test: Option<NormalityResult>,
    pub histogram: Option<Histogram>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierDetection {
    pub method: String,
    pub k: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub outliers_count: usize,
    /// Share of all rows, in percent
    pub outliers_percentage: f64,
    pub has_outliers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalSummary {
    pub top_categories: TopCategories,
    /// Most frequent value
    pub top: Option<String>,
    /// Count of the most frequent value
    pub freq: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopCategories {
    pub top_n: usize,
    pub values: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
    /// Share of non-null values, in percent
    pub percentage: f64,
}

/// Table summarizer
#[derive(Debug, Clone, Default)]
pub struct Summarizer {
    config: SummaryConfig,
}

impl Summarizer {
    pub fn new(config: SummaryConfig) -> Self {
        Self { config }
    }

    /// Summarize every column with a non-blank name
    pub fn summarize(&self, df: &DataFrame) -> Result<DataSummary> {
        let names = table::valid_column_names(df);
        let rows = df.height();

        let column_summaries: Vec<ColumnSummary> = names
            .par_iter()
            .map(|name| self.summarize_column(df, name))
            .collect::<Result<Vec<_>>>()?;

        let mut data_types = BTreeMap::new();
        let mut numeric_columns = Vec::new();
        let mut categorical_columns = Vec::new();
        let mut null_cells = 0usize;
        for summary in &column_summaries {
            data_types.insert(summary.name.clone(), summary.dtype.clone());
            if summary.kind.is_numeric() {
                numeric_columns.push(summary.name.clone());
            } else {
                categorical_columns.push(summary.name.clone());
            }
            null_cells += rows - summary.non_null_count;
        }

        let cells = rows * names.len();
        let missing_values_percent = if cells == 0 {
            0.0
        } else {
            round_to(null_cells as f64 / cells as f64 * 100.0, 2)
        };

        info!(rows, columns = names.len(), "summary computed");

        Ok(DataSummary {
            shape: (rows, names.len()),
            columns: names,
            data_types,
            memory_usage_mb: round_to(df.estimated_size() as f64 / (1024.0 * 1024.0), 3),
            missing_values_percent,
            numeric_columns,
            categorical_columns,
            preview: table::preview_rows(df, self.config.preview_rows)?,
            column_summaries,
        })
    }

    fn summarize_column(&self, df: &DataFrame, name: &str) -> Result<ColumnSummary> {
        let col = table::column(df, name)?;
        let kind = column_kind(col.dtype());
        let rows = df.height();
        let mut warnings = Vec::new();

        let texts = table::column_text(df, name)?;
        let (non_null_count, numeric, categorical) = if kind.is_numeric() {
            let values: Vec<f64> = table::column_f64(df, name)?.into_iter().flatten().collect();
            let numeric = self.numeric_summary(&values, rows, name, &mut warnings);
            (values.len(), Some(numeric), None)
        } else {
            let non_null = texts.iter().filter(|v| v.is_some()).count();
            (non_null, None, Some(self.categorical_summary(&texts, non_null)))
        };

        let has_null = non_null_count < rows;
        let unique_values = table::distinct_in_order(&texts).len() + usize::from(has_null);

        Ok(ColumnSummary {
            name: name.to_string(),
            dtype: dtype_name(col.dtype()),
            kind,
            non_null_count,
            missing_percent: if rows == 0 {
                0.0
            } else {
                round_to((rows - non_null_count) as f64 / rows as f64 * 100.0, 2)
            },
            unique_values,
            numeric,
            categorical,
            warnings,
        })
    }

    fn numeric_summary(&self, values: &[f64], rows: usize, name: &str, warnings: &mut Vec<String>) -> NumericSummary {
        let sorted = stats::sorted(values);
        let q = |p: f64| stats::quantile_sorted(&sorted, p);

        let mut degrade = |field: &str, err: &dyn std::fmt::Display| {
            warn!(column = %name, field, error = %err, "summary field unavailable");
            warnings.push(format!("{}: {}", field, err));
        };

        let outliers_detection = match OutlierBounds::from_values(values, self.config.outlier_k) {
            Ok(bounds) => {
                let count = bounds.count(values);
                Some(OutlierDetection {
                    method: "IQR".to_string(),
                    k: self.config.outlier_k,
                    lower_bound: bounds.lower,
                    upper_bound: bounds.upper,
                    outliers_count: count,
                    outliers_percentage: round_to(count as f64 / rows.max(1) as f64 * 100.0, 2),
                    has_outliers: count > 0,
                })
            }
            Err(e) => {
                degrade("outliers_detection", &e);
                None
            }
        };

        let normality = if values.len() > 3 {
            normality_test(values, self.config.normality_alpha, self.config.shapiro_max_samples)
                .map_err(|e| degrade("normality_test", &e))
                .ok()
        } else {
            None
        };

        let histogram = stats::histogram(
            values,
            self.config.histogram_min_bins,
            self.config.histogram_max_bins,
        )
        .map_err(|e| degrade("histogram", &e))
        .ok();

        NumericSummary {
            mean: stats::mean(values),
            std: stats::sample_std(values),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            q25: q(0.25),
            q50: q(0.5),
            q75: q(0.75),
            outliers_detection,
            normality_test: normality,
            histogram,
        }
    }

    fn categorical_summary(&self, values: &[Option<String>], non_null: usize) -> CategoricalSummary {
        // value -> (count, first position)
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (pos, v) in values.iter().enumerate() {
            if let Some(v) = v {
                counts.entry(v.as_str()).or_insert((0, pos)).0 += 1;
            }
        }

        let mut ranked: Vec<(&str, usize, usize)> =
            counts.into_iter().map(|(v, (c, p))| (v, c, p)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        let top_n = self.config.top_n_categorical;
        let values: Vec<CategoryCount> = ranked
            .iter()
            .take(top_n)
            .map(|&(value, count, _)| CategoryCount {
                value: value.to_string(),
                count,
                percentage: round_to(count as f64 / non_null.max(1) as f64 * 100.0, 2),
            })
            .collect();

        CategoricalSummary {
            top: ranked.first().map(|r| r.0.to_string()),
            freq: ranked.first().map(|r| r.1),
            top_categories: TopCategories { top_n, values },
        }
    }
}

/// Summarize `df` with explicit preview and top-N sizes
pub fn summarize(df: &DataFrame, preview_rows: usize, top_n: usize) -> Result<DataSummary> {
    let config = SummaryConfig::default()
        .with_preview_rows(preview_rows)
        .with_top_n(top_n);
    Summarizer::new(config).summarize(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df! {
            "age" => &[Some(23i64), Some(35), Some(31), None, Some(52), Some(44)],
            "city" => &[Some("Lima"), Some("Quito"), Some("Lima"), Some("Cusco"), None, Some("Quito")],
            "flag" => &[true, false, true, true, false, true],
        }
        .unwrap()
    }

    #[test]
    fn test_shape_and_column_groups() {
        let summary = summarize(&sample(), 3, 10).unwrap();
        assert_eq!(summary.shape, (6, 3));
        assert_eq!(summary.column_summaries.len(), 3);
        assert_eq!(summary.numeric_columns, vec!["age"]);
        assert_eq!(summary.categorical_columns, vec!["city", "flag"]);
        assert_eq!(summary.preview.len(), 3);
        assert_eq!(summary.data_types["city"], "object");
        // 2 nulls over 18 cells
        assert_eq!(summary.missing_values_percent, 11.11);
    }

    #[test]
    fn test_numeric_column() {
        let summary = summarize(&sample(), 5, 10).unwrap();
        let age = &summary.column_summaries[0];
        assert_eq!(age.non_null_count, 5);
        assert_eq!(age.missing_percent, 16.67);
        assert_eq!(age.unique_values, 6);

        let numeric = age.numeric.as_ref().unwrap();
        assert_eq!(numeric.mean, Some(37.0));
        assert_eq!(numeric.min, Some(23.0));
        assert_eq!(numeric.q50, Some(35.0));
        assert!(numeric.normality_test.is_some());
        assert_eq!(numeric.histogram.as_ref().unwrap().bins, 5);
        assert!(!numeric.outliers_detection.as_ref().unwrap().has_outliers);
    }

    #[test]
    fn test_categorical_ties_follow_first_appearance() {
        let summary = summarize(&sample(), 5, 2).unwrap();
        let city = summary.column_summaries[1].categorical.as_ref().unwrap();
        assert_eq!(city.top_categories.values.len(), 2);
        assert_eq!(city.top_categories.values[0].value, "Lima");
        assert_eq!(city.top_categories.values[1].value, "Quito");
        assert_eq!(city.top_categories.values[0].percentage, 40.0);
        assert_eq!(city.freq, Some(2));
    }

    #[test]
    fn test_degenerate_column_degrades() {
        let df = df! { "c" => &[4.0, 4.0, 4.0, 4.0, 4.0] }.unwrap();
        let summary = summarize(&df, 5, 10).unwrap();
        let col = &summary.column_summaries[0];
        let numeric = col.numeric.as_ref().unwrap();
        assert!(numeric.normality_test.is_none());
        assert!(numeric.histogram.is_some());
        assert_eq!(numeric.std, Some(0.0));
        assert_eq!(col.warnings.len(), 1);
    }

    #[test]
    fn test_single_value_std_not_applicable() {
        let df = df! { "x" => &[7.5] }.unwrap();
        let summary = summarize(&df, 5, 10).unwrap();
        let numeric = summary.column_summaries[0].numeric.as_ref().unwrap();
        assert_eq!(numeric.std, None);
        assert!(numeric.normality_test.is_none());
        assert!(summary.column_summaries[0].warnings.is_empty());
    }
}
