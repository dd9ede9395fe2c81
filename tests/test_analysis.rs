//! Integration tests for the summarizer and the correlation engine

use datapilot::analysis::{correlate, summarize, CorrelationMethod, Summarizer};
use datapilot::config::SummaryConfig;
use datapilot::error::PipelineError;
use polars::prelude::*;
use proptest::prelude::*;

fn people() -> DataFrame {
    let n = 100;
    let age: Vec<i64> = (0..n).map(|i| 20 + (i * 37 % 45) as i64).collect();
    let income: Vec<f64> = age.iter().map(|a| *a as f64 * 1200.0 + ((*a * 13) % 7) as f64 * 150.0).collect();
    let city: Vec<&str> = (0..n)
        .map(|i| match i % 3 {
            0 => "Quito",
            1 => "Lima",
            _ => "Cusco",
        })
        .collect();
    df! { "age" => age, "income" => income, "city" => city }.unwrap()
}

#[test]
fn test_summary_sections() {
    let summary = Summarizer::new(SummaryConfig::default()).summarize(&people()).unwrap();
    assert_eq!(summary.shape, (100, 3));
    assert_eq!(summary.numeric_columns, vec!["age", "income"]);
    assert_eq!(summary.categorical_columns, vec!["city"]);
    assert_eq!(summary.preview.len(), 5);
    assert_eq!(summary.missing_values_percent, 0.0);

    let income = summary.column_summaries.iter().find(|c| c.name == "income").unwrap();
    let numeric = income.numeric.as_ref().unwrap();
    assert!(numeric.q25 <= numeric.q50 && numeric.q50 <= numeric.q75);
    assert_eq!(numeric.normality_test.as_ref().unwrap().test_name, "Shapiro-Wilk");
    let hist = numeric.histogram.as_ref().unwrap();
    assert_eq!(hist.frequencies.iter().sum::<usize>(), 100);
    assert!((5..=50).contains(&hist.bins));

    let city = summary.column_summaries.iter().find(|c| c.name == "city").unwrap();
    let top = &city.categorical.as_ref().unwrap().top_categories;
    assert_eq!(top.values[0].value, "Quito");
    assert_eq!(top.values[0].count, 34);
}

#[test]
fn test_summary_preview_and_top_n_arguments() {
    let summary = summarize(&people(), 2, 1).unwrap();
    assert_eq!(summary.preview.len(), 2);
    let city = summary.column_summaries.iter().find(|c| c.name == "city").unwrap();
    assert_eq!(city.categorical.as_ref().unwrap().top_categories.values.len(), 1);
}

#[test]
fn test_correlation_report_on_related_columns() {
    let report = correlate(&people()).unwrap();
    assert_eq!(report.variables, vec!["age", "income"]);
    assert_eq!(report.total_correlations, 1);
    let pair = &report.correlations[0];
    assert!(pair.pearson.correlation.unwrap() > 0.99);
    assert!(pair.spearman.correlation.unwrap() > 0.99);
    assert!(pair.pearson.p_value.unwrap() < 1e-10);
    assert_eq!(report.top(5).len(), 1);
}

#[test]
fn test_correlation_needs_two_numeric_columns() {
    let df = df! { "a" => &[1.0, 2.0, 3.0], "b" => &["x", "y", "z"] }.unwrap();
    assert!(matches!(correlate(&df), Err(PipelineError::ValidationError(_))));
}

#[test]
fn test_correlation_drops_incomplete_rows_jointly() {
    let df = df! {
        "a" => &[Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)],
        "b" => &[Some(2.0), Some(4.1), Some(6.0), Some(7.9), Some(10.0)],
        "c" => &[Some(5.0), None, Some(3.0), Some(2.0), Some(1.0)],
    }
    .unwrap();
    let report = correlate(&df).unwrap();
    assert_eq!(report.samples_used, 3);
}

fn numeric_table() -> impl Strategy<Value = DataFrame> {
    (2usize..5, 3usize..30).prop_flat_map(|(cols, rows)| {
        prop::collection::vec(prop::collection::vec(-1000.0f64..1000.0, rows), cols).prop_map(|columns| {
            let columns: Vec<Column> = columns
                .into_iter()
                .enumerate()
                .map(|(i, values)| Column::new(format!("c{}", i).into(), values))
                .collect();
            DataFrame::new(columns).unwrap()
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_summary_shape_matches_table(df in numeric_table()) {
        let summary = summarize(&df, 5, 10).unwrap();
        prop_assert_eq!(summary.shape.0, df.height());
        prop_assert_eq!(summary.column_summaries.len(), df.width());
    }

    #[test]
    fn prop_correlation_matrices_symmetric(df in numeric_table()) {
        let report = correlate(&df).unwrap();
        for method in CorrelationMethod::ALL {
            let matrix = report.matrix(method).unwrap();
            for i in 0..report.n_variables {
                prop_assert_eq!(matrix.cells[i][i].correlation, Some(1.0));
                prop_assert_eq!(matrix.cells[i][i].p_value, Some(0.0));
                for j in 0..report.n_variables {
                    prop_assert_eq!(matrix.cells[i][j], matrix.cells[j][i]);
                }
            }
        }
    }

    #[test]
    fn prop_correlations_sorted_descending(df in numeric_table()) {
        let report = correlate(&df).unwrap();
        for pair in report.correlations.windows(2) {
            prop_assert!(pair[0].average_abs_correlation >= pair[1].average_abs_correlation);
        }
    }
}
