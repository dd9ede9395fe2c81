//! Column typing and extraction helpers
//!
//! Statistics and models work on plain vectors; these helpers are the one
//! place where polars columns are turned into `Vec<Option<f64>>` or
//! `Vec<Option<String>>`.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical kind of a column, as far as the pipeline stages care
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
    Other,
}

impl ColumnKind {
    /// Integers and floats; booleans are not numeric here
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Text => "text",
            ColumnKind::Other => "other",
        }
    }
}

/// Classify a polars dtype
pub fn column_kind(dtype: &DataType) -> ColumnKind {
    match dtype {
        dt if dt.is_integer() => ColumnKind::Integer,
        dt if dt.is_float() => ColumnKind::Float,
        DataType::Boolean => ColumnKind::Boolean,
        DataType::String | DataType::Categorical(_, _) => ColumnKind::Text,
        _ => ColumnKind::Other,
    }
}

/// Human-readable dtype label in the usual dataframe vocabulary
pub fn dtype_name(dtype: &DataType) -> String {
    match dtype {
        DataType::Int8 => "int8".to_string(),
        DataType::Int16 => "int16".to_string(),
        DataType::Int32 => "int32".to_string(),
        DataType::Int64 => "int64".to_string(),
        DataType::UInt8 => "uint8".to_string(),
        DataType::UInt16 => "uint16".to_string(),
        DataType::UInt32 => "uint32".to_string(),
        DataType::UInt64 => "uint64".to_string(),
        DataType::Float32 => "float32".to_string(),
        DataType::Float64 => "float64".to_string(),
        DataType::Boolean => "bool".to_string(),
        DataType::String => "object".to_string(),
        DataType::Categorical(_, _) => "category".to_string(),
        other => other.to_string(),
    }
}

/// Column names, skipping any that are blank after trimming
pub fn valid_column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| name.to_string())
        .collect()
}

/// Names of integer and float columns, in table order
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| !c.name().trim().is_empty() && column_kind(c.dtype()).is_numeric())
        .map(|c| c.name().to_string())
        .collect()
}

/// Look up a column, reporting a missing name as a validation failure
pub fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| PipelineError::ValidationError(format!("column '{}' not found", name)))
}

/// Column values as `f64`. Nulls and non-finite values come back as `None`.
pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = column(df, name)?.as_materialized_series();
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Column values rendered as text. Nulls stay `None`.
pub fn column_text(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = column(df, name)?.as_materialized_series();
    let casted = series.cast(&DataType::String)?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

/// Non-null values of a column in order of first appearance, without repeats
pub fn distinct_in_order(values: &[Option<String>]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .iter()
        .flatten()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}

/// Keep only the given columns, in the given order
pub fn select_columns(df: &DataFrame, names: &[String]) -> Result<DataFrame> {
    for name in names {
        column(df, name)?;
    }
    Ok(df.select(names.iter().map(|s| s.as_str()))?)
}

/// First `n` rows as JSON objects keyed by column name
pub fn preview_rows(df: &DataFrame, n: usize) -> Result<Vec<serde_json::Map<String, Value>>> {
    let head = df.head(Some(n));
    let names = valid_column_names(&head);
    let mut rows = vec![serde_json::Map::new(); head.height()];

    for name in &names {
        let values = column_json(&head, name)?;
        for (row, value) in rows.iter_mut().zip(values) {
            row.insert(name.clone(), value);
        }
    }
    Ok(rows)
}

fn column_json(df: &DataFrame, name: &str) -> Result<Vec<Value>> {
    let col = column(df, name)?;
    let series = col.as_materialized_series();
    let values = match column_kind(col.dtype()) {
        ColumnKind::Integer => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect(),
        ColumnKind::Float => column_f64(df, name)?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect(),
        ColumnKind::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect(),
        ColumnKind::Text | ColumnKind::Other => column_text(df, name)?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect(),
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df! {
            "age" => &[31i64, 45, 27],
            "income" => &[Some(52.5f64), None, Some(61.0)],
            "city" => &[Some("Lima"), Some("Quito"), None],
            "member" => &[true, false, true],
        }
        .unwrap()
    }

    #[test]
    fn test_column_kind() {
        let df = sample();
        assert_eq!(column_kind(df.column("age").unwrap().dtype()), ColumnKind::Integer);
        assert_eq!(column_kind(df.column("income").unwrap().dtype()), ColumnKind::Float);
        assert_eq!(column_kind(df.column("city").unwrap().dtype()), ColumnKind::Text);
        assert_eq!(column_kind(df.column("member").unwrap().dtype()), ColumnKind::Boolean);
        assert!(!ColumnKind::Boolean.is_numeric());
    }

    #[test]
    fn test_numeric_columns() {
        assert_eq!(numeric_columns(&sample()), vec!["age", "income"]);
    }

    #[test]
    fn test_column_f64_keeps_nulls() {
        let values = column_f64(&sample(), "income").unwrap();
        assert_eq!(values, vec![Some(52.5), None, Some(61.0)]);
    }

    #[test]
    fn test_missing_column_is_validation_error() {
        let result = column_f64(&sample(), "height");
        assert!(matches!(result, Err(PipelineError::ValidationError(_))));
    }

    #[test]
    fn test_distinct_in_order() {
        let values = vec![
            Some("b".to_string()),
            None,
            Some("a".to_string()),
            Some("b".to_string()),
        ];
        assert_eq!(distinct_in_order(&values), vec!["b", "a"]);
    }

    #[test]
    fn test_preview_rows() {
        let rows = preview_rows(&sample(), 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["age"], Value::from(31));
        assert_eq!(rows[1]["income"], Value::Null);
        assert_eq!(rows[0]["city"], Value::from("Lima"));
        assert_eq!(rows[1]["member"], Value::from(false));
    }
}
