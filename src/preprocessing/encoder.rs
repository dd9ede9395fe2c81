//! Label encoding of text columns

use crate::error::{PipelineError, Result};
use crate::utils::table::{self, column_kind, ColumnKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Codes of one encoded column. `classes[code]` is the original value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingMap {
    pub column: String,
    pub classes: Vec<String>,
}

impl EncodingMap {
    /// Build from values in encounter order
    pub fn from_values(column: &str, values: &[Option<String>]) -> Self {
        Self {
            column: column.to_string(),
            classes: table::distinct_in_order(values),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn code(&self, value: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == value)
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    /// `{value: code}` in code order
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), serde_json::Value::from(i)))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Label encoder: each distinct non-null text value becomes `0..n` in order
/// of first appearance. Nulls stay null; unseen values become null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    mappings: Vec<EncodingMap>,
    is_fitted: bool,
}

impl LabelEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on the text columns among `columns`; numeric and boolean ones are skipped
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        self.mappings.clear();
        for name in columns {
            let col = table::column(df, name)?;
            if column_kind(col.dtype()) != ColumnKind::Text {
                debug!(column = %name, dtype = %col.dtype(), "skipping non-text column");
                continue;
            }
            let values = table::column_text(df, name)?;
            self.mappings.push(EncodingMap::from_values(name, &values));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Replace every fitted column with its `Int64` codes
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }

        let mut result = df.clone();
        for mapping in &self.mappings {
            let index: HashMap<&str, i64> = mapping
                .classes
                .iter()
                .enumerate()
                .map(|(i, c)| (c.as_str(), i as i64))
                .collect();
            let codes: Vec<Option<i64>> = table::column_text(df, &mapping.column)?
                .iter()
                .map(|v| v.as_deref().and_then(|s| index.get(s).copied()))
                .collect();
            result.with_column(Series::new(mapping.column.as_str().into(), codes))?;
        }
        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    pub fn mappings(&self) -> &[EncodingMap] {
        &self.mappings
    }

    pub fn into_mappings(self) -> Vec<EncodingMap> {
        self.mappings
    }
}

/// Encode the text columns among `columns`, returning the new table and the maps
pub fn encode_categorical(df: &DataFrame, columns: &[String]) -> Result<(DataFrame, Vec<EncodingMap>)> {
    let mut encoder = LabelEncoder::new();
    let encoded = encoder.fit_transform(df, columns)?;
    Ok((encoded, encoder.into_mappings()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_encoding_in_encounter_order() {
        let df = df! {
            "city" => &[Some("Quito"), Some("Lima"), None, Some("Quito"), Some("Cusco")],
            "age" => &[30i64, 41, 25, 38, 52],
        }
        .unwrap();

        let (encoded, maps) =
            encode_categorical(&df, &["city".to_string(), "age".to_string()]).unwrap();

        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].classes, vec!["Quito", "Lima", "Cusco"]);
        assert_eq!(maps[0].code("Cusco"), Some(2));
        assert_eq!(maps[0].decode(1), Some("Lima"));

        let codes: Vec<Option<i64>> = encoded.column("city").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(codes, vec![Some(0), Some(1), None, Some(0), Some(2)]);
        assert_eq!(encoded.column("age").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_boolean_column_untouched() {
        let df = df! { "flag" => &[true, false, true] }.unwrap();
        let (encoded, maps) = encode_categorical(&df, &["flag".to_string()]).unwrap();
        assert!(maps.is_empty());
        assert_eq!(encoded.column("flag").unwrap().dtype(), &DataType::Boolean);
    }

    #[test]
    fn test_missing_column() {
        let df = df! { "a" => &["x"] }.unwrap();
        let result = encode_categorical(&df, &["b".to_string()]);
        assert!(matches!(result, Err(PipelineError::ValidationError(_))));
    }

    #[test]
    fn test_mapping_json_keeps_code_order() {
        let map = EncodingMap {
            column: "c".to_string(),
            classes: vec!["z".to_string(), "a".to_string()],
        };
        let json = map.to_json();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(json["a"], 1);
    }
}
