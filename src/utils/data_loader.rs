//! Tabular loader: raw bytes in, typed polars table out
//!
//! Loading happens in three steps. The leading bytes decide the text
//! encoding, the first data lines decide the separator, and polars parses
//! the decoded text. A parse failure with the sniffed separator falls back
//! to the other candidates and finally to an all-text read.

use crate::config::LoaderConfig;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A parsed table together with what the loader detected about its source
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub df: DataFrame,
    /// Detected text encoding (`"utf-8"` or `"windows-1252"`)
    pub encoding: String,
    /// Separator the table was finally parsed with
    pub separator: char,
}

/// CSV loader with encoding and separator detection
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    config: LoaderConfig,
}

impl DataLoader {
    /// Create a new data loader
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load a CSV file from disk
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<LoadedTable> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::LoadError(format!("cannot read {}: {}", path.display(), e)))?;
        self.load_bytes(&bytes)
    }

    /// Load CSV content held in memory
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<LoadedTable> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PipelineError::LoadError("input is empty".to_string()));
        }

        let (text, encoding) = decode_text(bytes, self.config.encoding_probe_bytes)?;
        let text = strip_comment_lines(&text, self.config.comment_prefix);
        if text.trim().is_empty() {
            return Err(PipelineError::LoadError(
                "input contains no data lines".to_string(),
            ));
        }

        let sniffed = sniff_separator(
            &text,
            &self.config.candidate_separators,
            self.config.sniff_lines,
        );
        debug!(separator = ?sniffed, encoding, "sniffed csv dialect");

        let (df, separator) = self.read_with_fallback(&text, sniffed)?;
        let df = drop_blank_named_columns(df)?;

        if df.width() == 0 {
            return Err(PipelineError::LoadError(
                "no usable columns found in input".to_string(),
            ));
        }

        info!(
            rows = df.height(),
            columns = df.width(),
            separator = ?separator,
            encoding,
            "table loaded"
        );

        Ok(LoadedTable {
            df,
            encoding: encoding.to_string(),
            separator,
        })
    }

    fn read_with_fallback(&self, text: &str, sniffed: char) -> Result<(DataFrame, char)> {
        let mut last_error = match self.read_csv(text, sniffed, Some(self.config.infer_schema_length)) {
            Ok(df) => return Ok((df, sniffed)),
            Err(e) => e,
        };
        warn!(separator = ?sniffed, error = %last_error, "sniffed separator failed, trying alternatives");

        for &sep in self.config.candidate_separators.iter().filter(|&&c| c != sniffed) {
            match self.read_csv(text, sep, Some(self.config.infer_schema_length)) {
                Ok(df) => return Ok((df, sep)),
                Err(e) => last_error = e,
            }
        }

        // Schema inference disabled: every column is read as text
        self.read_csv(text, sniffed, Some(0))
            .map(|df| (df, sniffed))
            .map_err(|_| {
                PipelineError::LoadError(format!("could not parse input as CSV: {}", last_error))
            })
    }

    fn read_csv(&self, text: &str, separator: char, infer_schema_length: Option<usize>) -> Result<DataFrame> {
        let null_values: Vec<PlSmallStr> = self
            .config
            .null_values
            .iter()
            .map(|s| PlSmallStr::from(s.as_str()))
            .collect();

        let parse_opts = CsvParseOptions::default()
            .with_separator(separator as u8)
            .with_truncate_ragged_lines(true)
            .with_null_values(Some(NullValues::AllColumns(null_values)));

        let cursor = Cursor::new(text.as_bytes().to_vec());

        CsvReadOptions::default()
            .with_has_header(true)
            .with_ignore_errors(true)
            .with_infer_schema_length(infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(cursor)
            .finish()
            .map_err(|e| PipelineError::LoadError(e.to_string()))
    }
}

/// Load CSV bytes with the given loader settings
pub fn load_csv_bytes(bytes: &[u8], config: &LoaderConfig) -> Result<LoadedTable> {
    DataLoader::new(config.clone()).load_bytes(bytes)
}

/// Load a CSV file with the given loader settings
pub fn load_csv_path(path: impl AsRef<Path>, config: &LoaderConfig) -> Result<LoadedTable> {
    DataLoader::new(config.clone()).load_path(path)
}

/// Decide the encoding from the leading bytes and decode the whole input.
///
/// Valid UTF-8 (with or without BOM) is taken as is. UTF-16 input is
/// rejected. Anything else is decoded as Windows-1252, which accepts every
/// byte sequence.
pub fn decode_text(bytes: &[u8], probe_bytes: usize) -> Result<(String, &'static str)> {
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return Err(PipelineError::LoadError(
            "UTF-16 encoded input is not supported".to_string(),
        ));
    }

    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let probe = &body[..body.len().min(probe_bytes.max(1))];

    if probe_is_utf8(probe) {
        if let Ok(text) = std::str::from_utf8(body) {
            return Ok((text.to_string(), "utf-8"));
        }
    }

    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(body);
    Ok((text.into_owned(), "windows-1252"))
}

/// A probe cut in the middle of a multi-byte sequence still counts as UTF-8
fn probe_is_utf8(probe: &[u8]) -> bool {
    match std::str::from_utf8(probe) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

fn strip_comment_lines(text: &str, comment_prefix: char) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.trim_start().starts_with(comment_prefix) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Pick the separator whose per-line count is highest and most consistent.
///
/// For each candidate, the mean and population standard deviation of its
/// occurrence count over the first `n_lines` non-empty lines are computed.
/// Candidates averaging less than one occurrence are skipped; the rest are
/// scored `mean / (1 + std)`. Falls back to `','`.
pub fn sniff_separator(text: &str, candidates: &[char], n_lines: usize) -> char {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(n_lines.max(1))
        .collect();

    if lines.is_empty() {
        return ',';
    }

    let mut best = (',', f64::NEG_INFINITY);
    for &sep in candidates {
        let counts: Vec<f64> = lines
            .iter()
            .map(|line| line.matches(sep).count() as f64)
            .collect();
        let n = counts.len() as f64;
        let mean = counts.iter().sum::<f64>() / n;
        if mean < 1.0 {
            continue;
        }
        let var = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        let score = mean / (1.0 + var.sqrt());
        if score > best.1 {
            best = (sep, score);
        }
    }
    best.0
}

/// Remove columns whose names are empty or whitespace-only
pub fn drop_blank_named_columns(df: DataFrame) -> Result<DataFrame> {
    let keep: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| name.to_string())
        .collect();

    if keep.len() == df.width() {
        return Ok(df);
    }

    warn!(dropped = df.width() - keep.len(), "dropping columns with blank names");
    Ok(df.select(keep)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn loader() -> DataLoader {
        DataLoader::new(LoaderConfig::default())
    }

    #[test]
    fn test_load_comma_separated() {
        let table = loader().load_bytes(b"a,b,c\n1,2,x\n4,5,y\n7,8,z\n").unwrap();
        assert_eq!(table.df.height(), 3);
        assert_eq!(table.df.width(), 3);
        assert_eq!(table.separator, ',');
        assert_eq!(table.encoding, "utf-8");
        assert!(table.df.column("a").unwrap().dtype().is_integer());
    }

    #[test]
    fn test_sniff_semicolon_with_decimal_commas() {
        let text = "name;score;city\nann;1,5;Lima\nbob;2,5;Quito\ncid;3,0;Cusco\n";
        assert_eq!(sniff_separator(text, &[',', ';', '\t', '|', ' '], 10), ';');
    }

    #[test]
    fn test_sniff_defaults_to_comma() {
        assert_eq!(sniff_separator("single\n1\n2\n", &[',', ';'], 10), ',');
    }

    #[test]
    fn test_comment_lines_and_null_tokens() {
        let csv = b"# exported data\nx,y\n1,NA\n2,3\n# trailing note\n3,NULL\n";
        let table = loader().load_bytes(csv).unwrap();
        assert_eq!(table.df.height(), 3);
        assert_eq!(table.df.column("y").unwrap().null_count(), 2);
    }

    #[test]
    fn test_blank_column_names_dropped() {
        let table = loader().load_bytes(b"a, ,b\n1,2,3\n4,5,6\n").unwrap();
        let names: Vec<String> = table
            .df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_latin1_fallback() {
        let mut bytes = b"city,temp\n".to_vec();
        bytes.extend_from_slice(&[b'M', 0xE1, b'l', b'a', b'g', b'a', b',', b'2', b'1', b'\n']);
        let table = loader().load_bytes(&bytes).unwrap();
        assert_eq!(table.encoding, "windows-1252");
        let city = table.df.column("city").unwrap();
        let value = city.as_materialized_series().str().unwrap().get(0).unwrap().to_string();
        assert_eq!(value, "Málaga");
    }

    #[test]
    fn test_empty_input_is_load_error() {
        assert!(matches!(loader().load_bytes(b"   \n"), Err(PipelineError::LoadError(_))));
        assert!(matches!(loader().load_bytes(b"# only a comment\n"), Err(PipelineError::LoadError(_))));
    }

    #[test]
    fn test_utf16_rejected() {
        let result = loader().load_bytes(&[0xFF, 0xFE, b'a', 0]);
        assert!(matches!(result, Err(PipelineError::LoadError(_))));
    }

    #[test]
    fn test_load_path() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "a|b").unwrap();
        writeln!(file, "1|2").unwrap();
        writeln!(file, "3|4").unwrap();
        let table = loader().load_path(file.path()).unwrap();
        assert_eq!(table.separator, '|');
        assert_eq!(table.df.shape(), (2, 2));
    }
}
