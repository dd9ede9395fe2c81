//! Integration tests for CSV ingestion

use datapilot::config::LoaderConfig;
use datapilot::error::PipelineError;
use datapilot::utils::{load_csv_bytes, load_csv_path, DataLoader};
use polars::prelude::*;
use std::io::Write;

#[test]
fn test_semicolon_file_with_bom() {
    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(b"name;score;passed\nAna;7.5;true\nLuis;4.0;false\nEva;9.1;true\n");
    let loaded = load_csv_bytes(&bytes, &LoaderConfig::default()).unwrap();

    assert_eq!(loaded.separator, ';');
    assert_eq!(loaded.encoding, "utf-8");
    assert_eq!(loaded.df.shape(), (3, 3));
    assert_eq!(loaded.df.get_column_names()[0].as_str(), "name");
    assert_eq!(loaded.df.column("score").unwrap().dtype(), &DataType::Float64);
}

#[test]
fn test_tab_separated() {
    let text = "a\tb\tc\n1\t2\t3\n4\t5\t6\n";
    let loaded = DataLoader::default().load_bytes(text.as_bytes()).unwrap();
    assert_eq!(loaded.separator, '\t');
    assert_eq!(loaded.df.width(), 3);
}

#[test]
fn test_windows_1252_text() {
    // "café" with 0xE9 for é
    let bytes = b"drink,price\ncaf\xe9,2.5\nt\xe9,1.8\n";
    let loaded = load_csv_bytes(bytes, &LoaderConfig::default()).unwrap();
    assert_eq!(loaded.encoding, "windows-1252");
    let drinks = loaded.df.column("drink").unwrap().str().unwrap().get(0).map(str::to_string);
    assert_eq!(drinks.as_deref(), Some("café"));
}

#[test]
fn test_null_tokens_become_nulls() {
    let text = "x,y\n1,NA\n2,\n3,7\n";
    let loaded = load_csv_bytes(text.as_bytes(), &LoaderConfig::default()).unwrap();
    assert_eq!(loaded.df.column("y").unwrap().null_count(), 2);
}

#[test]
fn test_empty_input_rejected() {
    for input in [&b""[..], b"   \n\n"] {
        let err = load_csv_bytes(input, &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::LoadError(_)));
        assert_eq!(err.kind(), "load_error");
    }
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "city,population").unwrap();
    writeln!(file, "Quito,2800000").unwrap();
    writeln!(file, "Cuenca,600000").unwrap();
    file.flush().unwrap();

    let loaded = load_csv_path(file.path(), &LoaderConfig::default()).unwrap();
    assert_eq!(loaded.df.height(), 2);
}

#[test]
fn test_missing_file_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = DataLoader::default().load_path(dir.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, PipelineError::LoadError(_)));
}
