//! Utility functions and types

pub mod data_loader;
pub mod table;

pub use data_loader::{load_csv_bytes, load_csv_path, DataLoader, LoadedTable};
pub use table::{column_kind, ColumnKind};

/// Round to `dp` decimal places
pub fn round_to(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}
