//! Exploratory analysis: per-column summaries and pairwise correlations

pub mod correlation;
pub mod summary;

pub use correlation::{correlate, CorrelationCell, CorrelationMethod, CorrelationReport, PairCorrelation};
pub use summary::{summarize, ColumnSummary, DataSummary, Summarizer};
