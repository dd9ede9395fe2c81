//! Data preprocessing: outlier handling, categorical encoding and scaling

pub mod encoder;
pub mod outlier;
pub mod scaler;

pub use encoder::{encode_categorical, EncodingMap, LabelEncoder};
pub use outlier::{
    analyze_outliers, clean, detect_bounds, CleaningReport, ColumnOutlierReport, OutlierAnalysis,
    OutlierBounds, OutlierDetector,
};
pub use scaler::StandardScaler;
