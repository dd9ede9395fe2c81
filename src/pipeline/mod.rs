//! Guided pipeline: selection, preparation, per-session state

pub mod prepare;
pub mod session;
pub mod state;

pub use prepare::{prepare_data, ClassTarget, FeatureSelection, PreparedData};
pub use session::{SessionId, SessionStore};
pub use state::{PipelineInfo, PipelineState, PreparedSplit, Stage};
