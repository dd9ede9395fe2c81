//! Automatic task selection

pub mod recommender;

pub use recommender::{recommend_task, ModelOption, ProblemType, TaskRecommendation};
