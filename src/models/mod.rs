//! Data models for promptcoach.
//!
//! Catalog entries, chips, analyzer payloads, and progress records.

mod analysis;
mod chip;
mod progress;
mod technique;

pub use analysis::{
    ANALYSIS_SCHEMA_VERSION, ActiveChipSnapshot, AnalysisRequest, AnalysisResponse, LlmVerdict,
    RewriteRequest, Suggestion,
};
pub use chip::{ActiveChip, ChipKey, ChipStatus};
pub use progress::{ProgressMap, ProgressRecord};
pub use technique::{Technique, TechniqueId};
