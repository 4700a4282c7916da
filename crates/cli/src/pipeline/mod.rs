//! Pipeline orchestration module.

mod input;
mod orchestrator;
mod stats;

pub use input::EventReader;
pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;
