//! State module for tracking extraction and session progress
//!
//! # Components
//!
//! - `PipelineStage`: the stages one extraction moves through (init, navigate, expand, collect, done/failed)
//! - `StageTracker`: enforces legal stage transitions for a single extraction
//! - `SessionState`: per-worker bookkeeping that drives the session restart policy

mod session;
mod stage;

// Re-export main types
pub use session::{RestartReason, SessionState};
pub use stage::{PipelineStage, StageTracker};
