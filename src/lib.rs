//! regflock - Cohort-coordinated image registration
//!
//! regflock runs ANTs image registration as a fixed-size cohort of worker
//! processes that coordinate through lock-guarded files in a shared
//! directory, so a multi-process registration toolkit can be driven without
//! a scheduler or any network plumbing.
//!
//! # Architecture
//!
//! - **File-based coordination**: counter, state, and dispatch records under
//!   `flock(2)`, with bounded polling waits
//! - **Leader/follower cohort**: the directory's creator leads; everyone
//!   else follows its IDLE/START/EXIT broadcasts
//! - **Two-stage registration**: a leader-local linear stage, then a fused
//!   cohort-wide full stage per moving image
//! - **Mixed inputs**: NIfTI volumes used in place, DICOM slice directories
//!   converted into the shared scratch
//! - **Review outputs**: tiled JPEG mosaics of the fixed and every warped
//!   volume, with surplus toolkit artifacts cleaned away

pub mod config;
pub mod coord;
pub mod exec;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use coord::{CohortSession, Signal};
pub use output::RunSummary;

/// Result type used throughout regflock
pub type Result<T> = anyhow::Result<T>;
