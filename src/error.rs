//! Error types for rowforge runs.
//!
//! Only setup problems are fatal to a run: an empty job list, invalid
//! configuration, or a final checkpoint that cannot be persisted. Per-job
//! failures are recorded as failed results and reported in the summary,
//! never propagated as process-level errors.

use thiserror::Error;

use crate::scheduler::checkpoint::CheckpointError;

/// Errors that abort a run before or after dispatch.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The job source produced no jobs to run.
    #[error("No jobs to process")]
    NoJobs,

    /// Worker count or another configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The final checkpoint flush failed; resumability would be broken.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}
