//! rowforge: checkpointed parallel batch engine for bulk file mutations.
//!
//! This library distributes an arbitrarily large list of independent file
//! jobs across a bounded pool of workers, aggregates progress and failures
//! back to a single consume loop, and persists a checkpoint so interrupted
//! runs resume without reprocessing completed files.

// Core modules
pub mod cli;
pub mod discover;
pub mod error;
pub mod exec;
pub mod scheduler;

// Re-export commonly used types
pub use error::SetupError;
pub use scheduler::{
    BatchRunner, CheckpointStore, Job, JobFn, JobResult, JobStatus, ResourceProfile, RunConfig,
    RunSummary, StopSignal, WorkerGroup,
};
