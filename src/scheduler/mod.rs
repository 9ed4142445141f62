//! Parallel batch engine: load balancing, worker pool, checkpoint, progress.
//!
//! This module provides the infrastructure for distributing independent
//! file jobs across a bounded worker pool:
//!
//! - **Job / JobResult**: data model for a unit of work and its outcome
//! - **balance**: greedy weighted bin-packing of jobs into worker groups
//! - **WorkerPool**: blocking worker units pulling groups from a shared queue
//! - **CheckpointStore**: durable completed-id set with atomic flushes
//! - **ProgressAggregator**: running counters pushed to a progress sink
//! - **BatchRunner**: top-level orchestration and run summary
//!
//! # Architecture
//!
//! ```text
//!   job source ──▶ BatchRunner ──filter──▶ balance() ──▶ groups
//!                      │                                   │
//!                      │                             ┌─────┴─────┐
//!                      │                             ▼           ▼
//!                      │                        ┌─────────┐ ┌─────────┐
//!                      │◀── JobResult stream ── │ worker 0│ │ worker N│
//!                      │                        └─────────┘ └─────────┘
//!                      ▼
//!        ProgressAggregator + CheckpointStore
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use rowforge::scheduler::{BatchRunner, Job, RunConfig};
//! use std::sync::Arc;
//!
//! let jobs = vec![Job::new("data/a.csv").with_weight(1024)];
//! let runner = BatchRunner::new(RunConfig::default());
//! let summary = runner.run(jobs, Arc::new(my_job_fn), None).await?;
//! println!("{} completed, {} failed", summary.completed, summary.failed);
//! ```
//!
//! # Reliability features
//!
//! - **Atomic checkpoint**: state is written to a temp file then renamed,
//!   so a crash mid-flush never corrupts the previous valid checkpoint
//! - **Resume**: completed job ids are filtered out at run start
//! - **Failure isolation**: a job error or panic becomes a failed result
//!   without affecting sibling jobs or other groups
//! - **Graceful drain**: a stop signal halts new group submission while
//!   in-flight groups finish and are still checkpointed

pub mod balance;
pub mod checkpoint;
pub mod controller;
pub mod job;
pub mod progress;
pub mod worker_pool;

// Re-export main types for convenience
pub use balance::balance;
pub use checkpoint::{CheckpointError, CheckpointState, CheckpointStore};
pub use controller::{BatchRunner, RunConfig, RunPhase, RunSummary};
pub use job::{Job, JobFn, JobResult, JobStatus, ResourceProfile, WorkerGroup};
pub use progress::{LogSink, ProgressAggregator, ProgressSink, ProgressSnapshot, RunStats};
pub use worker_pool::{ResultStream, StopSignal, WorkerPool};
