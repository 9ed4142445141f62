//! Job definitions for the batch engine.
//!
//! This module defines the core types flowing through the engine:
//!
//! - `Job`: a unit of work, identified by an opaque id with a size proxy
//! - `JobResult`: outcome of executing a job
//! - `JobStatus`: terminal status of an attempted job
//! - `WorkerGroup`: an ordered batch of jobs bound to one worker slot
//! - `JobFn`: the opaque, idempotent job function supplied by the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work to be executed.
///
/// Jobs are immutable once enumerated. Identity is the id string (for file
/// jobs, the file path); ids must be unique within a run and duplicates
/// collapse to one job. The weight is a non-negative size proxy (typically
/// the file's byte size) used only for load balancing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier, unique within a run.
    pub id: String,
    /// Size proxy for load balancing. `None` means the producer supplied
    /// no weight at all; `Some(0)` means the weight could not be read.
    #[serde(default)]
    pub weight: Option<u64>,
}

impl Job {
    /// Creates a weightless job.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            weight: None,
        }
    }

    /// Sets the weight used for load balancing.
    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Returns the weight used by the balancer, treating unknown as zero.
    pub fn effective_weight(&self) -> u64 {
        self.weight.unwrap_or(0)
    }
}

/// Terminal status of an attempted job.
///
/// Jobs that were never started (e.g. skipped after a stop signal) produce
/// no result at all, so there is no cancelled variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job completed successfully; its side effect is durably applied.
    Completed,
    /// Job function returned an error or panicked.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a job execution.
///
/// Exactly one result exists per attempted job per run. A successful result
/// implies the job function's mutation was durably applied; atomicity of
/// the mutation itself is the job function's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Id of the job that was executed.
    pub job_id: String,
    /// Final status of the job.
    pub status: JobStatus,
    /// Error message if the job failed.
    pub error: Option<String>,
    /// When the job finished.
    pub completed_at: DateTime<Utc>,
    /// Id of the worker unit that processed this job.
    pub worker_id: String,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
    /// Optional job-function-specific metrics.
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
}

impl JobResult {
    /// Creates a successful job result.
    pub fn success(
        job_id: impl Into<String>,
        worker_id: impl Into<String>,
        duration_ms: u64,
        metrics: Option<serde_json::Value>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            error: None,
            completed_at: Utc::now(),
            worker_id: worker_id.into(),
            duration_ms,
            metrics,
        }
    }

    /// Creates a failed job result.
    pub fn failure(
        job_id: impl Into<String>,
        worker_id: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            error: Some(error.into()),
            completed_at: Utc::now(),
            worker_id: worker_id.into(),
            duration_ms,
            metrics: None,
        }
    }

    /// Returns whether the job completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// An ordered batch of jobs assigned to one worker slot.
///
/// Groups are ephemeral: they exist only between balancing and dispatch.
/// Jobs within a group execute strictly sequentially in stored order.
#[derive(Debug, Clone, Default)]
pub struct WorkerGroup {
    jobs: Vec<Job>,
    total_weight: u64,
}

impl WorkerGroup {
    /// Creates a group from a batch of jobs.
    pub fn new(jobs: Vec<Job>) -> Self {
        let total_weight = jobs.iter().map(Job::effective_weight).sum();
        Self { jobs, total_weight }
    }

    /// Appends a job, updating the accumulated weight.
    pub fn push(&mut self, job: Job) {
        self.total_weight += job.effective_weight();
        self.jobs.push(job);
    }

    /// Jobs in execution order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Consumes the group, yielding its jobs.
    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
    }

    /// Total weight of all jobs in this group.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Number of jobs in this group.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns whether the group holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Resource profile declared by a job function.
///
/// Only influences the default worker count derived by the run controller;
/// the dispatcher itself is profile-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceProfile {
    /// Dominated by blocking I/O; defaults to `min(32, parallelism + 4)`
    /// workers.
    IoBound,
    /// Dominated by computation; defaults to available parallelism.
    CpuBound,
}

/// The opaque job function executed by worker units.
///
/// Implementations must be idempotent: a job may be re-executed if a prior
/// attempt succeeded but crashed before its id reached the checkpoint
/// (at-least-once semantics). The usual technique is an atomic
/// write-to-temp-then-rename of the mutated file.
pub trait JobFn: Send + Sync + 'static {
    /// Declares whether the work is I/O- or CPU-dominated.
    fn profile(&self) -> ResourceProfile {
        ResourceProfile::IoBound
    }

    /// Executes one job. `Ok` carries optional metrics; `Err` carries a
    /// human-readable failure message.
    fn run(&self, job: &Job) -> Result<Option<serde_json::Value>, String>;
}
