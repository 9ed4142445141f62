//! Top-level orchestration of a batch run.
//!
//! `BatchRunner` drives the run state machine: load the checkpoint, drop
//! duplicate and already-completed jobs, balance the remainder into worker
//! groups, dispatch, and drain the result stream into the progress
//! aggregator and checkpoint store. A stop signal moves an in-progress run
//! to `Interrupted`, which drains and finalizes instead of aborting, so
//! already-produced results are never lost.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SetupError;

use super::balance::balance;
use super::checkpoint::{CheckpointStore, DEFAULT_FLUSH_EVERY};
use super::job::{Job, JobFn, ResourceProfile};
use super::progress::{ProgressAggregator, ProgressSink, DEFAULT_EMIT_EVERY, DEFAULT_EMIT_INTERVAL};
use super::worker_pool::{StopSignal, WorkerPool};

/// Cap on the default worker count for I/O-bound job functions.
const MAX_DEFAULT_IO_WORKERS: usize = 32;

/// Configuration for a batch run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of worker units; `None` derives a default from the job
    /// function's resource profile.
    pub worker_count: Option<usize>,
    /// Checkpoint file location; `None` disables persistence.
    pub checkpoint_path: Option<PathBuf>,
    /// Recorded results between periodic checkpoint flushes.
    pub flush_every: usize,
    /// Results between progress snapshot emissions.
    pub emit_every: usize,
    /// Wall-clock interval between progress snapshot emissions.
    pub emit_interval: Duration,
    /// Whether to skip jobs already present in the checkpoint.
    pub resume: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            checkpoint_path: None,
            flush_every: DEFAULT_FLUSH_EVERY,
            emit_every: DEFAULT_EMIT_EVERY,
            emit_interval: DEFAULT_EMIT_INTERVAL,
            resume: true,
        }
    }
}

/// Phase of the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Filtering,
    Balancing,
    Dispatching,
    Draining,
    Interrupted,
    Finalizing,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Init => "init",
            RunPhase::Filtering => "filtering",
            RunPhase::Balancing => "balancing",
            RunPhase::Dispatching => "dispatching",
            RunPhase::Draining => "draining",
            RunPhase::Interrupted => "interrupted",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Final accounting for one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Unique jobs supplied by the job source.
    pub total: usize,
    /// Jobs skipped because the checkpoint already held their ids.
    pub skipped: usize,
    /// Jobs handed to the worker pool.
    pub scheduled: usize,
    /// Jobs that completed successfully in this run.
    pub completed: u64,
    /// Jobs that failed in this run.
    pub failed: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Attempted jobs per second.
    pub throughput: f64,
    /// Whether the run was cut short by a stop signal.
    pub interrupted: bool,
}

/// Orchestrates checkpoint, balancer, worker pool and progress aggregation.
pub struct BatchRunner {
    config: RunConfig,
    stop: StopSignal,
}

impl BatchRunner {
    /// Creates a runner with the given configuration.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            stop: StopSignal::new(),
        }
    }

    /// Returns a handle that can interrupt the run from another task
    /// (e.g. a Ctrl-C handler). In-flight groups still drain.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs `jobs` through `job_fn`, reporting progress to `sink`.
    ///
    /// Only setup problems are errors: per-job failures are counted in the
    /// summary and their ids stay absent from the checkpoint, so re-running
    /// with the same checkpoint naturally retries them.
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        job_fn: Arc<dyn JobFn>,
        sink: Option<Box<dyn ProgressSink>>,
    ) -> Result<RunSummary, SetupError> {
        let mut phase = RunPhase::Init;
        debug!(%phase, "Run starting");

        if self.config.worker_count == Some(0) {
            return Err(SetupError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }

        let mut store = self.open_store();
        store.set_run_metadata(serde_json::json!({
            "run_id": Uuid::new_v4(),
            "started_at": Utc::now(),
        }));

        // Duplicate identifiers collapse to one job, first enumeration wins.
        let mut seen = HashSet::new();
        let mut jobs: Vec<Job> = jobs
            .into_iter()
            .filter(|j| seen.insert(j.id.clone()))
            .collect();
        let total = jobs.len();

        if total == 0 {
            return Err(SetupError::NoJobs);
        }

        phase = RunPhase::Filtering;
        debug!(%phase, total, "Filtering against checkpoint");
        jobs.retain(|j| !store.contains(&j.id));
        let scheduled = jobs.len();
        let skipped = total - scheduled;
        if skipped > 0 {
            info!(skipped, "Resuming, skipping already-completed jobs");
        }

        if scheduled == 0 {
            info!("All jobs already completed, nothing to do");
            store.flush()?;
            return Ok(RunSummary {
                total,
                skipped,
                scheduled: 0,
                completed: 0,
                failed: 0,
                elapsed: Duration::ZERO,
                throughput: 0.0,
                interrupted: false,
            });
        }

        let worker_count = self
            .config
            .worker_count
            .unwrap_or_else(|| default_worker_count(job_fn.profile()));

        phase = RunPhase::Balancing;
        debug!(%phase, scheduled, worker_count, "Partitioning jobs");
        let groups = balance(jobs, worker_count);

        phase = RunPhase::Dispatching;
        info!(
            %phase,
            scheduled,
            n_groups = groups.len(),
            worker_count,
            "Dispatching worker groups"
        );
        let pool = WorkerPool::new(worker_count);
        let mut stream = pool.dispatch(groups, job_fn, self.stop.clone());

        phase = RunPhase::Draining;
        debug!(%phase, "Consuming results");
        let mut aggregator = ProgressAggregator::new(scheduled, sink)
            .with_emit_every(self.config.emit_every)
            .with_emit_interval(self.config.emit_interval);

        while let Some(result) = stream.next().await {
            aggregator.observe(&result);
            if result.is_success() {
                store.record(result.job_id.as_str());
                if let Err(e) = store.maybe_flush() {
                    // The next flush retries with the same full state.
                    warn!(error = %e, "Periodic checkpoint flush failed");
                }
            }
        }

        let interrupted = self.stop.is_stopped();
        if interrupted {
            phase = RunPhase::Interrupted;
            info!(%phase, "Run interrupted, finalizing after drain");
        }

        phase = RunPhase::Finalizing;
        debug!(%phase, "Flushing final checkpoint");
        store.flush()?;

        let stats = aggregator.stats();
        let summary = RunSummary {
            total,
            skipped,
            scheduled,
            completed: stats.completed,
            failed: stats.failed,
            elapsed: stats.elapsed(),
            throughput: stats.rate(),
            interrupted,
        };

        phase = RunPhase::Done;
        info!(
            %phase,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Run finished"
        );

        Ok(summary)
    }

    fn open_store(&self) -> CheckpointStore {
        let store = match (&self.config.checkpoint_path, self.config.resume) {
            (Some(path), true) => CheckpointStore::load(path),
            (Some(path), false) => CheckpointStore::fresh(path),
            (None, _) => CheckpointStore::in_memory(),
        };
        store.with_flush_every(self.config.flush_every)
    }
}

/// Default pool size for a resource profile.
///
/// CPU-bound work gets one unit per hardware thread; I/O-bound work gets
/// the classic `min(32, parallelism + 4)` blocking-pool formula.
fn default_worker_count(profile: ResourceProfile) -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match profile {
        ResourceProfile::CpuBound => parallelism,
        ResourceProfile::IoBound => (parallelism + 4).min(MAX_DEFAULT_IO_WORKERS),
    }
}
