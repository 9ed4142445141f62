//! Worker pool dispatching balanced groups onto blocking threads.
//!
//! The pool spawns at most `min(worker_count, groups)` long-lived worker
//! units on the blocking thread pool. Units pull whole groups from a
//! shared FIFO queue and execute each group's jobs strictly sequentially,
//! which amortizes scheduling overhead when jobs are short and plentiful.
//! Every job result is pushed to the consumer as soon as it is produced;
//! no ordering is guaranteed across groups.
//!
//! A job function error or panic is converted into a failed `JobResult`
//! and never aborts sibling jobs or other groups. A stop signal halts the
//! pulling of new groups while the in-flight group runs to completion, so
//! no file is left half-mutated by the engine itself.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::job::{Job, JobFn, JobResult, WorkerGroup};

/// Cloneable run-level stop flag.
///
/// Raising the signal stops workers from pulling new groups; jobs already
/// executing (and the rest of their group) still finish and their results
/// are still delivered and checkpointed.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates an unraised signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether the signal has been raised.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stream of job results produced by the pool.
///
/// Ends once every worker unit has exited and all buffered results have
/// been consumed.
pub struct ResultStream {
    rx: mpsc::UnboundedReceiver<JobResult>,
}

impl ResultStream {
    /// Waits for the next completed result, or `None` when the pool is
    /// drained.
    pub async fn next(&mut self) -> Option<JobResult> {
        self.rx.recv().await
    }
}

/// Fixed-size pool of blocking worker units.
pub struct WorkerPool {
    worker_count: usize,
}

impl WorkerPool {
    /// Creates a pool with the given maximum number of worker units.
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
        }
    }

    /// Maximum number of worker units this pool will spawn.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Submits `groups` for execution by `job_fn` and returns the result
    /// stream. Never spawns more units than non-empty groups.
    pub fn dispatch(
        &self,
        groups: Vec<WorkerGroup>,
        job_fn: Arc<dyn JobFn>,
        stop: StopSignal,
    ) -> ResultStream {
        let groups: VecDeque<WorkerGroup> = groups.into_iter().filter(|g| !g.is_empty()).collect();
        let units = self.worker_count.min(groups.len());
        let queue = Arc::new(Mutex::new(groups));
        let (tx, rx) = mpsc::unbounded_channel();

        info!(units, "Starting worker pool");

        for i in 0..units {
            let worker_id = format!("worker-{i}");
            let queue = Arc::clone(&queue);
            let job_fn = Arc::clone(&job_fn);
            let stop = stop.clone();
            let tx = tx.clone();

            tokio::task::spawn_blocking(move || {
                worker_loop(worker_id, queue, job_fn, stop, tx);
            });
        }

        // The stream ends when the last worker drops its sender.
        drop(tx);

        ResultStream { rx }
    }
}

fn worker_loop(
    worker_id: String,
    queue: Arc<Mutex<VecDeque<WorkerGroup>>>,
    job_fn: Arc<dyn JobFn>,
    stop: StopSignal,
    tx: mpsc::UnboundedSender<JobResult>,
) {
    loop {
        if stop.is_stopped() {
            debug!(worker_id = %worker_id, "Stop signal raised, not pulling further groups");
            return;
        }

        let group = {
            // Recover the queue if a sibling worker panicked while holding
            // the lock; the queue itself is only popped, never left torn.
            let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.pop_front()
        };
        let Some(group) = group else {
            debug!(worker_id = %worker_id, "Queue drained, worker exiting");
            return;
        };

        for job in group.into_jobs() {
            let result = execute_job(&worker_id, &*job_fn, &job);
            if tx.send(result).is_err() {
                // Consumer went away; no point finishing the batch.
                return;
            }
        }
    }
}

/// Runs one job, isolating errors and panics at job granularity.
fn execute_job(worker_id: &str, job_fn: &dyn JobFn, job: &Job) -> JobResult {
    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| job_fn.run(job)));
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(metrics)) => JobResult::success(job.id.as_str(), worker_id, duration_ms, metrics),
        Ok(Err(error)) => JobResult::failure(job.id.as_str(), worker_id, error, duration_ms),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            JobResult::failure(
                job.id.as_str(),
                worker_id,
                format!("job panicked: {message}"),
                duration_ms,
            )
        }
    }
}
