//! Size-aware partitioning of jobs into worker groups.
//!
//! The balancer minimizes the makespan of the slowest worker with the
//! classic longest-processing-time (LPT) greedy heuristic, which stays
//! within 4/3 of the optimal maximum group weight. When no job carries a
//! weight it falls back to slicing the list into `4 × worker_count`
//! contiguous chunks, over-provisioning chunk count so early-finishing
//! workers can pull more work from the dispatcher queue instead of idling.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use super::job::{Job, WorkerGroup};

/// Chunk-per-worker multiplier used when no weights are available.
const CHUNKS_PER_WORKER: usize = 4;

/// Partitions `jobs` into at most `worker_count` groups (weighted path) or
/// `4 × worker_count` chunks (weightless path), dropping empty groups.
///
/// Jobs with an unreadable weight (`Some(0)`) are scheduled like any other
/// job; only a list where *no* job carries a weight triggers the chunked
/// fallback. Order within each group is the assignment order, which for
/// equal weights preserves enumeration order.
///
/// # Panics
///
/// Does not panic; `worker_count == 0` is clamped to 1.
pub fn balance(jobs: Vec<Job>, worker_count: usize) -> Vec<WorkerGroup> {
    let worker_count = worker_count.max(1);

    if jobs.is_empty() {
        return Vec::new();
    }

    if jobs.iter().all(|j| j.weight.is_none()) {
        debug!(
            n_jobs = jobs.len(),
            worker_count, "No weights available, falling back to chunked slicing"
        );
        return chunk(jobs, worker_count);
    }

    lpt(jobs, worker_count)
}

/// Longest-processing-time greedy bin-packing.
fn lpt(mut jobs: Vec<Job>, worker_count: usize) -> Vec<WorkerGroup> {
    // Stable sort keeps enumeration order for equal weights, which makes
    // the produced groups deterministic.
    jobs.sort_by_key(|j| Reverse(j.effective_weight()));

    let mut groups = vec![WorkerGroup::default(); worker_count];

    // Min-heap over (load, worker index): pops the least-loaded worker,
    // ties broken by the lowest index.
    let mut loads: BinaryHeap<Reverse<(u64, usize)>> = (0..worker_count)
        .map(|idx| Reverse((0u64, idx)))
        .collect();

    for job in jobs {
        let Reverse((load, idx)) = loads.pop().unwrap_or(Reverse((0, 0)));
        let load = load + job.effective_weight();
        groups[idx].push(job);
        loads.push(Reverse((load, idx)));
    }

    groups.retain(|g| !g.is_empty());

    debug!(
        n_groups = groups.len(),
        max_weight = groups.iter().map(WorkerGroup::total_weight).max(),
        "Balanced jobs with LPT"
    );

    groups
}

/// Contiguous equal-length chunking into `4 × worker_count` groups.
fn chunk(jobs: Vec<Job>, worker_count: usize) -> Vec<WorkerGroup> {
    let target_chunks = worker_count * CHUNKS_PER_WORKER;
    let chunk_size = jobs.len().div_ceil(target_chunks).max(1);

    jobs.chunks(chunk_size)
        .map(|batch| WorkerGroup::new(batch.to_vec()))
        .collect()
}
