//! Running counters and progress snapshots for a batch run.
//!
//! The aggregator is the single owner of the run's mutable counters: it
//! consumes the result stream inside the controller's consume loop,
//! updates `RunStats`, and pushes periodic snapshots to an optional
//! `ProgressSink`. Counters are order-insensitive, so results may arrive
//! in any interleaving across worker groups.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use super::job::JobResult;

/// Default number of results between snapshot emissions.
pub const DEFAULT_EMIT_EVERY: usize = 100;

/// Default wall-clock interval between snapshot emissions.
pub const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_secs(5);

/// Aggregate counters for one run.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Number of jobs scheduled for this run (after checkpoint filtering).
    pub total: usize,
    /// Jobs that completed successfully.
    pub completed: u64,
    /// Jobs whose function returned an error or panicked.
    pub failed: u64,
    started_at: Instant,
}

impl RunStats {
    /// Creates zeroed stats for `total` scheduled jobs.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            started_at: Instant::now(),
        }
    }

    /// Jobs attempted so far; failures count toward completion percentage.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Fraction of scheduled jobs attempted, in `[0, 1]`.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.processed() as f64 / self.total as f64
    }

    /// Time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Attempted jobs per second.
    pub fn rate(&self) -> f64 {
        self.rate_with_elapsed(self.elapsed())
    }

    fn rate_with_elapsed(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.processed() as f64 / secs
    }

    /// Estimated time remaining, `None` until a rate is measurable.
    pub fn eta(&self) -> Option<Duration> {
        self.eta_with_elapsed(self.elapsed())
    }

    fn eta_with_elapsed(&self, elapsed: Duration) -> Option<Duration> {
        let rate = self.rate_with_elapsed(elapsed);
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.total as u64 - self.processed().min(self.total as u64);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}

/// Immutable snapshot of `RunStats` pushed to a progress sink.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: u64,
    pub failed: u64,
    pub percent: f64,
    pub rate: f64,
    pub eta_secs: Option<u64>,
    pub elapsed_secs: u64,
}

impl ProgressSnapshot {
    fn from_stats(stats: &RunStats) -> Self {
        Self {
            total: stats.total,
            completed: stats.completed,
            failed: stats.failed,
            percent: stats.percent(),
            rate: stats.rate(),
            eta_secs: stats.eta().map(|d| d.as_secs()),
            elapsed_secs: stats.elapsed().as_secs(),
        }
    }
}

/// Push-only consumer of progress snapshots.
///
/// There is no backpressure contract: a sink that cannot keep up should
/// drop snapshots rather than block the consume loop.
pub trait ProgressSink: Send {
    fn publish(&mut self, snapshot: &ProgressSnapshot);
}

/// Sink that renders each snapshot as a structured log line.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn publish(&mut self, snapshot: &ProgressSnapshot) {
        info!(
            processed = snapshot.completed + snapshot.failed,
            total = snapshot.total,
            failed = snapshot.failed,
            percent = %format!("{:.1}%", snapshot.percent * 100.0),
            rate = %format!("{:.0}/s", snapshot.rate),
            eta_secs = snapshot.eta_secs,
            "Progress"
        );
    }
}

/// Consumes the result stream and maintains `RunStats`.
pub struct ProgressAggregator {
    stats: RunStats,
    sink: Option<Box<dyn ProgressSink>>,
    emit_every: usize,
    emit_interval: Duration,
    since_emit: usize,
    last_emit: Instant,
}

impl ProgressAggregator {
    /// Creates an aggregator for `total` scheduled jobs with an optional
    /// snapshot sink.
    pub fn new(total: usize, sink: Option<Box<dyn ProgressSink>>) -> Self {
        Self {
            stats: RunStats::new(total),
            sink,
            emit_every: DEFAULT_EMIT_EVERY,
            emit_interval: DEFAULT_EMIT_INTERVAL,
            since_emit: 0,
            last_emit: Instant::now(),
        }
    }

    /// Sets the count cadence for snapshot emission.
    pub fn with_emit_every(mut self, emit_every: usize) -> Self {
        self.emit_every = emit_every.max(1);
        self
    }

    /// Sets the wall-clock cadence for snapshot emission.
    pub fn with_emit_interval(mut self, interval: Duration) -> Self {
        self.emit_interval = interval;
        self
    }

    /// Updates counters for one result, emitting a snapshot when either
    /// cadence fires. Never retries a failed job; retry-by-rerun falls out
    /// of the checkpoint never containing failed ids.
    pub fn observe(&mut self, result: &JobResult) {
        if result.is_success() {
            self.stats.completed += 1;
        } else {
            self.stats.failed += 1;
        }
        self.since_emit += 1;

        let done = self.stats.processed() >= self.stats.total as u64;
        if self.since_emit >= self.emit_every
            || self.last_emit.elapsed() >= self.emit_interval
            || done
        {
            self.emit();
        }
    }

    /// Current counters.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn emit(&mut self) {
        self.since_emit = 0;
        self.last_emit = Instant::now();
        if let Some(sink) = self.sink.as_mut() {
            sink.publish(&ProgressSnapshot::from_stats(&self.stats));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn success(id: &str) -> JobResult {
        JobResult::success(id, "worker-0", 1, None)
    }

    fn failure(id: &str) -> JobResult {
        JobResult::failure(id, "worker-0", "boom", 1)
    }

    #[test]
    fn test_counters_split_success_and_failure() {
        let mut agg = ProgressAggregator::new(3, None);
        agg.observe(&success("a"));
        agg.observe(&failure("b"));
        agg.observe(&success("c"));

        let stats = agg.stats();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processed(), 3);
        assert!((stats.percent() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_and_eta_math() {
        let mut stats = RunStats::new(100);
        stats.completed = 38;
        stats.failed = 2;

        let elapsed = Duration::from_secs(10);
        assert!((stats.rate_with_elapsed(elapsed) - 4.0).abs() < 1e-9);
        // 60 remaining at 4/s -> 15 seconds.
        assert_eq!(
            stats.eta_with_elapsed(elapsed),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_eta_undefined_before_first_result() {
        let stats = RunStats::new(10);
        assert_eq!(stats.rate_with_elapsed(Duration::from_secs(5)), 0.0);
        assert_eq!(stats.eta_with_elapsed(Duration::from_secs(5)), None);
    }

    #[test]
    fn test_percent_of_empty_run_is_complete() {
        let stats = RunStats::new(0);
        assert!((stats.percent() - 1.0).abs() < f64::EPSILON);
    }

    struct ChannelSink(mpsc::Sender<ProgressSnapshot>);

    impl ProgressSink for ChannelSink {
        fn publish(&mut self, snapshot: &ProgressSnapshot) {
            // Drop-on-overflow: ignore a disconnected receiver.
            let _ = self.0.send(snapshot.clone());
        }
    }

    #[test]
    fn test_count_cadence_emission() {
        let (tx, rx) = mpsc::channel();
        let mut agg = ProgressAggregator::new(10, Some(Box::new(ChannelSink(tx))))
            .with_emit_every(3)
            .with_emit_interval(Duration::from_secs(3600));

        for i in 0..6 {
            agg.observe(&success(&format!("j-{i}")));
        }

        let snapshots: Vec<ProgressSnapshot> = rx.try_iter().collect();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].completed, 3);
        assert_eq!(snapshots[1].completed, 6);
    }

    #[test]
    fn test_final_result_always_emits() {
        let (tx, rx) = mpsc::channel();
        let mut agg = ProgressAggregator::new(2, Some(Box::new(ChannelSink(tx))))
            .with_emit_every(1000)
            .with_emit_interval(Duration::from_secs(3600));

        agg.observe(&success("a"));
        agg.observe(&failure("b"));

        let snapshots: Vec<ProgressSnapshot> = rx.try_iter().collect();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].failed, 1);
        assert_eq!(snapshots[0].total, 2);
    }
}
