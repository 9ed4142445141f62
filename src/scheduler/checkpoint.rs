//! Durable record of completed job ids.
//!
//! The checkpoint is a small JSON file owning the set of job ids whose
//! side effects were durably applied. Loading is tolerant (a missing or
//! corrupt file yields an empty state, a fresh run is always safe, only
//! slower) and flushing is atomic (write to a temp file in the same
//! directory, then rename over the target), so a crash mid-write never
//! corrupts the previous valid checkpoint.
//!
//! The store is single-writer by contract: it is only mutated from the
//! run controller's result-consume loop, so it carries no internal
//! locking. Do not share a store across concurrent writers.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Default number of recorded results between periodic flushes.
pub const DEFAULT_FLUSH_EVERY: usize = 1000;

/// Errors that can occur while persisting a checkpoint.
///
/// Load-time problems are deliberately not represented here: an unreadable
/// checkpoint is degraded to an empty state instead of failing the run.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Writing or renaming the checkpoint file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the checkpoint state failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisting the temp file over the checkpoint failed.
    #[error("Failed to persist checkpoint: {0}")]
    Persist(String),
}

/// Serialized checkpoint contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Ids of jobs whose side effects are durably applied.
    pub completed: BTreeSet<String>,
    /// When the state was last flushed.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Free-form run metadata (run id, start time, ...).
    #[serde(default)]
    pub run_metadata: Option<serde_json::Value>,
}

/// Durable, append-safe store of completed job ids.
pub struct CheckpointStore {
    path: Option<PathBuf>,
    state: CheckpointState,
    flush_every: usize,
    pending: usize,
}

impl CheckpointStore {
    /// Creates a store with no backing file; records are kept in memory
    /// only and flushes are no-ops.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: CheckpointState::default(),
            flush_every: DEFAULT_FLUSH_EVERY,
            pending: 0,
        }
    }

    /// Loads a store from `path`, tolerating a missing or corrupt file.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::read_state(&path);
        Self {
            path: Some(path),
            state,
            flush_every: DEFAULT_FLUSH_EVERY,
            pending: 0,
        }
    }

    /// Opens `path` for writing but discards any previously completed ids
    /// (a non-resuming run).
    pub fn fresh(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            state: CheckpointState::default(),
            flush_every: DEFAULT_FLUSH_EVERY,
            pending: 0,
        }
    }

    /// Sets the periodic flush cadence (number of recorded results).
    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every.max(1);
        self
    }

    fn read_state(path: &Path) -> CheckpointState {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<CheckpointState>(&bytes) {
                Ok(state) => {
                    info!(
                        path = %path.display(),
                        completed = state.completed.len(),
                        "Loaded checkpoint"
                    );
                    state
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Corrupt checkpoint, starting from empty state"
                    );
                    CheckpointState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckpointState::default(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Unreadable checkpoint, starting from empty state"
                );
                CheckpointState::default()
            }
        }
    }

    /// Records a completed job id. Recording the same id twice is a no-op.
    pub fn record(&mut self, job_id: impl Into<String>) {
        if self.state.completed.insert(job_id.into()) {
            self.pending += 1;
        }
    }

    /// Returns whether `job_id` was already completed.
    pub fn contains(&self, job_id: &str) -> bool {
        self.state.completed.contains(job_id)
    }

    /// Number of completed ids.
    pub fn len(&self) -> usize {
        self.state.completed.len()
    }

    /// Returns whether no ids have been recorded.
    pub fn is_empty(&self) -> bool {
        self.state.completed.is_empty()
    }

    /// Attaches free-form run metadata, persisted at the next flush.
    pub fn set_run_metadata(&mut self, metadata: serde_json::Value) {
        self.state.run_metadata = Some(metadata);
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Flushes if the periodic cadence has been reached. Returns whether a
    /// flush happened.
    pub fn maybe_flush(&mut self) -> Result<bool, CheckpointError> {
        if self.pending < self.flush_every {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    /// Serializes the full state and atomically replaces the checkpoint
    /// file. A no-op for in-memory stores.
    pub fn flush(&mut self) -> Result<(), CheckpointError> {
        let Some(path) = &self.path else {
            self.pending = 0;
            return Ok(());
        };

        self.state.last_updated = Some(Utc::now());

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        serde_json::to_writer_pretty(&mut tmp, &self.state)?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|e| CheckpointError::Persist(e.to_string()))?;

        self.pending = 0;
        Ok(())
    }
}
