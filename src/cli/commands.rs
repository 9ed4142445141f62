//! CLI command definitions for rowforge.
//!
//! The `run` command wires the bundled collaborators (directory discovery
//! and the shell-command job function) into the batch engine; `report`
//! inspects a checkpoint without touching any files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use crate::discover;
use crate::exec::CommandJobFn;
use crate::scheduler::{
    BatchRunner, CheckpointState, CheckpointStore, LogSink, ResourceProfile, RunConfig,
};

/// Default checkpoint file location.
const DEFAULT_CHECKPOINT: &str = "checkpoint.json";

/// Default file extension filter.
const DEFAULT_EXTENSION: &str = "csv";

/// Checkpointed parallel batch runner for bulk file mutations.
#[derive(Parser)]
#[command(name = "rowforge")]
#[command(about = "Run a command over large file batches in parallel, with resume")]
#[command(version)]
#[command(
    long_about = "rowforge distributes independent per-file jobs across a bounded worker pool,\n\
                  balancing by file size and checkpointing completed files so an interrupted\n\
                  run resumes without reprocessing.\n\n\
                  Example usage:\n  \
                  rowforge run ./data -c 'csvtool drop 1 {} -o {}' -w 8 --checkpoint run.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Discover files under a root and run a command over each in parallel.
    Run(RunArgs),

    /// Render a report of completed jobs from a checkpoint file.
    Report(ReportArgs),
}

/// Resource profile of the job command, used to derive the default worker
/// count.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProfileArg {
    /// Blocking I/O dominated (default): more workers than cores.
    Io,
    /// Computation dominated: one worker per core.
    Cpu,
}

impl From<ProfileArg> for ResourceProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Io => ResourceProfile::IoBound,
            ProfileArg::Cpu => ResourceProfile::CpuBound,
        }
    }
}

/// Arguments for `rowforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Root directory to scan for files.
    pub root: PathBuf,

    /// Command template executed once per file; `{}` is replaced by the
    /// quoted file path (appended when absent). Must be idempotent.
    #[arg(short = 'c', long = "command")]
    pub command: String,

    /// File extensions to process (without the dot). Repeat the flag for
    /// multiple extensions; an empty value matches every file.
    #[arg(short = 'e', long = "ext", default_value = DEFAULT_EXTENSION)]
    pub extensions: Vec<String>,

    /// Number of parallel workers (default: derived from --profile).
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Checkpoint file for resume capability.
    #[arg(long, default_value = DEFAULT_CHECKPOINT)]
    pub checkpoint: PathBuf,

    /// Ignore the existing checkpoint and reprocess everything.
    #[arg(long)]
    pub no_resume: bool,

    /// Flush the checkpoint every N completed jobs.
    #[arg(long, default_value = "1000")]
    pub flush_every: usize,

    /// Emit a progress log line every N results.
    #[arg(long, default_value = "100")]
    pub emit_every: usize,

    /// Resource profile of the command.
    #[arg(long, value_enum, default_value = "io")]
    pub profile: ProfileArg,
}

/// Arguments for `rowforge report`.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Checkpoint file to report on.
    #[arg(default_value = DEFAULT_CHECKPOINT)]
    pub checkpoint: PathBuf,

    /// Write the report to a file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes the parsed CLI command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_batch(args).await,
        Commands::Report(args) => report(args),
    }
}

async fn run_batch(args: RunArgs) -> anyhow::Result<()> {
    let extensions: Vec<String> = args
        .extensions
        .iter()
        .filter(|e| !e.is_empty())
        .cloned()
        .collect();

    let jobs = discover::scan(&args.root, &extensions)?;
    info!(
        root = %args.root.display(),
        n_jobs = jobs.len(),
        "Discovered jobs"
    );

    let job_fn = Arc::new(CommandJobFn::new(args.command, args.profile.into()));
    let runner = BatchRunner::new(RunConfig {
        worker_count: args.workers,
        checkpoint_path: Some(args.checkpoint),
        flush_every: args.flush_every,
        emit_every: args.emit_every,
        emit_interval: Duration::from_secs(5),
        resume: !args.no_resume,
    });

    // Ctrl-C drains in-flight groups instead of aborting mid-mutation.
    let stop = runner.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work before exit");
            stop.stop();
        }
    });

    let summary = runner.run(jobs, job_fn, Some(Box::new(LogSink))).await?;

    info!(
        total = summary.total,
        skipped = summary.skipped,
        completed = summary.completed,
        failed = summary.failed,
        elapsed_secs = %format!("{:.1}", summary.elapsed.as_secs_f64()),
        rate = %format!("{:.0}/s", summary.throughput),
        interrupted = summary.interrupted,
        "Batch run summary"
    );
    if summary.failed > 0 {
        warn!(
            failed = summary.failed,
            "Some jobs failed; re-run with the same checkpoint to retry them"
        );
    }

    Ok(())
}

fn report(args: ReportArgs) -> anyhow::Result<()> {
    let store = CheckpointStore::load(&args.checkpoint);
    let rendered = render_report(store.state(), &args.checkpoint.display().to_string());

    match args.output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            info!(path = %path.display(), "Report written");
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

fn render_report(state: &CheckpointState, checkpoint: &str) -> String {
    let mut out = String::new();
    out.push_str("Batch Processing Report\n");
    out.push_str("=======================\n");
    out.push_str(&format!("Checkpoint: {checkpoint}\n"));
    let last_updated = state
        .last_updated
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    out.push_str(&format!("Last updated: {last_updated}\n"));
    out.push_str(&format!("Completed jobs: {}\n\n", state.completed.len()));
    for id in &state.completed {
        out.push_str(id);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_report_empty_state() {
        let state = CheckpointState::default();
        let report = render_report(&state, "checkpoint.json");
        assert!(report.contains("Completed jobs: 0"));
        assert!(report.contains("Last updated: never"));
    }

    #[test]
    fn test_render_report_lists_sorted_ids() {
        let mut state = CheckpointState::default();
        state.completed.insert("b.csv".to_string());
        state.completed.insert("a.csv".to_string());
        let report = render_report(&state, "run.json");

        assert!(report.contains("Completed jobs: 2"));
        let a = report.find("a.csv").unwrap();
        let b = report.find("b.csv").unwrap();
        assert!(a < b, "ids render in sorted order");
    }
}
