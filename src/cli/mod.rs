//! Command-line interface for rowforge.
//!
//! Provides the `run` command (discover files and execute a command
//! template over them with checkpointed parallelism) and the `report`
//! command (render a completed-file report from a checkpoint).

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
