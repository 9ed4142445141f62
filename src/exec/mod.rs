//! Shell-command job function.
//!
//! `CommandJobFn` keeps the engine format-agnostic: the per-file mutation
//! is delegated to an external command with the file path substituted for
//! a `{}` placeholder (appended as a final argument when the template has
//! none). Exit status zero means the mutation was durably applied; the
//! command is expected to be idempotent, typically by writing to a temp
//! file and renaming over the original.

use std::process::Command;

use tracing::trace;

use crate::scheduler::{Job, JobFn, ResourceProfile};

/// Placeholder replaced by the (shell-quoted) file path.
const PLACEHOLDER: &str = "{}";

/// Executes a shell command template once per job.
pub struct CommandJobFn {
    template: String,
    profile: ResourceProfile,
}

impl CommandJobFn {
    /// Creates a job function from a command template, e.g.
    /// `"csvcut -C 1 {} > {}.tmp && mv {}.tmp {}"`.
    pub fn new(template: impl Into<String>, profile: ResourceProfile) -> Self {
        Self {
            template: template.into(),
            profile,
        }
    }

    fn render(&self, path: &str) -> String {
        let quoted = shell_quote(path);
        if self.template.contains(PLACEHOLDER) {
            self.template.replace(PLACEHOLDER, &quoted)
        } else {
            format!("{} {}", self.template, quoted)
        }
    }
}

impl JobFn for CommandJobFn {
    fn profile(&self) -> ResourceProfile {
        self.profile
    }

    fn run(&self, job: &Job) -> Result<Option<serde_json::Value>, String> {
        let command = self.render(&job.id);
        trace!(job_id = %job.id, %command, "Running job command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .map_err(|e| format!("failed to spawn command: {e}"))?;

        if output.status.success() {
            Ok(Some(serde_json::json!({ "exit_code": 0 })))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            Err(format!("exit code {code}: {}", stderr.trim()))
        }
    }
}

/// Single-quotes `s` for POSIX shells.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> Job {
        Job::new(id)
    }

    #[test]
    fn test_placeholder_substitution() {
        let f = CommandJobFn::new("head -n1 {} > {}.out", ResourceProfile::IoBound);
        assert_eq!(f.render("a.csv"), "head -n1 'a.csv' > 'a.csv'.out");
    }

    #[test]
    fn test_path_appended_without_placeholder() {
        let f = CommandJobFn::new("wc -l", ResourceProfile::IoBound);
        assert_eq!(f.render("data/b.csv"), "wc -l 'data/b.csv'");
    }

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's.csv"), r"'it'\''s.csv'");
    }

    #[test]
    fn test_successful_command_reports_metrics() {
        let f = CommandJobFn::new("true", ResourceProfile::IoBound);
        let metrics = f.run(&job("ignored")).unwrap();
        assert_eq!(metrics, Some(serde_json::json!({ "exit_code": 0 })));
    }

    #[test]
    fn test_failing_command_carries_stderr() {
        let f = CommandJobFn::new("echo oops >&2; exit 3; #", ResourceProfile::IoBound);
        let err = f.run(&job("ignored")).unwrap_err();
        assert!(err.contains("exit code 3"), "{err}");
        assert!(err.contains("oops"), "{err}");
    }

    #[test]
    fn test_command_touches_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.csv");
        std::fs::write(&path, "col,val\n").unwrap();

        let f = CommandJobFn::new("rm {}", ResourceProfile::IoBound);
        f.run(&job(&path.display().to_string())).unwrap();
        assert!(!path.exists());
    }
}
