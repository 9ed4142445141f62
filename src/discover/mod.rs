//! File discovery: turns a directory tree into a weighted job list.
//!
//! The scan is the bundled job-source collaborator for the batch engine.
//! Job ids are file paths, weights are byte sizes. Enumeration is sorted
//! by file name so re-runs sharing a checkpoint see the same ids for the
//! same files.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::scheduler::Job;

/// Errors that can occur while enumerating jobs.
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// The root directory does not exist.
    #[error("Root directory not found: {0}")]
    RootNotFound(String),

    /// The root path exists but is not a directory.
    #[error("Root path is not a directory: {0}")]
    NotADirectory(String),
}

/// Recursively scans `root` for files matching one of `extensions`
/// (case-insensitive, without the leading dot; an empty list matches every
/// file).
///
/// Editor temp files (`~$` prefix) are skipped. A file whose metadata
/// cannot be read is still scheduled with weight zero; the weight-read
/// failure is not a job failure. Unreadable directory entries are logged
/// and skipped.
pub fn scan(root: &Path, extensions: &[String]) -> Result<Vec<Job>, DiscoverError> {
    if !root.exists() {
        return Err(DiscoverError::RootNotFound(root.display().to_string()));
    }
    if !root.is_dir() {
        return Err(DiscoverError::NotADirectory(root.display().to_string()));
    }

    let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
    let mut jobs = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with("~$") {
            continue;
        }
        if !extensions.is_empty() {
            let matches = entry
                .path()
                .extension()
                .map(|ext| extensions.contains(&ext.to_string_lossy().to_lowercase()))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }

        let weight = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Could not read file size, scheduling with weight zero"
                );
                0
            }
        };

        jobs.push(Job::new(entry.path().display().to_string()).with_weight(weight));
    }

    debug!(root = %root.display(), n_jobs = jobs.len(), "Discovery finished");
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_missing_root_is_error() {
        let err = scan(Path::new("/nonexistent/rowforge-test"), &[]).unwrap_err();
        assert!(matches!(err, DiscoverError::RootNotFound(_)));
    }

    #[test]
    fn test_file_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.csv");
        touch(&file, b"a,b\n");
        let err = scan(&file, &[]).unwrap_err();
        assert!(matches!(err, DiscoverError::NotADirectory(_)));
    }

    #[test]
    fn test_recursive_scan_with_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.csv"), b"1,2,3\n");
        touch(&dir.path().join("nested/deep/b.csv"), b"4,5\n");
        touch(&dir.path().join("notes.txt"), b"ignore me");
        touch(&dir.path().join("upper.CSV"), b"6\n");

        let jobs = scan(dir.path(), &["csv".to_string()]).unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.weight.is_some()));

        let a = jobs.iter().find(|j| j.id.ends_with("a.csv")).unwrap();
        assert_eq!(a.weight, Some(6));
    }

    #[test]
    fn test_editor_temp_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("real.csv"), b"x\n");
        touch(&dir.path().join("~$real.csv"), b"lock");

        let jobs = scan(dir.path(), &["csv".to_string()]).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].id.ends_with("real.csv"));
    }

    #[test]
    fn test_empty_extension_list_matches_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.csv"), b"1\n");
        touch(&dir.path().join("b.txt"), b"2\n");
        touch(&dir.path().join("noext"), b"3\n");

        let jobs = scan(dir.path(), &[]).unwrap();
        assert_eq!(jobs.len(), 3);
    }

    #[test]
    fn test_enumeration_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("c.csv"), b"1");
        touch(&dir.path().join("a.csv"), b"1");
        touch(&dir.path().join("b.csv"), b"1");

        let jobs = scan(dir.path(), &["csv".to_string()]).unwrap();
        let names: Vec<&str> = jobs
            .iter()
            .map(|j| j.id.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "c.csv"]);
    }
}
