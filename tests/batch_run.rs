//! End-to-end batch run: discovery, dispatch, checkpoint, resume.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rowforge::{BatchRunner, CheckpointStore, Job, JobFn, ResourceProfile, RunConfig};

/// Mutates each discovered file in place (uppercases its contents) through
/// a temp-file-and-rename, the same pattern real mutation commands use.
struct UppercaseFn {
    calls: AtomicUsize,
}

impl JobFn for UppercaseFn {
    fn profile(&self) -> ResourceProfile {
        ResourceProfile::IoBound
    }

    fn run(&self, job: &Job) -> Result<Option<serde_json::Value>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let path = Path::new(&job.id);
        let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, contents.to_uppercase()).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp, path).map_err(|e| e.to_string())?;

        Ok(Some(serde_json::json!({ "bytes": contents.len() })))
    }
}

fn seed_files(root: &Path, count: usize) {
    for i in 0..count {
        let dir = root.join(format!("part-{}", i % 3));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("data-{i:02}.csv")), format!("id,v\n{i},x\n")).unwrap();
    }
    // Noise that discovery must ignore.
    std::fs::write(root.join("readme.txt"), "not a job").unwrap();
    std::fs::write(root.join("~$data-00.csv"), "editor lock").unwrap();
}

#[tokio::test]
async fn test_full_run_then_resume_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("checkpoint.json");
    seed_files(dir.path(), 12);

    let jobs = rowforge::discover::scan(dir.path(), &["csv".to_string()]).unwrap();
    assert_eq!(jobs.len(), 12);

    let config = RunConfig {
        worker_count: Some(3),
        checkpoint_path: Some(checkpoint.clone()),
        flush_every: 4,
        ..RunConfig::default()
    };

    let job_fn = Arc::new(UppercaseFn {
        calls: AtomicUsize::new(0),
    });
    let runner = BatchRunner::new(config.clone());
    let summary = runner
        .run(jobs.clone(), Arc::clone(&job_fn) as Arc<dyn JobFn>, None)
        .await
        .unwrap();

    assert_eq!(summary.completed, 12);
    assert_eq!(summary.failed, 0);
    assert_eq!(job_fn.calls.load(Ordering::SeqCst), 12);

    // Mutations were applied.
    for job in &jobs {
        let contents = std::fs::read_to_string(&job.id).unwrap();
        assert!(contents.starts_with("ID,V"), "{}", job.id);
    }

    // The checkpoint holds every completed id.
    let store = CheckpointStore::load(&checkpoint);
    assert_eq!(store.len(), 12);

    // A second pass over the same tree re-invokes nothing.
    let resume_fn = Arc::new(UppercaseFn {
        calls: AtomicUsize::new(0),
    });
    let runner = BatchRunner::new(config);
    let jobs = rowforge::discover::scan(dir.path(), &["csv".to_string()]).unwrap();
    let summary = runner
        .run(jobs, Arc::clone(&resume_fn) as Arc<dyn JobFn>, None)
        .await
        .unwrap();

    assert_eq!(summary.skipped, 12);
    assert_eq!(summary.scheduled, 0);
    assert_eq!(resume_fn.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_file_left_for_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("checkpoint.json");
    seed_files(dir.path(), 5);

    let jobs = rowforge::discover::scan(dir.path(), &["csv".to_string()]).unwrap();

    // Make one file unreadable as a job by deleting it after discovery.
    let victim = jobs[2].id.clone();
    std::fs::remove_file(&victim).unwrap();

    let config = RunConfig {
        worker_count: Some(2),
        checkpoint_path: Some(checkpoint.clone()),
        ..RunConfig::default()
    };
    let job_fn = Arc::new(UppercaseFn {
        calls: AtomicUsize::new(0),
    });
    let runner = BatchRunner::new(config);
    let summary = runner
        .run(jobs, Arc::clone(&job_fn) as Arc<dyn JobFn>, None)
        .await
        .unwrap();

    assert_eq!(summary.completed, 4);
    assert_eq!(summary.failed, 1);

    // The failed id is absent, so a rerun would naturally retry it.
    let store = CheckpointStore::load(&checkpoint);
    assert_eq!(store.len(), 4);
    assert!(!store.contains(&victim));
}
