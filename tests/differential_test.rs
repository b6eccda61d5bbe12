//! Differential-backup scenario run end-to-end through the scheduler:
//! a full backup followed by a differential with one deletion and one
//! addition (§8 scenario 2).

use backvault::config::{BackupConfig, ConfigStore, LogFormat, LogTarget};
use backvault::control::JobControlCoordinator;
use backvault::encryption::NoopEncryptionHook;
use backvault::gate::{BusinessProcessGate, NoProcessDetector};
use backvault::job::{BackupJob, BackupKind};
use backvault::log_manager::LogManager;
use backvault::scheduler::Scheduler;
use backvault::state::{JobStateTracker, NullStateRepository};
use std::sync::Arc;
use tempfile::tempdir;

fn new_scheduler(dir: &std::path::Path) -> Scheduler {
    Scheduler::new(
        Arc::new(ConfigStore::new(BackupConfig::default())),
        Arc::new(JobControlCoordinator::new()),
        Arc::new(JobStateTracker::new(Arc::new(NullStateRepository))),
        Arc::new(LogManager::new(LogTarget::Local, LogFormat::Json, dir.join("logs"), None)),
        Arc::new(NoopEncryptionHook),
        Arc::new(BusinessProcessGate::new(Box::new(NoProcessDetector))),
    )
}

#[test]
fn differential_run_captures_new_file_and_reports_deletion() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let target = dir.path().join("target");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("x.txt"), b"x").unwrap();
    std::fs::write(source.join("y.txt"), b"y").unwrap();

    let full_scheduler = new_scheduler(dir.path());
    let catalog = vec![BackupJob::new("job", source.clone(), target.clone(), BackupKind::Full)];
    assert!(full_scheduler.execute(&[1], &catalog).is_none());

    // Source now drops y.txt and adds z.txt; x.txt is untouched.
    std::fs::remove_file(source.join("y.txt")).unwrap();
    std::fs::write(source.join("z.txt"), b"z").unwrap();

    let differential_scheduler = new_scheduler(dir.path());
    let differential_catalog = vec![BackupJob::new("job", source.clone(), target.clone(), BackupKind::Differential)];
    assert!(differential_scheduler.execute(&[1], &differential_catalog).is_none());

    let differential_root = target.join("differential");
    assert!(differential_root.join("z.txt").exists());
    assert!(!differential_root.join("x.txt").exists(), "unchanged file must not be copied");

    let deleted = std::fs::read_to_string(differential_root.join("_deleted_files.txt")).unwrap();
    assert_eq!(deleted, "y.txt");
}

#[test]
fn differential_run_with_no_prior_full_falls_back_to_full() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let target = dir.path().join("target");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("only.txt"), b"data").unwrap();

    let scheduler = new_scheduler(dir.path());
    let catalog = vec![BackupJob::new("job", source, target.clone(), BackupKind::Differential)];
    assert!(scheduler.execute(&[1], &catalog).is_none());

    assert!(target.join("full").join("only.txt").exists());
    assert!(!target.join("differential").exists());
}
