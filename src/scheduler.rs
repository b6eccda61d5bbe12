//! Scheduler: the run orchestrator (§4.6). Phase 1 spawns one analysis
//! thread per job; Phase 3 spawns a fixed worker pool that drains the
//! global queue. Grounded in the teacher's thread-per-unit pattern in
//! `core/directory.rs` and the counting-semaphore shape of
//! `core/concurrency.rs`, adapted to a single-permit gate that also
//! respects cancellation.

use crate::config::ConfigStore;
use crate::control::{CancellationToken, JobControlCoordinator};
use crate::encryption::EncryptionHook;
use crate::gate::BusinessProcessGate;
use crate::job::BackupJob;
use crate::log_manager::{to_unc_display, LogManager, LogRecord};
use crate::queue::{FileWorkItem, GlobalFileQueue};
use crate::state::{JobState, JobStateTracker, JobStatus};
use crate::strategy;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A single-permit gate, cancellation-aware: acquire polls a short wait
/// rather than blocking unboundedly, so a cancelled token is noticed
/// promptly instead of only at release time.
struct SinglePermitGate {
    available: Mutex<bool>,
    condvar: Condvar,
}

impl SinglePermitGate {
    fn new() -> Self {
        Self {
            available: Mutex::new(true),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until a permit is free or `token` cancels. Returns `true` if a
    /// permit was acquired (caller must call `release`), `false` if the wait
    /// was abandoned due to cancellation.
    fn acquire(&self, token: &CancellationToken) -> bool {
        let mut available = self.available.lock().expect("heavy gate lock poisoned");
        loop {
            if *available {
                *available = false;
                return true;
            }
            if token.is_cancelled() {
                return false;
            }
            let (guard, _timeout) = self
                .condvar
                .wait_timeout(available, Duration::from_millis(20))
                .expect("heavy gate lock poisoned");
            available = guard;
        }
    }

    fn release(&self) {
        *self.available.lock().expect("heavy gate lock poisoned") = true;
        self.condvar.notify_one();
    }
}

const DEQUEUE_BACKOFF: Duration = Duration::from_millis(1);
const HOSTNAME_FALLBACK: &str = "localhost";

/// Everything the scheduler needs to run a batch of jobs. Constructed once
/// and reused across runs.
pub struct Scheduler {
    config: Arc<ConfigStore>,
    coordinator: Arc<JobControlCoordinator>,
    tracker: Arc<JobStateTracker>,
    log_manager: Arc<LogManager>,
    encryption: Arc<dyn EncryptionHook>,
    business_gate: Arc<BusinessProcessGate>,
    heavy_gate: Arc<SinglePermitGate>,
}

impl Scheduler {
    pub fn new(
        config: Arc<ConfigStore>,
        coordinator: Arc<JobControlCoordinator>,
        tracker: Arc<JobStateTracker>,
        log_manager: Arc<LogManager>,
        encryption: Arc<dyn EncryptionHook>,
        business_gate: Arc<BusinessProcessGate>,
    ) -> Self {
        Self {
            config,
            coordinator,
            tracker,
            log_manager,
            encryption,
            business_gate,
            heavy_gate: Arc::new(SinglePermitGate::new()),
        }
    }

    /// Runs every job named by `job_ids` against `catalog` (1-based indices
    /// into `catalog`, already resolved by the caller's CLI-argument
    /// parsing). Returns a concatenation of accumulated error strings, or
    /// `None` on full success.
    pub fn execute(&self, job_ids: &[usize], catalog: &[BackupJob]) -> Option<String> {
        self.coordinator.stop_all(&self.tracker);
        self.coordinator.resume_all();
        self.tracker.clear_states();
        let queue = Arc::new(GlobalFileQueue::new());

        let mut errors = Vec::new();
        let mut valid_jobs = Vec::new();

        for &id in job_ids {
            match catalog.get(id.wrapping_sub(1)) {
                Some(job) if id >= 1 => valid_jobs.push((id, job.clone())),
                _ => errors.push(crate::error::BackupError::InvalidJobIndex(id).to_string()),
            }
        }

        for (id, job) in &valid_jobs {
            self.coordinator.register_job(&job.name);
            self.tracker.register_job(
                &job.name,
                JobState::new_inactive(*id, job.name.clone(), job.source.clone(), job.target.clone(), job.kind),
            );
        }

        let analysis_errors = self.run_analysis_phase(&valid_jobs, &queue);
        errors.extend(analysis_errors);

        self.run_worker_phase(&queue);

        for (_, job) in &valid_jobs {
            self.tracker.finalize_job_state(&job.name);
            self.coordinator.unregister_job(&job.name);
        }

        if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        }
    }

    fn run_analysis_phase(&self, jobs: &[(usize, BackupJob)], queue: &Arc<GlobalFileQueue>) -> Vec<String> {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();

        for (_, job) in jobs {
            let job = job.clone();
            let tracker = self.tracker.clone();
            let config = self.config.clone();
            let queue = queue.clone();
            let errors = errors.clone();

            handles.push(std::thread::spawn(move || {
                tracker.update_job_state(&job.name, |s| {
                    s.status = JobStatus::Active;
                    s.start_timestamp = Some(chrono::Utc::now());
                });

                let snapshot = config.snapshot();
                let priority_extensions = snapshot.priority_extension_set();
                let encryption_extensions = snapshot.encryption_extension_set();

                let mut job_strategy = strategy::build(
                    job.kind,
                    job.source.clone(),
                    job.target.clone(),
                    priority_extensions,
                    encryption_extensions,
                    job.name.clone(),
                );

                let items = match job_strategy.analyze() {
                    Ok(items) => items,
                    Err(e) => {
                        errors.lock().expect("errors lock poisoned").push(format!("{}: {e}", job.name));
                        tracker.update_job_state(&job.name, |s| s.status = JobStatus::Error);
                        return;
                    }
                };

                if items.is_empty() {
                    return;
                }

                let total_size: u64 = items.iter().map(|i| i.size).sum();
                tracker.update_job_state(&job.name, |s| {
                    s.total_files = items.len() as u64;
                    s.total_size = total_size;
                    s.remaining_files = items.len() as u64;
                    s.remaining_size = total_size;
                });

                if let Err(e) = job_strategy.prepare() {
                    errors.lock().expect("errors lock poisoned").push(format!("{}: {e}", job.name));
                    tracker.update_job_state(&job.name, |s| s.status = JobStatus::Error);
                    return;
                }

                queue.register_producer();
                for item in items {
                    queue.enqueue(item);
                }
                queue.producer_done();
            }));
        }

        for handle in handles {
            let _ = handle.join();
        }

        Arc::try_unwrap(errors).map(|m| m.into_inner().expect("errors lock poisoned")).unwrap_or_default()
    }

    fn run_worker_phase(&self, queue: &Arc<GlobalFileQueue>) {
        let worker_count = self.config.snapshot().worker_count();
        let size_threshold_bytes = self.config.snapshot().size_threshold_bytes();
        let mut handles = Vec::new();

        for _ in 0..worker_count {
            let queue = queue.clone();
            let coordinator = self.coordinator.clone();
            let tracker = self.tracker.clone();
            let log_manager = self.log_manager.clone();
            let encryption = self.encryption.clone();
            let business_gate = self.business_gate.clone();
            let heavy_gate = self.heavy_gate.clone();

            handles.push(std::thread::spawn(move || loop {
                if queue.is_completed() {
                    break;
                }
                match queue.try_dequeue() {
                    Some(item) => copy_and_process_file(
                        item,
                        size_threshold_bytes,
                        &coordinator,
                        &tracker,
                        &log_manager,
                        encryption.as_ref(),
                        &business_gate,
                        &heavy_gate,
                    ),
                    None => std::thread::sleep(DEQUEUE_BACKOFF),
                }
            }));
        }

        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn copy_and_process_file(
    item: FileWorkItem,
    size_threshold_bytes: u64,
    coordinator: &JobControlCoordinator,
    tracker: &JobStateTracker,
    log_manager: &LogManager,
    encryption: &dyn EncryptionHook,
    business_gate: &BusinessProcessGate,
    heavy_gate: &SinglePermitGate,
) {
    if coordinator.is_cancelled(&item.job_name) {
        return;
    }
    let token = match coordinator.get_token(&item.job_name) {
        Some(t) => t,
        None => return,
    };

    if !coordinator.wait_for_resume(&item.job_name) {
        return;
    }

    business_gate.wait_if_business_process(&token);
    if token.is_cancelled() {
        return;
    }

    let heavy = item.size > size_threshold_bytes;
    if heavy {
        if !heavy_gate.acquire(&token) {
            return;
        }
        perform_copy(item, tracker, log_manager, encryption);
        heavy_gate.release();
    } else {
        perform_copy(item, tracker, log_manager, encryption);
    }
}

fn perform_copy(item: FileWorkItem, tracker: &JobStateTracker, log_manager: &LogManager, encryption: &dyn EncryptionHook) {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| HOSTNAME_FALLBACK.to_string());

    if let Some(parent) = item.destination.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            emit_failure(&item, tracker, log_manager, &hostname, e);
            return;
        }
    }

    let start = Instant::now();
    let copy_result = std::fs::copy(&item.source, &item.destination);
    let copy_ms = start.elapsed().as_secs_f64() * 1000.0;

    if let Err(e) = copy_result {
        emit_failure(&item, tracker, log_manager, &hostname, e);
        return;
    }

    let encryption_ms = if item.requires_encryption {
        encryption.encrypt(&item.destination)
    } else {
        0
    };

    log_manager.write(LogRecord::new(
        item.job_name.clone(),
        to_unc_display(&item.source, &hostname),
        to_unc_display(&item.destination, &hostname),
        item.size,
        copy_ms,
        encryption_ms,
    ));

    tracker.update_job_state(&item.job_name, |s| {
        s.record_file_processed(item.size, item.source.clone(), item.destination.clone());
    });
}

fn emit_failure(item: &FileWorkItem, tracker: &JobStateTracker, log_manager: &LogManager, hostname: &str, error: std::io::Error) {
    tracing::warn!(job = %item.job_name, source = %item.source.display(), error = %error, "copy failed");

    log_manager.write(LogRecord::new(
        item.job_name.clone(),
        to_unc_display(&item.source, hostname),
        to_unc_display(&item.destination, hostname),
        item.size,
        -1.0,
        0,
    ));

    tracker.update_job_state(&item.job_name, |s| s.status = JobStatus::Error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupConfig;
    use crate::encryption::NoopEncryptionHook;
    use crate::gate::{BusinessProcessGate, NoProcessDetector};
    use crate::job::BackupKind;
    use crate::state::NullStateRepository;
    use tempfile::tempdir;

    fn build_scheduler(tempdir: &std::path::Path, max_jobs: usize, threshold_mb: u64) -> Scheduler {
        let mut config = BackupConfig::default();
        config.max_simultaneous_jobs = max_jobs;
        config.size_threshold_mb = threshold_mb;
        config.log_directory = tempdir.join("logs");

        Scheduler::new(
            Arc::new(ConfigStore::new(config)),
            Arc::new(JobControlCoordinator::new()),
            Arc::new(JobStateTracker::new(Arc::new(NullStateRepository))),
            Arc::new(LogManager::new(
                crate::config::LogTarget::Local,
                crate::config::LogFormat::Json,
                tempdir.join("logs"),
                None,
            )),
            Arc::new(NoopEncryptionHook),
            Arc::new(BusinessProcessGate::new(Box::new(NoProcessDetector))),
        )
    }

    #[test]
    fn full_backup_of_three_files_completes() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        std::fs::create_dir_all(source.join("sub")).unwrap();
        std::fs::write(source.join("a.txt"), vec![0u8; 100]).unwrap();
        std::fs::write(source.join("b.pdf"), vec![0u8; 500]).unwrap();
        std::fs::write(source.join("sub").join("c.bin"), vec![0u8; 1024]).unwrap();

        let target = dir.path().join("target");
        let scheduler = build_scheduler(dir.path(), 2, 10);
        {
            let mut config = scheduler.config.snapshot();
            config.priority_extensions = vec!["pdf".into()];
            scheduler.config.replace(config);
        }

        let catalog = vec![BackupJob::new("job-1", source, target.clone(), BackupKind::Full)];
        let result = scheduler.execute(&[1], &catalog);

        assert!(result.is_none(), "{result:?}");
        assert!(target.join("full").join("a.txt").exists());
        assert!(target.join("full").join("b.pdf").exists());
        assert!(target.join("full").join("sub").join("c.bin").exists());

        let state = scheduler.tracker.get("job-1").unwrap();
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.remaining_files, 0);
    }

    #[test]
    fn invalid_index_is_reported_but_valid_job_still_completes() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("a.txt"), b"a").unwrap();

        let scheduler = build_scheduler(dir.path(), 1, 10);
        let catalog = vec![BackupJob::new("job-1", source, dir.path().join("target"), BackupKind::Full)];

        let result = scheduler.execute(&[0, 99, 1], &catalog).unwrap();
        assert!(result.contains("Invalid job index: 0"));
        assert!(result.contains("Invalid job index: 99"));
        assert_eq!(scheduler.tracker.get("job-1").unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn source_missing_marks_job_error_without_aborting_others() {
        let dir = tempdir().unwrap();
        let good_source = dir.path().join("good");
        std::fs::create_dir_all(&good_source).unwrap();
        std::fs::write(good_source.join("a.txt"), b"a").unwrap();

        let scheduler = build_scheduler(dir.path(), 2, 10);
        let catalog = vec![
            BackupJob::new("missing-job", dir.path().join("does-not-exist"), dir.path().join("t1"), BackupKind::Full),
            BackupJob::new("good-job", good_source, dir.path().join("t2"), BackupKind::Full),
        ];

        let result = scheduler.execute(&[1, 2], &catalog);
        assert!(result.is_some());
        assert_eq!(scheduler.tracker.get("missing-job").unwrap().status, JobStatus::Error);
        assert_eq!(scheduler.tracker.get("good-job").unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn heavy_gate_serializes_concurrent_acquire() {
        let gate = Arc::new(SinglePermitGate::new());
        let coordinator = JobControlCoordinator::new();
        coordinator.register_job("job");
        let token = coordinator.get_token("job").unwrap();

        assert!(gate.acquire(&token));
        let gate2 = gate.clone();
        let token2 = token.clone();
        let handle = std::thread::spawn(move || gate2.acquire(&token2));

        std::thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        gate.release();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn heavy_gate_acquire_aborts_on_cancellation() {
        let gate = SinglePermitGate::new();
        let coordinator = JobControlCoordinator::new();
        coordinator.register_job("job");
        let token = coordinator.get_token("job").unwrap();

        gate.acquire(&token);
        coordinator.stop_job("job");
        assert!(!gate.acquire(&token));
    }
}
