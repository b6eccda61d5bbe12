//! JobState and JobStateTracker (§3, §4.5 of the spec).

use crate::job::BackupKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Lifecycle status of a single job within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum JobStatus {
    Inactive,
    Active,
    Paused,
    Completed,
    Error,
}

/// The live, observable state of one job. Serializes with camelCase field
/// names (and `kind`/`status` renamed to `type`/`state`) to match the
/// persisted state file's documented wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub id: usize,
    pub name: String,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    #[serde(rename = "type")]
    pub kind: BackupKind,
    #[serde(rename = "state")]
    pub status: JobStatus,
    pub total_files: u64,
    pub total_size: u64,
    pub remaining_files: u64,
    pub remaining_size: u64,
    pub current_source: Option<PathBuf>,
    pub current_target: Option<PathBuf>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub last_action_timestamp: Option<DateTime<Utc>>,
}

impl JobState {
    /// A freshly pre-registered job: Inactive, zeroed counters.
    pub fn new_inactive(
        id: usize,
        name: String,
        source_path: PathBuf,
        target_path: PathBuf,
        kind: BackupKind,
    ) -> Self {
        Self {
            id,
            name,
            source_path,
            target_path,
            kind,
            status: JobStatus::Inactive,
            total_files: 0,
            total_size: 0,
            remaining_files: 0,
            remaining_size: 0,
            current_source: None,
            current_target: None,
            start_timestamp: None,
            last_action_timestamp: None,
        }
    }

    /// Decrement remaining counters for a just-processed file, floored at 0.
    pub fn record_file_processed(&mut self, size: u64, source: PathBuf, target: PathBuf) {
        self.remaining_files = self.remaining_files.saturating_sub(1);
        self.remaining_size = self.remaining_size.saturating_sub(size);
        self.current_source = Some(source);
        self.current_target = Some(target);
    }
}

type ChangeObserver = Box<dyn Fn(&JobState) + Send + Sync>;

/// Write-through sink for state snapshots. Implementers may see interleaved
/// pre/post-update content from concurrent readers, but never torn bytes
/// within a single snapshot (see `persistence::FileStateRepository`).
pub trait StateRepository: Send + Sync {
    fn persist_snapshot(&self, states: &[JobState]);
}

/// A repository that discards snapshots; used by tests and as a safe default.
pub struct NullStateRepository;

impl StateRepository for NullStateRepository {
    fn persist_snapshot(&self, _states: &[JobState]) {}
}

/// Thread-safe concurrent map from job name to live state, guarded by a
/// single tracker-wide mutex (§4.5: mutator + timestamp + notify + persist
/// must not interleave across concurrent callers).
pub struct JobStateTracker {
    states: Mutex<HashMap<String, JobState>>,
    observer: Mutex<Option<ChangeObserver>>,
    repository: Arc<dyn StateRepository>,
}

impl JobStateTracker {
    pub fn new(repository: Arc<dyn StateRepository>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            observer: Mutex::new(None),
            repository,
        }
    }

    /// Register a single observer for state-change events. Observers may be
    /// invoked from any worker thread and must be thread-safe.
    pub fn subscribe(&self, observer: ChangeObserver) {
        *self.observer.lock().expect("observer lock poisoned") = Some(observer);
    }

    pub fn register_job(&self, name: &str, initial_state: JobState) {
        let mut states = self.states.lock().expect("state lock poisoned");
        states.insert(name.to_string(), initial_state);
        self.emit_and_persist(&states, name);
    }

    /// Atomically apply `mutator` under the tracker-wide lock, stamp
    /// `lastActionTimestamp`, emit a change event, and persist a snapshot.
    pub fn update_job_state(&self, name: &str, mutator: impl FnOnce(&mut JobState)) {
        let mut states = self.states.lock().expect("state lock poisoned");
        if let Some(state) = states.get_mut(name) {
            mutator(state);
            state.last_action_timestamp = Some(Utc::now());
        }
        self.emit_and_persist(&states, name);
    }

    /// Bulk-transition every state currently in `from` into `to`.
    pub fn update_all_job_states(&self, from: JobStatus, to: JobStatus) {
        let mut states = self.states.lock().expect("state lock poisoned");
        let mut changed = Vec::new();
        for (name, state) in states.iter_mut() {
            if state.status == from {
                state.status = to;
                state.last_action_timestamp = Some(Utc::now());
                changed.push(name.clone());
            }
        }
        for name in &changed {
            self.emit_and_persist(&states, name);
        }
    }

    /// Transition Active/Paused to Completed (if no files remain) or
    /// Inactive otherwise. No-op for jobs already in a terminal status.
    pub fn finalize_job_state(&self, name: &str) {
        let mut states = self.states.lock().expect("state lock poisoned");
        if let Some(state) = states.get_mut(name) {
            if matches!(state.status, JobStatus::Active | JobStatus::Paused) {
                state.status = if state.remaining_files == 0 {
                    JobStatus::Completed
                } else {
                    JobStatus::Inactive
                };
                state.last_action_timestamp = Some(Utc::now());
            }
        }
        self.emit_and_persist(&states, name);
    }

    pub fn clear_states(&self) {
        let mut states = self.states.lock().expect("state lock poisoned");
        states.clear();
    }

    pub fn get(&self, name: &str) -> Option<JobState> {
        self.states
            .lock()
            .expect("state lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn snapshot_all(&self) -> Vec<JobState> {
        self.states
            .lock()
            .expect("state lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Must be called while holding the `states` lock so the observer and
    /// persistence both see a fully-applied mutation.
    fn emit_and_persist(&self, states: &HashMap<String, JobState>, name: &str) {
        if let Some(state) = states.get(name) {
            if let Some(observer) = self.observer.lock().expect("observer lock poisoned").as_ref() {
                observer(state);
            }
        }
        let snapshot: Vec<JobState> = states.values().cloned().collect();
        self.repository.persist_snapshot(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state(name: &str) -> JobState {
        JobState::new_inactive(1, name.into(), PathBuf::from("/src"), PathBuf::from("/dst"), BackupKind::Full)
    }

    #[test]
    fn register_and_get() {
        let tracker = JobStateTracker::new(Arc::new(NullStateRepository));
        tracker.register_job("job-a", state("job-a"));
        let got = tracker.get("job-a").unwrap();
        assert_eq!(got.status, JobStatus::Inactive);
    }

    #[test]
    fn update_stamps_timestamp_and_notifies() {
        let tracker = JobStateTracker::new(Arc::new(NullStateRepository));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        tracker.subscribe(Box::new(move |_s| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));

        tracker.register_job("job-a", state("job-a"));
        tracker.update_job_state("job-a", |s| s.status = JobStatus::Active);

        let got = tracker.get("job-a").unwrap();
        assert_eq!(got.status, JobStatus::Active);
        assert!(got.last_action_timestamp.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn finalize_completes_when_no_remaining_files() {
        let tracker = JobStateTracker::new(Arc::new(NullStateRepository));
        tracker.register_job("job-a", state("job-a"));
        tracker.update_job_state("job-a", |s| {
            s.status = JobStatus::Active;
            s.total_files = 2;
            s.remaining_files = 0;
        });
        tracker.finalize_job_state("job-a");
        assert_eq!(tracker.get("job-a").unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn finalize_goes_inactive_when_files_remain() {
        let tracker = JobStateTracker::new(Arc::new(NullStateRepository));
        tracker.register_job("job-a", state("job-a"));
        tracker.update_job_state("job-a", |s| {
            s.status = JobStatus::Active;
            s.total_files = 2;
            s.remaining_files = 1;
        });
        tracker.finalize_job_state("job-a");
        assert_eq!(tracker.get("job-a").unwrap().status, JobStatus::Inactive);
    }

    #[test]
    fn update_all_job_states_bulk_transitions() {
        let tracker = JobStateTracker::new(Arc::new(NullStateRepository));
        tracker.register_job("a", state("a"));
        tracker.register_job("b", state("b"));
        tracker.update_job_state("a", |s| s.status = JobStatus::Active);
        tracker.update_job_state("b", |s| s.status = JobStatus::Paused);

        tracker.update_all_job_states(JobStatus::Active, JobStatus::Inactive);
        assert_eq!(tracker.get("a").unwrap().status, JobStatus::Inactive);
        assert_eq!(tracker.get("b").unwrap().status, JobStatus::Paused);
    }

    #[test]
    fn clear_states_empties_map() {
        let tracker = JobStateTracker::new(Arc::new(NullStateRepository));
        tracker.register_job("a", state("a"));
        tracker.clear_states();
        assert!(tracker.get("a").is_none());
    }
}
