//! Ambient, file-backed defaults for the two external collaborators the
//! core depends on but does not itself implement: the job store and the
//! state repository (§6, §9).

use crate::error::{BackupError, Result};
use crate::job::BackupJob;
use crate::state::{JobState, StateRepository};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CRUD over named jobs. The default implementation is TOML-backed; callers
/// needing a different persistence medium can swap this trait out.
pub trait JobStore: Send + Sync {
    fn list(&self) -> Result<Vec<BackupJob>>;
    fn add(&self, job: BackupJob) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JobFile {
    #[serde(default)]
    jobs: Vec<BackupJob>,
}

/// TOML file listing named jobs, loaded fresh on every call and rewritten
/// in full on every mutation (matching the teacher's `orbit.toml` split:
/// TOML for the human-maintained file, JSON for machine-written snapshots).
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> Result<JobFile> {
        if !self.path.exists() {
            return Ok(JobFile::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| BackupError::JobStore(format!("failed to read job store: {e}")))?;
        toml::from_str(&content).map_err(|e| BackupError::JobStore(format!("failed to parse job store: {e}")))
    }

    fn write(&self, file: &JobFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BackupError::JobStore(format!("failed to create job store directory: {e}")))?;
            }
        }
        let content =
            toml::to_string_pretty(file).map_err(|e| BackupError::JobStore(format!("failed to serialize job store: {e}")))?;
        std::fs::write(&self.path, content).map_err(|e| BackupError::JobStore(format!("failed to write job store: {e}")))
    }
}

impl JobStore for FileJobStore {
    fn list(&self) -> Result<Vec<BackupJob>> {
        Ok(self.read()?.jobs)
    }

    fn add(&self, job: BackupJob) -> Result<()> {
        let mut file = self.read()?;
        file.jobs.retain(|existing| existing.name != job.name);
        file.jobs.push(job);
        self.write(&file)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut file = self.read()?;
        file.jobs.retain(|existing| existing.name != name);
        self.write(&file)
    }
}

/// JSON snapshot sink for `JobState`. Writes to a temp file in the same
/// directory and renames over the target so a concurrent reader never sees
/// a torn write, only a wholly-pre- or wholly-post-update file.
pub struct FileStateRepository {
    path: PathBuf,
}

impl FileStateRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StateRepository for FileStateRepository {
    fn persist_snapshot(&self, states: &[JobState]) {
        let result = (|| -> Result<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(BackupError::Io)?;
                }
            }
            let json = serde_json::to_string_pretty(states)
                .map_err(|e| BackupError::Persistence(format!("failed to serialize state snapshot: {e}")))?;

            let temp_path = temp_path_for(&self.path);
            std::fs::write(&temp_path, json).map_err(BackupError::Io)?;
            std::fs::rename(&temp_path, &self.path).map_err(BackupError::Io)?;
            Ok(())
        })();

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist state snapshot");
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    path.with_file_name(format!("{file_name}.tmp"))
}
