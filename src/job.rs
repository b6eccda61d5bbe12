//! The `BackupJob` input entity (§3 of the spec).
//!
//! `BackupJob` is read-only to the core: it is produced by the external job
//! store and consumed by the scheduler and by [`crate::strategy`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which copy strategy a job uses. Serializes as `"Complete"`/`"Differential"`
/// on the wire (the persisted state file's historical field names), even
/// though the in-code variant and `Display` impl say "Full".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    #[serde(rename = "Complete")]
    Full,
    Differential,
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupKind::Full => write!(f, "Full"),
            BackupKind::Differential => write!(f, "Differential"),
        }
    }
}

/// A named backup job as defined externally (e.g. in the job store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupJob {
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub kind: BackupKind,
}

impl BackupJob {
    pub fn new(name: impl Into<String>, source: PathBuf, target: PathBuf, kind: BackupKind) -> Self {
        Self {
            name: name.into(),
            source,
            target,
            kind,
        }
    }
}
