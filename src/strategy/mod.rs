//! Strategy: per-job analysis and destination preparation (§4.1).

mod differential;
mod full;

pub use differential::DifferentialStrategy;
pub use full::FullStrategy;

use crate::error::Result;
use crate::queue::FileWorkItem;
use std::collections::HashSet;
use std::path::Path;

/// Two operations: a read-only traversal that returns the work list, and a
/// single destructive preparation step run once before copies begin.
pub trait Strategy {
    /// Read-only traversal. No disk writes. Must fail with
    /// `BackupError::SourceMissing` if the source directory does not exist.
    fn analyze(&mut self) -> Result<Vec<FileWorkItem>>;

    /// The single destructive preparation step; idempotent across re-runs.
    fn prepare(&self) -> Result<()>;
}

/// Extension-set lookup shared by both strategy variants: case-insensitive,
/// dot-optional match against a normalized set (see `config::BackupConfig`).
pub(crate) fn extension_matches(path: &Path, set: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| set.contains(&ext.to_lowercase()))
        .unwrap_or(false)
}

/// Construct the right strategy variant for a job's kind.
pub fn build(
    kind: crate::job::BackupKind,
    source: std::path::PathBuf,
    target: std::path::PathBuf,
    priority_extensions: HashSet<String>,
    encryption_extensions: HashSet<String>,
    job_name: String,
) -> Box<dyn Strategy> {
    match kind {
        crate::job::BackupKind::Full => Box::new(FullStrategy::new(
            source,
            target,
            priority_extensions,
            encryption_extensions,
            job_name,
        )),
        crate::job::BackupKind::Differential => Box::new(DifferentialStrategy::new(
            source,
            target,
            priority_extensions,
            encryption_extensions,
            job_name,
        )),
    }
}
