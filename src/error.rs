//! Error types for backvault

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors that can surface from a fallible, propagating operation.
///
/// Per-file copy and encryption failures are *not* represented here: they are
/// captured as data (a failing `LogRecord`, a job transitioning to `Error`)
/// rather than as a propagated `Err`, matching the propagation policy of the
/// scheduler (a single bad file never aborts a run).
#[derive(Error, Debug)]
pub enum BackupError {
    /// Source directory does not exist at analysis time.
    #[error("source not found: {0}")]
    SourceMissing(PathBuf),

    /// A requested job id did not resolve against the job store.
    #[error("Invalid job index: {0}")]
    InvalidJobIndex(usize),

    /// I/O error during analysis, preparation, or persistence.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The job store could not be read or written.
    #[error("job store error: {0}")]
    JobStore(String),

    /// The state repository could not persist a snapshot.
    #[error("state persistence error: {0}")]
    Persistence(String),
}
