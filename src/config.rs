//! Configuration structures and defaults for backvault
//!
//! Mirrors the teacher's `ConfigFile::load_with_fallback` shape: a project-local
//! TOML file, then a user-level one under the home directory, then built-in
//! defaults.

use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Where log records are shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Local,
    Server,
    Both,
}

impl Default for LogTarget {
    fn default() -> Self {
        Self::Local
    }
}

/// Local log record serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Xml,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Json
    }
}

/// The full configuration surface (§6 of the spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Maximum number of simultaneous worker threads, clamped to [1, 10].
    pub max_simultaneous_jobs: usize,

    /// Files larger than this (in MB) are treated as "heavy" and serialized
    /// through the single-permit heavy-file semaphore.
    pub size_threshold_mb: u64,

    /// File extensions (with or without leading dot, case-insensitive) that
    /// are dispatched ahead of everything else.
    pub priority_extensions: Vec<String>,

    /// File extensions that require the encryption hook to run post-copy.
    pub encryption_extensions: Vec<String>,

    /// Opaque key handed to the encryption hook; never interpreted by the core.
    pub encryption_key: Option<String>,

    /// Process names (case-insensitive) that trigger the business-process gate.
    pub watched_process_names: Vec<String>,

    /// Where log records go.
    pub log_target: LogTarget,

    /// Local log record format.
    pub log_format: LogFormat,

    /// Directory under which daily local log files are written.
    pub log_directory: PathBuf,

    /// URL for the remote log sink (only consulted if `log_target` is
    /// `Server` or `Both`).
    pub server_url: Option<String>,

    /// Path to the executable invoked by `ProcessEncryptionHook`, if any.
    pub encryption_tool_path: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_simultaneous_jobs: 3,
            size_threshold_mb: 10,
            priority_extensions: Vec::new(),
            encryption_extensions: Vec::new(),
            encryption_key: None,
            watched_process_names: Vec::new(),
            log_target: LogTarget::Local,
            log_format: LogFormat::Json,
            log_directory: PathBuf::from("./backvault-logs"),
            server_url: None,
            encryption_tool_path: None,
        }
    }
}

impl BackupConfig {
    /// Clamp `max_simultaneous_jobs` to [1, 10], matching the scheduler's
    /// read-once-under-lock contract.
    pub fn worker_count(&self) -> usize {
        self.max_simultaneous_jobs.clamp(1, 10)
    }

    /// Convert the configured MB threshold to bytes.
    pub fn size_threshold_bytes(&self) -> u64 {
        self.size_threshold_mb * 1024 * 1024
    }

    /// Normalize the priority-extension set to a lowercase, dot-free `HashSet`.
    pub fn priority_extension_set(&self) -> HashSet<String> {
        normalize_extensions(&self.priority_extensions)
    }

    /// Normalize the encryption-extension set the same way.
    pub fn encryption_extension_set(&self) -> HashSet<String> {
        normalize_extensions(&self.encryption_extensions)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BackupError::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| BackupError::Config(format!("failed to parse config file: {e}")))
    }

    /// Load with fallback priority: `./backvault.toml` -> `~/.backvault/backvault.toml`
    /// -> built-in defaults.
    pub fn load_with_fallback() -> Self {
        if let Ok(config) = Self::load(Path::new("backvault.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".backvault").join("backvault.toml");
            if let Ok(config) = Self::load(&user_config) {
                return config;
            }
        }

        Self::default()
    }
}

fn normalize_extensions(raw: &[String]) -> HashSet<String> {
    raw.iter()
        .map(|ext| ext.trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Thread-safe holder for the live configuration.
///
/// Readers call [`ConfigStore::snapshot`] under the lock and then operate on
/// an owned clone, per the spec's "configuration lock" shared-resource policy.
pub struct ConfigStore {
    inner: RwLock<BackupConfig>,
}

impl ConfigStore {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    pub fn snapshot(&self) -> BackupConfig {
        self.inner.read().expect("config lock poisoned").clone()
    }

    pub fn replace(&self, config: BackupConfig) {
        *self.inner.write().expect("config lock poisoned") = config;
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(BackupConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BackupConfig::default();
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.size_threshold_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn worker_count_is_clamped() {
        let mut config = BackupConfig::default();
        config.max_simultaneous_jobs = 0;
        assert_eq!(config.worker_count(), 1);
        config.max_simultaneous_jobs = 99;
        assert_eq!(config.worker_count(), 10);
    }

    #[test]
    fn extension_sets_are_normalized() {
        let mut config = BackupConfig::default();
        config.priority_extensions = vec![".DOCX".into(), "pdf".into(), "".into()];
        let set = config.priority_extension_set();
        assert!(set.contains("docx"));
        assert!(set.contains("pdf"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn config_store_round_trips() {
        let store = ConfigStore::default();
        let mut config = store.snapshot();
        config.max_simultaneous_jobs = 7;
        store.replace(config);
        assert_eq!(store.snapshot().max_simultaneous_jobs, 7);
    }
}
