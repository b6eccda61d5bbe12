//! Differential backup strategy: only files new or changed since the last
//! full backup, plus a record of files deleted from the source (§4.1).

use super::{extension_matches, Strategy};
use crate::error::{BackupError, Result};
use crate::queue::FileWorkItem;
use filetime::FileTime;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

pub struct DifferentialStrategy {
    source: PathBuf,
    target: PathBuf,
    priority_extensions: HashSet<String>,
    encryption_extensions: HashSet<String>,
    job_name: String,
    /// Set by `analyze` when no prior full backup exists: `prepare` then
    /// behaves like `FullStrategy::prepare` instead of the differential path.
    fell_back_to_full: AtomicBool,
}

impl DifferentialStrategy {
    pub fn new(
        source: PathBuf,
        target: PathBuf,
        priority_extensions: HashSet<String>,
        encryption_extensions: HashSet<String>,
        job_name: String,
    ) -> Self {
        Self {
            source,
            target,
            priority_extensions,
            encryption_extensions,
            job_name,
            fell_back_to_full: AtomicBool::new(false),
        }
    }

    fn full_root(&self) -> PathBuf {
        self.target.join("full")
    }

    fn differential_root(&self) -> PathBuf {
        self.target.join("differential")
    }

    fn analyze_as_full(&self) -> Result<Vec<FileWorkItem>> {
        let full_root = self.full_root();
        let mut items = Vec::new();
        for entry in WalkDir::new(&self.source).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.source)
                .expect("walkdir entry under source root");
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            items.push(FileWorkItem {
                source: entry.path().to_path_buf(),
                destination: full_root.join(relative),
                job_name: self.job_name.clone(),
                size,
                is_priority: extension_matches(entry.path(), &self.priority_extensions),
                requires_encryption: extension_matches(entry.path(), &self.encryption_extensions),
            });
        }
        Ok(items)
    }

    fn analyze_as_differential(&self) -> Result<Vec<FileWorkItem>> {
        let full_root = self.full_root();
        let differential_root = self.differential_root();
        let mut items = Vec::new();

        for entry in WalkDir::new(&self.source).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.source)
                .expect("walkdir entry under source root");
            let full_counterpart = full_root.join(relative);

            let include = match std::fs::metadata(&full_counterpart) {
                Err(_) => true,
                Ok(full_meta) => {
                    let source_meta = entry
                        .metadata()
                        .map_err(|e| BackupError::Io(e.into()))?;
                    FileTime::from_last_modification_time(&source_meta)
                        > FileTime::from_last_modification_time(&full_meta)
                }
            };

            if !include {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            items.push(FileWorkItem {
                source: entry.path().to_path_buf(),
                destination: differential_root.join(relative),
                job_name: self.job_name.clone(),
                size,
                is_priority: extension_matches(entry.path(), &self.priority_extensions),
                requires_encryption: extension_matches(entry.path(), &self.encryption_extensions),
            });
        }

        Ok(items)
    }

    /// Relative paths present under `<target>/full/` but no longer present
    /// under the source tree.
    fn deleted_since_full(&self) -> Vec<PathBuf> {
        let full_root = self.full_root();
        let mut deleted = Vec::new();
        for entry in WalkDir::new(&full_root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(&full_root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if relative == std::path::Path::new("full") {
                continue;
            }
            if !self.source.join(relative).exists() {
                deleted.push(relative.to_path_buf());
            }
        }
        deleted
    }
}

impl Strategy for DifferentialStrategy {
    fn analyze(&mut self) -> Result<Vec<FileWorkItem>> {
        if !self.source.exists() {
            return Err(BackupError::SourceMissing(self.source.clone()));
        }

        if !self.full_root().exists() {
            self.fell_back_to_full.store(true, Ordering::SeqCst);
            return self.analyze_as_full();
        }

        self.fell_back_to_full.store(false, Ordering::SeqCst);
        self.analyze_as_differential()
    }

    fn prepare(&self) -> Result<()> {
        if self.fell_back_to_full.load(Ordering::SeqCst) {
            let full_root = self.full_root();
            if full_root.exists() {
                std::fs::remove_dir_all(&full_root)?;
            }
            std::fs::create_dir_all(&full_root)?;
            std::fs::write(full_root.join("full"), b"")?;
            return Ok(());
        }

        let deleted = self.deleted_since_full();

        let differential_root = self.differential_root();
        if differential_root.exists() {
            std::fs::remove_dir_all(&differential_root)?;
        }
        std::fs::create_dir_all(&differential_root)?;

        if !deleted.is_empty() {
            let listing = deleted
                .iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect::<Vec<_>>()
                .join("\n");
            std::fs::write(differential_root.join("_deleted_files.txt"), listing)?;
        }

        Ok(())
    }
}
