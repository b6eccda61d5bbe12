//! Full backup strategy: copy everything under `<target>/full/`.

use super::{extension_matches, Strategy};
use crate::error::{BackupError, Result};
use crate::queue::FileWorkItem;
use std::collections::HashSet;
use std::path::PathBuf;
use walkdir::WalkDir;

pub struct FullStrategy {
    source: PathBuf,
    target: PathBuf,
    priority_extensions: HashSet<String>,
    encryption_extensions: HashSet<String>,
    job_name: String,
}

impl FullStrategy {
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
        }
    }

    pub(crate) fn full_root(&self) -> PathBuf {
        self.target.join("full")
    }
}

impl Strategy for FullStrategy {
    fn analyze(&mut self) -> Result<Vec<FileWorkItem>> {
        if !self.source.exists() {
            return Err(BackupError::SourceMissing(self.source.clone()));
        }

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
            let destination = full_root.join(relative);
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

            items.push(FileWorkItem {
                source: entry.path().to_path_buf(),
                destination,
                job_name: self.job_name.clone(),
                size,
                is_priority: extension_matches(entry.path(), &self.priority_extensions),
                requires_encryption: extension_matches(entry.path(), &self.encryption_extensions),
            });
        }

        Ok(items)
    }

    fn prepare(&self) -> Result<()> {
        let full_root = self.full_root();
        if full_root.exists() {
            std::fs::remove_dir_all(&full_root)?;
        }
        std::fs::create_dir_all(&full_root)?;
        std::fs::write(full_root.join("full"), b"")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn analyze_enumerates_every_file_recursively() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        let target = dir.path().join("target");
        std::fs::create_dir_all(source.join("sub")).unwrap();
        std::fs::write(source.join("a.txt"), b"a").unwrap();
        std::fs::write(source.join("sub").join("b.bin"), b"bb").unwrap();

        let mut strategy = FullStrategy::new(
            source.clone(),
            target.clone(),
            HashSet::new(),
            HashSet::new(),
            "job".into(),
        );
        let mut items = strategy.analyze().unwrap();
        items.sort_by(|a, b| a.source.cmp(&b.source));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].destination, target.join("full").join("a.txt"));
        assert_eq!(items[1].destination, target.join("full").join("sub").join("b.bin"));
    }

    #[test]
    fn priority_and_encryption_flags_follow_extension() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("report.PDF"), b"x").unwrap();

        let mut priority = HashSet::new();
        priority.insert("pdf".to_string());
        let mut encryption = HashSet::new();
        encryption.insert("pdf".to_string());

        let mut strategy = FullStrategy::new(
            source,
            dir.path().join("target"),
            priority,
            encryption,
            "job".into(),
        );
        let items = strategy.analyze().unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_priority);
        assert!(items[0].requires_encryption);
    }

    #[test]
    fn analyze_fails_when_source_missing() {
        let dir = tempdir().unwrap();
        let mut strategy = FullStrategy::new(
            dir.path().join("missing"),
            dir.path().join("target"),
            HashSet::new(),
            HashSet::new(),
            "job".into(),
        );
        assert!(matches!(strategy.analyze(), Err(BackupError::SourceMissing(_))));
    }

    #[test]
    fn prepare_clears_and_recreates_full_with_marker() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target");
        let full_root = target.join("full");
        std::fs::create_dir_all(&full_root).unwrap();
        std::fs::write(full_root.join("stale.txt"), b"old").unwrap();

        let strategy = FullStrategy::new(
            dir.path().join("source"),
            target.clone(),
            HashSet::new(),
            HashSet::new(),
            "job".into(),
        );
        strategy.prepare().unwrap();

        assert!(!full_root.join("stale.txt").exists());
        assert!(full_root.join("full").exists());
    }

    #[test]
    fn prepare_is_idempotent() {
        let dir = tempdir().unwrap();
        let strategy = FullStrategy::new(
            dir.path().join("source"),
            dir.path().join("target"),
            HashSet::new(),
            HashSet::new(),
            "job".into(),
        );
        strategy.prepare().unwrap();
        strategy.prepare().unwrap();
        assert!(strategy.full_root().join("full").exists());
    }
}
