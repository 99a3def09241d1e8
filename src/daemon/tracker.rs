use anyhow::{Context, Result};
use log::{debug, trace};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const SOURCE_EXTENSION: &str = "txt";

/// A source file whose modification time differs from the last acknowledged one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Watches one directory for `<prefix>*.txt` files and remembers the last
/// modification time it has seen for each of them.
///
/// The timestamp map is owned by the tracker; entries are never pruned, so a
/// deleted file simply stops being reported.
#[derive(Debug)]
pub struct ChangeTracker {
    dir: PathBuf,
    prefix: String,
    seen: HashMap<PathBuf, SystemTime>,
}

impl ChangeTracker {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            seen: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tracked_len(&self) -> usize {
        self.seen.len()
    }

    /// Reports new or modified files and records their timestamps right away.
    /// A file that later fails to process is not reported again until it
    /// changes once more; see [`pending_changes`](Self::pending_changes).
    pub fn detect_changed(&mut self) -> Result<Vec<PathBuf>> {
        let changes = self.pending_changes()?;
        Ok(changes
            .into_iter()
            .map(|change| {
                self.acknowledge(&change);
                change.path
            })
            .collect())
    }

    /// Same detection rule as [`detect_changed`](Self::detect_changed) but
    /// leaves the stored timestamps alone until [`acknowledge`](Self::acknowledge).
    pub fn pending_changes(&self) -> Result<Vec<FileChange>> {
        let dir = fs::canonicalize(&self.dir)
            .with_context(|| format!("Failed to resolve source directory {}", self.dir.display()))?;
        let entries = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read source directory {}", dir.display()))?;

        let mut changes = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if !self.matches(&path) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let modified = match meta.modified() {
                Ok(t) => t,
                Err(e) => {
                    debug!("No modification time for {}: {}", path.display(), e);
                    continue;
                }
            };

            // Any difference counts, including a clock that went backwards.
            if self.seen.get(&path) != Some(&modified) {
                trace!("Change detected: {}", path.display());
                changes.push(FileChange { path, modified });
            }
        }
        Ok(changes)
    }

    pub fn acknowledge(&mut self, change: &FileChange) {
        self.seen.insert(change.path.clone(), change.modified);
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.starts_with(&self.prefix)
            && path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION)
    }
}
