//! Polling change detection over a directory subtree.
//!
//! The differ keeps a path → mtime snapshot. Each `scan()` walks the tree again
//! and reports what was removed, added or modified since the previous scan.
//! VCS metadata (the `.git` directory and everything below it) is never
//! visited.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Changes observed by one scan: removals first, then additions and
/// modifications in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<PathChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PathChange] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|c| c.path.as_path())
    }

    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(move |c| c.kind == kind)
            .map(|c| c.path.as_path())
    }

    fn push(&mut self, path: PathBuf, kind: ChangeKind) {
        self.entries.push(PathChange { path, kind });
    }
}

impl FromIterator<PathChange> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = PathChange>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug)]
pub struct ScanError {
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to scan {}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// True if `path` is the VCS metadata directory or lies below it.
pub fn is_vcs_metadata(path: &Path, vcs_dir: &str) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => name == vcs_dir,
        _ => false,
    })
}

pub struct SnapshotDiffer {
    root: PathBuf,
    vcs_dir: String,
    snapshot: BTreeMap<PathBuf, SystemTime>,
}

impl SnapshotDiffer {
    /// Build the differ and record the initial snapshot. A missing root gives
    /// an empty snapshot.
    pub fn new(root: impl Into<PathBuf>, vcs_dir: impl Into<String>) -> Result<Self, ScanError> {
        let mut differ = Self {
            root: root.into(),
            vcs_dir: vcs_dir.into(),
            snapshot: BTreeMap::new(),
        };
        differ.snapshot = differ.walk()?.into_iter().collect();
        tracing::debug!(
            root = %differ.root.display(),
            entries = differ.snapshot.len(),
            "initial snapshot"
        );
        Ok(differ)
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.snapshot.contains_key(path)
    }

    /// Walk the tree again and diff against the stored snapshot. On error the
    /// snapshot is left as it was.
    pub fn scan(&mut self) -> Result<ChangeSet, ScanError> {
        let current = self.walk()?;
        let seen: HashSet<&PathBuf> = current.iter().map(|(p, _)| p).collect();

        let mut changes = ChangeSet::default();
        let removed: Vec<PathBuf> = self
            .snapshot
            .keys()
            .filter(|p| !seen.contains(p))
            .cloned()
            .collect();
        for path in removed {
            self.snapshot.remove(&path);
            changes.push(path, ChangeKind::Removed);
        }

        for (path, mtime) in current {
            match self.snapshot.insert(path.clone(), mtime) {
                None => changes.push(path, ChangeKind::Added),
                Some(prev) if prev != mtime => changes.push(path, ChangeKind::Modified),
                Some(_) => {}
            }
        }

        if !changes.is_empty() {
            tracing::debug!(changes = changes.len(), "scan detected changes");
        }
        Ok(changes)
    }

    fn walk(&self) -> Result<Vec<(PathBuf, SystemTime)>, ScanError> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        let root = self.root.as_path();
        let vcs_dir = self.vcs_dir.as_str();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let rel = e.path().strip_prefix(root).unwrap_or(e.path());
                !is_vcs_metadata(rel, vcs_dir)
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if is_vanished(&e) => continue,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
                    return Err(ScanError { path, source });
                }
            };
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) if is_vanished(&e) => continue,
                Err(e) => {
                    let path = entry.path().to_path_buf();
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("metadata unavailable"));
                    return Err(ScanError { path, source });
                }
            };
            let mtime = meta.modified().map_err(|source| ScanError {
                path: entry.path().to_path_buf(),
                source,
            })?;
            out.push((entry.into_path(), mtime));
        }
        Ok(out)
    }
}

fn is_vanished(e: &walkdir::Error) -> bool {
    e.io_error()
        .is_some_and(|io| io.kind() == io::ErrorKind::NotFound)
}
