//! Iterative, lazily evaluated directory walker.

use std::collections::VecDeque;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use archivekeeper_core::{ArchivePath, Mtime, ReadFailure, ScanError};

use crate::filter::EntryFilter;
use crate::inode::{DirKey, InodeTracker};

/// A regular file found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path relative to the root, `/`-separated.
    pub path: ArchivePath,
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// Size from directory listing metadata.
    pub size: u64,
    /// Modification time from directory listing metadata.
    pub mtime: Mtime,
}

/// Lazily enumerates every regular file under a root.
///
/// Pending directories live on an explicit stack instead of the call stack,
/// so deep trees cannot overflow it. Each directory's entries are sorted by
/// name; its files are yielded before its subdirectories are entered, which
/// makes the order reproducible. Unreadable entries are yielded as
/// [`ReadFailure`]s and the walk carries on.
pub struct Walker {
    root: PathBuf,
    filter: EntryFilter,
    follow_symlinks: bool,
    pending: Vec<PathBuf>,
    ready: VecDeque<Result<WalkEntry, ReadFailure>>,
    dirs: InodeTracker,
    dirs_visited: u64,
}

impl Walker {
    /// Create a walker over `root`, which must be an existing directory.
    pub fn new(
        root: impl Into<PathBuf>,
        filter: EntryFilter,
        follow_symlinks: bool,
    ) -> Result<Self, ScanError> {
        let root = root.into();
        let metadata = fs::metadata(&root).map_err(|e| ScanError::io(&root, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }

        let dirs = InodeTracker::new();
        if let Some(key) = DirKey::from_metadata(&metadata) {
            dirs.track(key);
        }

        Ok(Self {
            pending: vec![root.clone()],
            root,
            filter,
            follow_symlinks,
            ready: VecDeque::new(),
            dirs,
            dirs_visited: 0,
        })
    }

    /// Root being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of directories listed so far.
    pub fn dirs_visited(&self) -> u64 {
        self.dirs_visited
    }

    /// List one directory, queueing its files and stacking its subdirectories.
    fn expand(&mut self, dir: PathBuf) {
        self.dirs_visited += 1;
        let dir_rel = relative_path(&self.root, &dir);

        let read_dir = match fs::read_dir(&dir) {
            Ok(r) => r,
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "cannot list directory");
                self.ready.push_back(Err(ReadFailure::directory(dir_rel, &err)));
                return;
            }
        };

        let mut children = Vec::new();
        for entry in read_dir {
            match entry {
                Ok(e) => children.push(e),
                Err(err) => {
                    // A partial listing must not make unseen files look missing.
                    self.ready.push_back(Err(ReadFailure::directory(dir_rel.clone(), &err)));
                    break;
                }
            }
        }
        children.sort_by_key(|e| e.file_name());

        let mut subdirs = Vec::new();
        for entry in children {
            let name = entry.file_name().to_string_lossy().to_string();
            let abs_path = entry.path();
            let rel = relative_path(&self.root, &abs_path);

            if self.filter.is_excluded(&rel, &name, &abs_path) {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(err) => {
                    self.ready.push_back(Err(ReadFailure::from_io(rel, &err)));
                    continue;
                }
            };

            let metadata = if file_type.is_symlink() {
                if !self.follow_symlinks {
                    debug!(path = %abs_path.display(), "skipping symlink");
                    continue;
                }
                match fs::metadata(&abs_path) {
                    Ok(m) => m,
                    Err(err) => {
                        debug!(path = %abs_path.display(), error = %err, "skipping broken symlink");
                        continue;
                    }
                }
            } else {
                match entry.metadata() {
                    Ok(m) => m,
                    Err(err) => {
                        self.ready.push_back(Err(ReadFailure::from_io(rel, &err)));
                        continue;
                    }
                }
            };

            if metadata.is_dir() {
                if self.follow_symlinks {
                    if let Some(key) = DirKey::from_metadata(&metadata) {
                        if !self.dirs.track(key) {
                            debug!(
                                path = %abs_path.display(),
                                "directory already visited, skipping loop"
                            );
                            continue;
                        }
                    }
                }
                subdirs.push(abs_path);
            } else if metadata.is_file() {
                let mtime = match metadata.modified() {
                    Ok(t) => Mtime::from_system_time(t),
                    Err(err) => {
                        self.ready.push_back(Err(ReadFailure::from_io(rel, &err)));
                        continue;
                    }
                };
                self.ready.push_back(Ok(WalkEntry {
                    path: rel,
                    abs_path,
                    size: metadata.len(),
                    mtime,
                }));
            }
        }

        // Reverse so the lexicographically first subdirectory is popped first.
        self.pending.extend(subdirs.into_iter().rev());
    }
}

impl Iterator for Walker {
    type Item = Result<WalkEntry, ReadFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            let dir = self.pending.pop()?;
            self.expand(dir);
        }
    }
}

/// Normalise `path` to a `/`-separated string relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> ArchivePath {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut out = ArchivePath::default();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}
