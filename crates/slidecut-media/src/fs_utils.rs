//! Filesystem utilities for job directory trees.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Result of a tree removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The tree existed and is gone now.
    Removed { files: usize, dirs: usize },
    /// Nothing was there to remove.
    AlreadyGone,
}

impl RemoveOutcome {
    pub fn removed_anything(&self) -> bool {
        matches!(self, RemoveOutcome::Removed { .. })
    }
}

enum Step {
    Enter(PathBuf),
    Leave(PathBuf),
}

/// Recursively delete `root`, deepest entries first.
///
/// Walks with an explicit stack so depth is bounded only by memory. Symbolic
/// links are removed as links and never followed. Entries that vanish while
/// the walk runs are skipped, so a concurrent removal of the same tree is
/// not an error.
pub async fn remove_tree(root: impl AsRef<Path>) -> io::Result<RemoveOutcome> {
    let root = root.as_ref();

    let meta = match fs::symlink_metadata(root).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RemoveOutcome::AlreadyGone),
        Err(e) => return Err(e),
    };

    if !meta.is_dir() {
        return match fs::remove_file(root).await {
            Ok(()) => Ok(RemoveOutcome::Removed { files: 1, dirs: 0 }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RemoveOutcome::AlreadyGone),
            Err(e) => Err(e),
        };
    }

    let mut files = 0;
    let mut dirs = 0;
    let mut stack = vec![Step::Enter(root.to_path_buf())];

    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(dir) => {
                stack.push(Step::Leave(dir.clone()));

                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e),
                };

                while let Some(entry) = entries.next_entry().await? {
                    // DirEntry::file_type does not follow symlinks.
                    let file_type = match entry.file_type().await {
                        Ok(ft) => ft,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                        Err(e) => return Err(e),
                    };

                    if file_type.is_dir() {
                        stack.push(Step::Enter(entry.path()));
                    } else {
                        match fs::remove_file(entry.path()).await {
                            Ok(()) => files += 1,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
            Step::Leave(dir) => match fs::remove_dir(&dir).await {
                Ok(()) => dirs += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            },
        }
    }

    if files == 0 && dirs == 0 {
        Ok(RemoveOutcome::AlreadyGone)
    } else {
        Ok(RemoveOutcome::Removed { files, dirs })
    }
}

/// Remove a single file, treating a missing file as success.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> io::Result<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
