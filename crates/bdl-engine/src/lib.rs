// SPDX-License-Identifier: MIT OR Apache-2.0
//! bdl-engine
//!
//! The uniform mutation pipeline. Every write goes through the same sequence:
//! apply the new byte image atomically, commit the staged paths with an
//! operation-labelled message, then append one journal entry — and every
//! failure boundary unwinds whatever already happened so the caller observes
//! either the full post-state or the untouched pre-state.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_git::{CommitStore, FileImage, HeadState};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// How to unwind the filesystem when a commit or journal write fails.
#[derive(Debug, Clone)]
pub enum Rollback {
    /// Nothing to unwind (bootstrap-style batched writes keep idempotent
    /// state on disk).
    None,
    /// Unlink a file this mutation created.
    RemoveCreated {
        /// Absolute path of the created file.
        target: PathBuf,
        /// Tenant-relative path for re-staging.
        relative: PathBuf,
    },
    /// Restore the pre-image of a modified or deleted file.
    RestoreFile {
        /// Absolute path of the target.
        target: PathBuf,
        /// Tenant-relative path for re-staging.
        relative: PathBuf,
        /// Pre-mutation content.
        original: FileImage,
    },
    /// Unlink a batch of created files and peel their scaffold root.
    RemoveCreatedTree {
        /// Absolute paths of every created file.
        files: Vec<PathBuf>,
        /// Scaffold root directory to remove once emptied; `None` when the
        /// root predated the mutation and must survive.
        root: Option<PathBuf>,
        /// Tenant-relative paths for re-staging.
        relatives: Vec<PathBuf>,
    },
    /// Run several rollbacks in order (multi-file mutations).
    Many(Vec<Rollback>),
}

/// An in-flight mutation: commit store handle plus the captured HEAD state
/// needed to unwind a commit whose journaling fails.
#[derive(Debug)]
pub struct Mutation {
    root: PathBuf,
    store: CommitStore,
    head: HeadState,
}

impl Mutation {
    /// Ensure the commit store exists and capture HEAD. Call this before the
    /// filesystem is touched (pipeline step 6).
    pub fn begin(library_root: &Path) -> ToolResult<Self> {
        let store = CommitStore::open(library_root)?;
        let head = store.capture_head_state();
        Ok(Self {
            root: library_root.to_path_buf(),
            store,
            head,
        })
    }

    /// The commit store backing this mutation.
    #[must_use]
    pub fn store(&self) -> &CommitStore {
        &self.store
    }

    /// Commit the staged paths and journal the mutation (pipeline steps 8-9).
    ///
    /// On commit failure the rollback runs and `GIT_ERROR` is returned; on
    /// journal failure the rollback runs, HEAD is restored, and `LOG_ERROR`
    /// is returned. Success returns the new 40-hex commit id.
    pub fn finish(
        self,
        staged: &[PathBuf],
        operation: &str,
        target: &Path,
        summary: &str,
        rollback: Rollback,
    ) -> ToolResult<String> {
        let target_posix = posix(target);
        debug!(target: "bdl.engine", operation, path = %target_posix, "committing mutation");

        let commit_sha = match self.store.commit(staged, operation, target) {
            Ok(sha) => sha,
            Err(err) => {
                warn!(target: "bdl.engine", operation, error = %err, "commit failed, rolling back");
                self.run_rollback(&rollback);
                self.store.restore_head(&self.head);
                return Err(ToolError::new(
                    ErrorCode::GitError,
                    "Git commit failed; mutation rolled back.",
                )
                .with_detail("path", target_posix)
                .with_detail("operation", operation));
            }
        };

        let entry = bdl_journal::build_entry(operation, target, summary, &commit_sha);
        if let Err(err) = bdl_journal::append_entry(&self.root, &entry) {
            warn!(target: "bdl.engine", operation, error = %err, "journal append failed, rolling back");
            self.run_rollback(&rollback);
            self.store.restore_head(&self.head);
            return Err(ToolError::new(
                ErrorCode::LogError,
                "Activity log write failed; mutation rolled back.",
            )
            .with_detail("path", target_posix)
            .with_detail("operation", operation));
        }

        Ok(commit_sha)
    }

    fn run_rollback(&self, rollback: &Rollback) {
        match rollback {
            Rollback::None => {}
            Rollback::RemoveCreated { target, relative } => {
                self.store.rollback_created_file(target, relative);
            }
            Rollback::RestoreFile {
                target,
                relative,
                original,
            } => {
                self.store.rollback_modified_file(target, relative, original);
            }
            Rollback::RemoveCreatedTree {
                files,
                root,
                relatives,
            } => {
                self.store
                    .rollback_created_tree(files, root.as_deref(), relatives);
            }
            Rollback::Many(rollbacks) => {
                for rollback in rollbacks {
                    self.run_rollback(rollback);
                }
            }
        }
    }
}

/// Read a file that is about to be mutated, failing with `FILE_READ_FAILED`.
pub fn read_pre_image(target: &Path, raw_path: &str) -> ToolResult<Vec<u8>> {
    std::fs::read(target).map_err(|_| {
        ToolError::new(ErrorCode::FileReadFailed, "File could not be read.")
            .with_detail("path", raw_path)
    })
}

/// Decode mutation input as UTF-8, failing with `INVALID_ENCODING`.
pub fn decode_utf8(bytes: Vec<u8>, raw_path: &str) -> ToolResult<String> {
    String::from_utf8(bytes).map_err(|_| {
        ToolError::new(ErrorCode::InvalidEncoding, "Markdown file must be UTF-8 encoded.")
            .with_detail("path", raw_path)
    })
}

// ---------------------------------------------------------------------------
// Path enumeration (move / copy / delete support)
// ---------------------------------------------------------------------------

/// A source-to-destination file mapping in a move/copy preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathMapping {
    /// Tenant-relative source path.
    #[serde(rename = "from")]
    pub from_path: String,
    /// Tenant-relative destination path.
    #[serde(rename = "to")]
    pub to_path: String,
}

/// Enumerate the tenant-relative file paths under `target` (or the single
/// file itself), excluding anything inside the commit store's `.git` subtree.
pub fn collect_file_paths(library_root: &Path, target: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if target.is_file() {
        if let Ok(relative) = target.strip_prefix(library_root) {
            if !in_git_subtree(relative) {
                paths.push(relative.to_path_buf());
            }
        }
        return paths;
    }
    if !target.exists() {
        return paths;
    }

    for entry in WalkDir::new(target)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .flatten()
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(library_root) else {
            continue;
        };
        if in_git_subtree(relative) {
            continue;
        }
        paths.push(relative.to_path_buf());
    }
    paths
}

fn in_git_subtree(relative: &Path) -> bool {
    relative.components().any(|c| c.as_os_str() == ".git")
}

/// Map every file under `source` to its location under `destination`,
/// reporting destinations that already exist as conflicts.
pub fn build_path_mappings(
    library_root: &Path,
    source: &Path,
    destination: &Path,
) -> (Vec<PathMapping>, Vec<String>) {
    let mut mappings = Vec::new();
    let mut conflicts = Vec::new();

    if source.is_file() {
        let dest_path = if destination.is_dir() {
            destination.join(source.file_name().unwrap_or_default())
        } else {
            destination.to_path_buf()
        };
        let mapping = PathMapping {
            from_path: relative_posix(library_root, source),
            to_path: relative_posix(library_root, &dest_path),
        };
        if dest_path.exists() {
            conflicts.push(mapping.to_path.clone());
        }
        mappings.push(mapping);
        return (mappings, conflicts);
    }

    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .flatten()
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let dest_path = destination.join(relative);
        let mapping = PathMapping {
            from_path: relative_posix(library_root, entry.path()),
            to_path: relative_posix(library_root, &dest_path),
        };
        if dest_path.exists() {
            conflicts.push(mapping.to_path.clone());
        }
        mappings.push(mapping);
    }
    (mappings, conflicts)
}

/// Remove a file, or a directory when `recursive` permits it.
pub fn remove_path(target: &Path, recursive: bool) -> io::Result<()> {
    if target.is_dir() {
        if recursive {
            std::fs::remove_dir_all(target)
        } else {
            std::fs::remove_dir(target)
        }
    } else {
        std::fs::remove_file(target)
    }
}

/// Recursively copy a file or directory tree without following symlinks;
/// symlinked entries inside a tree are skipped.
pub fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    if source.is_file() {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, destination)?;
        return Ok(());
    }

    for entry in WalkDir::new(source).follow_links(false).into_iter() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        if relative.as_os_str().is_empty() {
            std::fs::create_dir_all(destination)?;
            continue;
        }
        let dest_path = destination.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest_path)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

/// Tenant-relative POSIX rendering of an absolute path.
pub fn relative_posix(library_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(library_root).unwrap_or(path);
    posix(relative)
}

fn posix(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        raw.into_owned()
    } else {
        raw.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
