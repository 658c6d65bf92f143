//! bdl-git
//!
//! Commit store backing every library mutation. The store is a plain git
//! repository rooted at the tenant library root, driven through the `git`
//! binary for staging and commits, with HEAD resolution and rollback reading
//! the `.git` files directly so error paths never depend on re-invoking git.
//!
//! The store is an audit log, not a collaboration substrate: one linear ref,
//! no branching, no merges.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use anyhow::{Context, Result};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::warn;

/// Snapshot of where HEAD pointed before a mutation, used to unwind a commit
/// whose journaling failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadState {
    /// Loose ref file HEAD points at, if HEAD is symbolic.
    pub ref_path: Option<PathBuf>,
    /// Previous commit id (None on an unborn branch).
    pub previous: Option<String>,
}

/// Pre-mutation byte image kept for rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileImage {
    /// UTF-8 text content.
    Text(String),
    /// Raw bytes (deletes capture the file this way).
    Bytes(Vec<u8>),
}

/// Per-tenant commit store.
#[derive(Debug, Clone)]
pub struct CommitStore {
    root: PathBuf,
}

impl CommitStore {
    /// Open the store for a library root, initialising the repository on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns `GIT_ERROR` when `git init` cannot be run or fails.
    pub fn open(library_root: &Path) -> ToolResult<Self> {
        let store = Self {
            root: library_root.to_path_buf(),
        };
        if !store.git_dir().exists() {
            run_git(&store.root, &["init", "-q"]).map_err(|err| {
                ToolError::new(ErrorCode::GitError, "Git repository could not be initialized.")
                    .with_detail("path", library_root.display().to_string())
                    .with_detail("cause", err.to_string())
            })?;
        }
        Ok(store)
    }

    /// The library root this store mutates.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git_dir(&self) -> PathBuf {
        self.root.join(".git")
    }

    /// Stage the given tenant-relative paths and create a commit labelled
    /// `"<operation>: <target posix path>"`. Returns the 40-hex commit id.
    ///
    /// # Errors
    ///
    /// Any git failure surfaces as an error; callers run the matching
    /// rollback primitive and map it to `GIT_ERROR`.
    pub fn commit(&self, relative_paths: &[PathBuf], operation: &str, target: &Path) -> Result<String> {
        self.stage(relative_paths)?;

        let message = format!("{operation}: {}", posix(target));
        run_git(
            &self.root,
            &[
                "-c",
                "user.name=braindrive",
                "-c",
                "user.email=library@braindrive.local",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                &message,
            ],
        )
        .context("git commit")?;

        let sha = run_git(&self.root, &["rev-parse", "HEAD"])
            .context("git rev-parse HEAD")?
            .trim()
            .to_string();
        anyhow::ensure!(
            sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit()),
            "unexpected commit id {sha:?}"
        );
        Ok(sha)
    }

    fn stage(&self, relative_paths: &[PathBuf]) -> Result<()> {
        // `add -A` with an explicit pathspec stages deletions as well as
        // creations and edits. Paths staged per file: a path that is neither
        // on disk nor tracked (an unwound create) is an unmatched pathspec,
        // which must not fail the rest of the staging batch.
        for path in relative_paths {
            let path = posix(path);
            match run_git(&self.root, &["add", "-A", "--", &path]) {
                Ok(_) => {}
                Err(err) if err.to_string().contains("did not match any files") => {}
                Err(err) => return Err(err).context("git add"),
            }
        }
        Ok(())
    }

    /// Resolve HEAD to a commit id by reading the repository files.
    ///
    /// A symbolic HEAD is followed through its loose ref, falling back to the
    /// packed-refs table when the loose file is absent. Returns `None` for a
    /// missing repository, an unborn branch, or unreadable state.
    #[must_use]
    pub fn resolve_head(&self) -> Option<String> {
        let head_path = self.git_dir().join("HEAD");
        let head_contents = std::fs::read_to_string(&head_path).ok()?;
        let head_contents = head_contents.trim();

        if let Some(ref_name) = head_contents.strip_prefix("ref:") {
            let ref_name = ref_name.trim();
            if ref_name.is_empty() {
                return None;
            }
            let ref_path = self.git_dir().join(ref_name);
            if ref_path.exists() {
                let id = std::fs::read_to_string(&ref_path).ok()?;
                let id = id.trim();
                return (!id.is_empty()).then(|| id.to_string());
            }
            return lookup_packed_ref(&self.git_dir().join("packed-refs"), ref_name);
        }

        (!head_contents.is_empty()).then(|| head_contents.to_string())
    }

    /// Capture the loose ref location and previous commit id for later
    /// [`restore_head`](Self::restore_head).
    #[must_use]
    pub fn capture_head_state(&self) -> HeadState {
        let head_path = self.git_dir().join("HEAD");
        let Ok(head_contents) = std::fs::read_to_string(&head_path) else {
            return HeadState {
                ref_path: None,
                previous: None,
            };
        };
        let head_contents = head_contents.trim();

        if let Some(ref_name) = head_contents.strip_prefix("ref:") {
            let ref_name = ref_name.trim();
            if ref_name.is_empty() {
                return HeadState {
                    ref_path: None,
                    previous: None,
                };
            }
            let ref_path = self.git_dir().join(ref_name);
            if ref_path.exists() {
                let previous = std::fs::read_to_string(&ref_path)
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                return HeadState {
                    ref_path: Some(ref_path),
                    previous,
                };
            }
            let previous = lookup_packed_ref(&self.git_dir().join("packed-refs"), ref_name);
            return HeadState {
                ref_path: Some(ref_path),
                previous,
            };
        }

        HeadState {
            ref_path: None,
            previous: (!head_contents.is_empty()).then(|| head_contents.to_string()),
        }
    }

    /// Restore HEAD to a previously captured state. Best-effort: rollback
    /// paths must never raise on top of the original failure.
    pub fn restore_head(&self, state: &HeadState) {
        match &state.ref_path {
            None => {
                let head_path = self.git_dir().join("HEAD");
                let Some(previous) = &state.previous else {
                    return;
                };
                if !head_path.exists() {
                    return;
                }
                if let Err(err) = std::fs::write(&head_path, format!("{previous}\n")) {
                    warn!(target: "bdl.git", error = %err, "failed to restore detached HEAD");
                }
            }
            Some(ref_path) => {
                let result = match &state.previous {
                    None => {
                        if ref_path.exists() {
                            std::fs::remove_file(ref_path)
                        } else {
                            Ok(())
                        }
                    }
                    Some(previous) => {
                        if let Some(parent) = ref_path.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        std::fs::write(ref_path, format!("{previous}\n"))
                    }
                };
                if let Err(err) = result {
                    warn!(target: "bdl.git", error = %err, "failed to restore HEAD ref");
                }
            }
        }
    }

    /// Rollback primitive for a freshly created file: delete it and re-stage
    /// the now-missing path. Best-effort.
    pub fn rollback_created_file(&self, target: &Path, relative: &Path) {
        if target.exists() {
            if let Err(err) = std::fs::remove_file(target) {
                warn!(target: "bdl.git", path = %relative.display(), error = %err, "rollback unlink failed");
            }
        }
        self.stage_best_effort(&[relative.to_path_buf()]);
    }

    /// Rollback primitive for a modified or deleted file: rewrite the prior
    /// bytes atomically and re-stage. Best-effort.
    pub fn rollback_modified_file(&self, target: &Path, relative: &Path, original: &FileImage) {
        let result = match original {
            FileImage::Text(text) => bdl_fs::atomic_write(target, text),
            FileImage::Bytes(bytes) => bdl_fs::atomic_write_bytes(target, bytes),
        };
        if let Err(err) = result {
            warn!(target: "bdl.git", path = %relative.display(), error = %err, "rollback rewrite failed");
        }
        self.stage_best_effort(&[relative.to_path_buf()]);
    }

    /// Rollback primitive for a batch create: unlink every created file, peel
    /// empty directories up to and including the scaffold root (when the
    /// mutation created it), and re-stage. Best-effort.
    pub fn rollback_created_tree(
        &self,
        created: &[PathBuf],
        tree_root: Option<&Path>,
        relatives: &[PathBuf],
    ) {
        for file in created {
            if file.exists() {
                let _ = std::fs::remove_file(file);
            }
        }

        if let Some(tree_root) = tree_root {
            let mut dirs: Vec<PathBuf> = collect_dirs(tree_root);
            dirs.sort();
            for dir in dirs.into_iter().rev() {
                let _ = std::fs::remove_dir(&dir);
            }
            let _ = std::fs::remove_dir(tree_root);
        }

        self.stage_best_effort(relatives);
    }

    fn stage_best_effort(&self, relative_paths: &[PathBuf]) {
        if relative_paths.is_empty() {
            return;
        }
        if let Err(err) = self.stage(relative_paths) {
            warn!(target: "bdl.git", error = %err, "rollback staging failed");
        }
    }
}

/// Resolve HEAD for a library root without initialising a repository.
///
/// Metadata reads use this so a read-only tool never creates `.git`.
#[must_use]
pub fn resolve_head_at(library_root: &Path) -> Option<String> {
    let store = CommitStore {
        root: library_root.to_path_buf(),
    };
    store.resolve_head()
}

fn collect_dirs(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.push(path.clone());
                stack.push(path);
            }
        }
    }
    out
}

/// Look up `ref_name` in a packed-refs table. Comment (`#`) and peeled (`^`)
/// lines are skipped.
fn lookup_packed_ref(packed_refs: &Path, ref_name: &str) -> Option<String> {
    let contents = std::fs::read_to_string(packed_refs).ok()?;
    for line in contents.lines() {
        if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        let (sha, name) = line.split_once(' ')?;
        if name.trim() == ref_name {
            return Some(sha.to_string());
        }
    }
    None
}

fn posix(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        raw.into_owned()
    } else {
        raw.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("run git {args:?}"))?;

    if !out.status.success() {
        anyhow::bail!(
            "git {:?} failed (code={:?}): {}",
            args,
            out.status.code(),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}
