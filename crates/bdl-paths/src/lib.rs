//! Path validation enforcing the tenant library boundary.
//!
//! Validation is purely logical before it ever touches the filesystem: the
//! raw string is checked for absolute form and `..` segments first, then the
//! resolution is walked component by component looking for symlinks. The
//! target itself does not have to exist.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bdl_error::{ErrorCode, ToolError, ToolResult};
use std::path::{Path, PathBuf};

/// Validate a caller-supplied relative path and return the absolute path
/// rooted inside `library_root`.
///
/// Backslashes are normalised to forward slashes before splitting, so Windows
/// style input cannot smuggle separators past the checks.
///
/// # Errors
///
/// - `ABSOLUTE_PATH` when the path has a leading slash.
/// - `PATH_TRAVERSAL` when any segment is `..`.
/// - `PATH_SYMLINK` when any component along the resolution is a symlink.
pub fn validate_path(library_root: &Path, raw_path: &str) -> ToolResult<PathBuf> {
    let normalized = raw_path.replace('\\', "/");

    if normalized.starts_with('/') {
        return Err(ToolError::new(
            ErrorCode::AbsolutePath,
            "Absolute paths are not allowed.",
        )
        .with_detail("path", raw_path));
    }

    // Spurious slashes and single-dot segments collapse away; `..` never does.
    let segments: Vec<&str> = normalized
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    if segments.iter().any(|segment| *segment == "..") {
        return Err(ToolError::new(
            ErrorCode::PathTraversal,
            "Path traversal is not allowed.",
        )
        .with_detail("path", raw_path));
    }

    if contains_symlink(library_root, &segments) {
        return Err(ToolError::new(
            ErrorCode::PathSymlink,
            "Symlinked paths are not allowed.",
        )
        .with_detail("path", raw_path));
    }

    let mut resolved = library_root.to_path_buf();
    for segment in &segments {
        resolved.push(segment);
    }
    Ok(resolved)
}

/// Walk each component under `library_root` and report whether any of them is
/// a symlink. Missing components end the walk without error.
fn contains_symlink(library_root: &Path, segments: &[&str]) -> bool {
    let mut current = library_root.to_path_buf();
    for segment in segments {
        current.push(segment);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return true,
            Ok(_) => {}
            // Nonexistent components cannot be symlinks; validation must not
            // require the target to exist.
            Err(_) => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    #[test]
    fn accepts_simple_relative_path() {
        let dir = root();
        let resolved = validate_path(dir.path(), "docs/readme.md").unwrap();
        assert_eq!(resolved, dir.path().join("docs").join("readme.md"));
    }

    #[test]
    fn accepts_nonexistent_target() {
        let dir = root();
        assert!(validate_path(dir.path(), "not/yet/created.md").is_ok());
    }

    #[test]
    fn collapses_spurious_slashes_and_dots() {
        let dir = root();
        let resolved = validate_path(dir.path(), "./a//b/./c.md").unwrap();
        assert_eq!(resolved, dir.path().join("a").join("b").join("c.md"));
    }

    #[test]
    fn rejects_absolute_path() {
        let dir = root();
        let err = validate_path(dir.path(), "/etc/passwd").unwrap_err();
        assert_eq!(err.code, ErrorCode::AbsolutePath);
    }

    #[test]
    fn rejects_traversal_segments() {
        let dir = root();
        let err = validate_path(dir.path(), "a/b/../../etc").unwrap_err();
        assert_eq!(err.code, ErrorCode::PathTraversal);
    }

    #[test]
    fn rejects_backslash_traversal() {
        let dir = root();
        let err = validate_path(dir.path(), "a\\..\\secret.md").unwrap_err();
        assert_eq!(err.code, ErrorCode::PathTraversal);
    }

    #[test]
    fn rejects_backslash_absolute() {
        let dir = root();
        let err = validate_path(dir.path(), "\\etc\\passwd").unwrap_err();
        assert_eq!(err.code, ErrorCode::AbsolutePath);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlinked_component() {
        let dir = root();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let err = validate_path(dir.path(), "link/escape.md").unwrap_err();
        assert_eq!(err.code, ErrorCode::PathSymlink);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_leaf() {
        let dir = root();
        std::fs::write(dir.path().join("real.md"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.md"), dir.path().join("alias.md"))
            .unwrap();
        let err = validate_path(dir.path(), "alias.md").unwrap_err();
        assert_eq!(err.code, ErrorCode::PathSymlink);
    }

    #[test]
    fn resolved_path_stays_under_root() {
        let dir = root();
        for raw in ["a.md", "a/b.md", "deep/nested/tree/file.markdown"] {
            let resolved = validate_path(dir.path(), raw).unwrap();
            assert!(resolved.starts_with(dir.path()), "{raw} escaped the root");
        }
    }
}
