//! Shared handler plumbing: markdown target resolution, metadata, and
//! timestamp parsing.

use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_paths::validate_path;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Validate a markdown path: containment plus the extension check.
pub fn resolve_markdown_path(library_root: &Path, raw_path: &str) -> ToolResult<PathBuf> {
    let resolved = validate_path(library_root, raw_path)?;
    if !bdl_markdown::is_markdown_path(&resolved) {
        return Err(
            ToolError::new(ErrorCode::NotMarkdown, "Only markdown files are allowed.")
                .with_detail("path", raw_path),
        );
    }
    Ok(resolved)
}

/// Resolve an existing markdown file (containment, extension, existence,
/// file-kind checks).
pub fn resolve_existing_markdown_file(
    library_root: &Path,
    raw_path: &str,
) -> ToolResult<PathBuf> {
    let resolved = resolve_markdown_path(library_root, raw_path)?;
    if !resolved.exists() {
        return Err(
            ToolError::new(ErrorCode::FileNotFound, "Markdown file does not exist.")
                .with_detail("path", raw_path),
        );
    }
    if !resolved.is_file() {
        return Err(
            ToolError::new(ErrorCode::InvalidPath, "Path must reference a file.")
                .with_detail("path", raw_path),
        );
    }
    Ok(resolved)
}

/// Read a markdown file as UTF-8 text.
pub fn read_markdown_text(path: &Path, raw_path: &str) -> ToolResult<String> {
    let bytes = bdl_engine::read_pre_image(path, raw_path)?;
    bdl_engine::decode_utf8(bytes, raw_path)
}

/// `{path, sizeBytes, lastModified, gitHead}` metadata for a file.
pub fn build_metadata(library_root: &Path, path: &Path) -> ToolResult<Value> {
    let stat = std::fs::metadata(path).map_err(|err| {
        ToolError::new(ErrorCode::FileReadFailed, "File metadata could not be read.")
            .with_detail("path", bdl_engine::relative_posix(library_root, path))
            .with_detail("cause", err.to_string())
    })?;
    Ok(json!({
        "path": bdl_engine::relative_posix(library_root, path),
        "sizeBytes": stat.len(),
        "lastModified": modified_stamp(&stat),
        "gitHead": bdl_git::resolve_head_at(library_root),
    }))
}

/// RFC 3339 mtime of a metadata record (epoch when unavailable).
pub fn modified_stamp(stat: &std::fs::Metadata) -> String {
    let modified: DateTime<Utc> = stat
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH);
    modified.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Collect tenant-relative markdown paths under `start`, sorted, skipping
/// symlinks.
pub fn collect_markdown_files(library_root: &Path, start: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(start)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| bdl_markdown::is_markdown_path(entry.path()))
        .map(|entry| bdl_engine::relative_posix(library_root, entry.path()))
        .collect();
    files.sort();
    files
}

/// Parse an ISO date-time (or bare date, read as midnight UTC).
pub fn parse_iso_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse an optional `since`-style field.
pub fn parse_since_field(raw: Option<&Value>, key: &str) -> ToolResult<Option<DateTime<Utc>>> {
    let Some(value) = raw else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let rendered = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    parse_iso_datetime(&rendered).map(Some).ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidDate, format!("{key} must be ISO date-time."))
            .with_detail(key, rendered)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn markdown_resolution_enforces_extension() {
        let dir = TempDir::new().unwrap();
        let err = resolve_markdown_path(dir.path(), "notes.txt").unwrap_err();
        assert_eq!(err.code, ErrorCode::NotMarkdown);
        assert!(resolve_markdown_path(dir.path(), "notes.md").is_ok());
    }

    #[test]
    fn existing_markdown_file_checks_kind() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("folder.md")).unwrap();
        let err = resolve_existing_markdown_file(dir.path(), "folder.md").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPath);

        let err = resolve_existing_markdown_file(dir.path(), "missing.md").unwrap_err();
        assert_eq!(err.code, ErrorCode::FileNotFound);
    }

    #[test]
    fn metadata_shape() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "hello\n").unwrap();
        let metadata = build_metadata(dir.path(), &dir.path().join("a.md")).unwrap();
        assert_eq!(metadata["path"], "a.md");
        assert_eq!(metadata["sizeBytes"], 6);
        assert!(metadata["lastModified"].as_str().unwrap().ends_with('Z'));
        assert!(metadata["gitHead"].is_null());
    }

    #[test]
    fn collects_markdown_recursively_sorted() {
        let dir = TempDir::new().unwrap();
        for rel in ["b.md", "a/inner.md", "a/skip.txt"] {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "x").unwrap();
        }
        let files = collect_markdown_files(dir.path(), dir.path());
        assert_eq!(files, vec!["a/inner.md", "b.md"]);
    }

    #[test]
    fn iso_datetime_accepts_date_and_datetime() {
        assert!(parse_iso_datetime("2026-02-17").is_some());
        assert!(parse_iso_datetime("2026-02-17T10:00:00Z").is_some());
        assert!(parse_iso_datetime("2026-02-17T10:00:00").is_some());
        assert!(parse_iso_datetime("not a date").is_none());
    }
}
