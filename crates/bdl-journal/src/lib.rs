// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only activity journal.
//!
//! One JSON object per line in `activity.log` at the tenant root. Appends are
//! flushed and fsynced so a journal entry is durable before the tool call
//! returns. Readers skip malformed lines rather than failing the whole read.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;

/// File name of the journal at the tenant root.
pub const ACTIVITY_LOG_FILENAME: &str = "activity.log";

/// One journaled mutation.
///
/// Field order is alphabetical so the serialised line matches the canonical
/// key ordering of existing journals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Commit id produced by the mutation.
    #[serde(rename = "commitSha")]
    pub commit_sha: String,
    /// Tool operation name (e.g. `write_markdown`).
    pub operation: String,
    /// Tenant-relative POSIX path of the primary target.
    pub path: String,
    /// Short human summary (e.g. `append`, `replace_section (## Scope)`).
    pub summary: String,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
}

/// Build an entry stamped with the current UTC time.
pub fn build_entry(
    operation: &str,
    relative_path: &Path,
    summary: &str,
    commit_sha: &str,
) -> ActivityEntry {
    ActivityEntry {
        commit_sha: commit_sha.to_string(),
        operation: operation.to_string(),
        path: relative_path.to_string_lossy().replace('\\', "/"),
        summary: summary.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

fn journal_path(library_root: &Path) -> std::path::PathBuf {
    library_root.join(ACTIVITY_LOG_FILENAME)
}

/// Append one entry to the journal, fsyncing before returning.
pub fn append_entry(library_root: &Path, entry: &ActivityEntry) -> io::Result<()> {
    let line = serde_json::to_string(entry)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(journal_path(library_root))?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.sync_all()
}

/// Read journal entries in file order, optionally dropping entries older than
/// `since`, truncated to the last `limit`.
///
/// Malformed lines and entries with unparseable timestamps (when filtering)
/// are skipped.
pub fn read_entries(
    library_root: &Path,
    since: Option<DateTime<Utc>>,
    limit: usize,
) -> Vec<serde_json::Value> {
    let Ok(content) = std::fs::read_to_string(journal_path(library_root)) else {
        return Vec::new();
    };

    let mut entries: Vec<serde_json::Value> = Vec::new();
    for line in content.lines() {
        let Ok(entry) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if let Some(since) = since {
            let timestamp = entry
                .get("timestamp")
                .and_then(|v| v.as_str())
                .and_then(parse_timestamp);
            if let Some(at) = timestamp {
                if at < since {
                    continue;
                }
            }
        }
        entries.push(entry);
    }

    let skip = entries.len().saturating_sub(limit);
    entries.split_off(skip)
}

/// Number of entries currently in the journal (malformed lines excluded).
pub fn entry_count(library_root: &Path) -> usize {
    read_entries(library_root, None, usize::MAX).len()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn entry(op: &str, stamp: &str) -> ActivityEntry {
        ActivityEntry {
            commit_sha: "a".repeat(40),
            operation: op.into(),
            path: "docs/readme.md".into(),
            summary: "append".into(),
            timestamp: stamp.into(),
        }
    }

    #[test]
    fn append_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        append_entry(dir.path(), &entry("write_markdown", "2026-02-17T10:00:00Z")).unwrap();
        append_entry(dir.path(), &entry("edit_markdown", "2026-02-17T11:00:00Z")).unwrap();

        let entries = read_entries(dir.path(), None, 50);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["operation"], "write_markdown");
        assert_eq!(entries[1]["operation"], "edit_markdown");
    }

    #[test]
    fn serialised_line_uses_canonical_key_order() {
        let line = serde_json::to_string(&entry("write_markdown", "2026-02-17T10:00:00Z")).unwrap();
        let commit = line.find("commitSha").unwrap();
        let operation = line.find("operation").unwrap();
        let path = line.find("\"path\"").unwrap();
        let summary = line.find("summary").unwrap();
        let timestamp = line.find("timestamp").unwrap();
        assert!(commit < operation && operation < path && path < summary && summary < timestamp);
    }

    #[test]
    fn reader_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        append_entry(dir.path(), &entry("create_markdown", "2026-02-17T10:00:00Z")).unwrap();
        std::fs::write(
            dir.path().join(ACTIVITY_LOG_FILENAME),
            format!(
                "{}\nnot json at all\n{}\n",
                serde_json::to_string(&entry("a", "2026-02-17T10:00:00Z")).unwrap(),
                serde_json::to_string(&entry("b", "2026-02-17T11:00:00Z")).unwrap()
            ),
        )
        .unwrap();

        let entries = read_entries(dir.path(), None, 50);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn limit_keeps_the_tail() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            append_entry(dir.path(), &entry(&format!("op{i}"), "2026-02-17T10:00:00Z")).unwrap();
        }
        let entries = read_entries(dir.path(), None, 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["operation"], "op3");
        assert_eq!(entries[1]["operation"], "op4");
    }

    #[test]
    fn since_filters_older_entries() {
        let dir = TempDir::new().unwrap();
        append_entry(dir.path(), &entry("old", "2026-02-16T10:00:00Z")).unwrap();
        append_entry(dir.path(), &entry("new", "2026-02-18T10:00:00Z")).unwrap();

        let since = DateTime::parse_from_rfc3339("2026-02-17T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entries = read_entries(dir.path(), Some(since), 50);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["operation"], "new");
    }

    #[test]
    fn missing_journal_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_entries(dir.path(), None, 10).is_empty());
        assert_eq!(entry_count(dir.path()), 0);
    }

    #[test]
    fn build_entry_normalises_path_separators() {
        let built = build_entry(
            "move_path",
            &PathBuf::from("a").join("b.md"),
            "move path",
            &"c".repeat(40),
        );
        assert_eq!(built.path, "a/b.md");
        assert!(built.timestamp.ends_with('Z'));
    }
}
