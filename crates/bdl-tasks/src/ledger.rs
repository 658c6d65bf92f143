//! Ledger file IO: the open index, monthly completion logs, and id
//! allocation across both.

use crate::{Task, parse_tasks};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Which ledger files to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Only `pulse/index.md`.
    Open,
    /// Only `pulse/completed/*.md`.
    Completed,
    /// Both.
    All,
}

impl StatusFilter {
    /// Parse the wire value, defaulting unknown strings to `Open`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "completed" => Self::Completed,
            "all" => Self::All,
            _ => Self::Open,
        }
    }
}

/// Path of the open task index.
#[must_use]
pub fn tasks_index_path(library_root: &Path) -> PathBuf {
    library_root.join("pulse").join("index.md")
}

/// Path of the completion log for the month containing `now` (UTC).
#[must_use]
pub fn completed_tasks_path(library_root: &Path, now: DateTime<Utc>) -> PathBuf {
    library_root
        .join("pulse")
        .join("completed")
        .join(format!("{}.md", now.format("%Y-%m")))
}

/// Load tasks from the ledger files selected by `filter`.
#[must_use]
pub fn load_tasks(library_root: &Path, filter: StatusFilter) -> Vec<Task> {
    let mut tasks = Vec::new();

    if matches!(filter, StatusFilter::Open | StatusFilter::All) {
        if let Ok(content) = std::fs::read_to_string(tasks_index_path(library_root)) {
            tasks.extend(parse_tasks(&content).0);
        }
    }

    if matches!(filter, StatusFilter::Completed | StatusFilter::All) {
        for path in completed_files(library_root) {
            if let Ok(content) = std::fs::read_to_string(&path) {
                tasks.extend(parse_tasks(&content).0);
            }
        }
    }

    tasks
}

/// Load completed tasks newest-file-first, stamping each with its source
/// path. Files whose mtime predates `since` are skipped.
#[must_use]
pub fn load_completed_tasks(library_root: &Path, since: Option<DateTime<Utc>>) -> Vec<Task> {
    let mut files: Vec<(PathBuf, Option<std::time::SystemTime>)> = completed_files(library_root)
        .into_iter()
        .map(|path| {
            let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            (path, mtime)
        })
        .collect();
    files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut tasks = Vec::new();
    for (path, mtime) in files {
        if let (Some(since), Some(mtime)) = (since, mtime) {
            let mtime: DateTime<Utc> = mtime.into();
            if mtime < since {
                continue;
            }
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let source = path
            .strip_prefix(library_root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        for mut task in parse_tasks(&content).0 {
            task.source_path = Some(source.clone());
            tasks.push(task);
        }
    }
    tasks
}

fn completed_files(library_root: &Path) -> Vec<PathBuf> {
    let completed_root = library_root.join("pulse").join("completed");
    let Ok(entries) = std::fs::read_dir(&completed_root) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    files.sort();
    files
}

/// Next task id: `max(open ∪ completed) + 1`, starting at 1.
#[must_use]
pub fn next_task_id(library_root: &Path) -> u64 {
    load_tasks(library_root, StatusFilter::All)
        .iter()
        .map(|task| task.id)
        .max()
        .map_or(1, |max| max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskStatus;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn loads_open_and_completed() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pulse/index.md", "- [ ] T-001 | open one\n");
        write(
            dir.path(),
            "pulse/completed/2026-01.md",
            "- [x] T-002 | done one\n",
        );

        assert_eq!(load_tasks(dir.path(), StatusFilter::Open).len(), 1);
        assert_eq!(load_tasks(dir.path(), StatusFilter::Completed).len(), 1);
        assert_eq!(load_tasks(dir.path(), StatusFilter::All).len(), 2);
    }

    #[test]
    fn completed_tasks_carry_source_path() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pulse/completed/2026-01.md",
            "- [x] T-002 | done one\n",
        );
        let tasks = load_completed_tasks(dir.path(), None);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(
            tasks[0].source_path.as_deref(),
            Some("pulse/completed/2026-01.md")
        );
    }

    #[test]
    fn next_id_spans_open_and_completed() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pulse/index.md", "- [ ] T-003 | open\n");
        write(
            dir.path(),
            "pulse/completed/2026-01.md",
            "- [x] T-010 | done\n",
        );
        assert_eq!(next_task_id(dir.path()), 11);
    }

    #[test]
    fn next_id_starts_at_one() {
        let dir = TempDir::new().unwrap();
        assert_eq!(next_task_id(dir.path()), 1);
    }

    #[test]
    fn completed_path_uses_utc_month() {
        let dir = TempDir::new().unwrap();
        let now = DateTime::parse_from_rfc3339("2026-02-17T23:59:59Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            completed_tasks_path(dir.path(), now),
            dir.path().join("pulse/completed/2026-02.md")
        );
    }

    #[test]
    fn status_filter_parses_wire_values() {
        assert_eq!(StatusFilter::parse("open"), StatusFilter::Open);
        assert_eq!(StatusFilter::parse("completed"), StatusFilter::Completed);
        assert_eq!(StatusFilter::parse("all"), StatusFilter::All);
        assert_eq!(StatusFilter::parse("bogus"), StatusFilter::Open);
    }
}
