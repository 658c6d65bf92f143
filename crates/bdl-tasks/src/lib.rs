//! bdl-tasks
//!
//! The task ledger: pipe-delimited lines in `pulse/index.md` with monthly
//! completion roll-off under `pulse/completed/YYYY-MM.md`.
//!
//! A task line reads `- [<status>] T-<NNN> | <meta> | <title>` where meta
//! parts are any of `p0..p3`, `owner:<id>`, `tags:<comma-list>`,
//! `scope:<path>`, `project:<name>`, `due:<iso-date>`. Legacy `path:` and
//! `life:` prefixes are recognised and normalised to the canonical `scope:`
//! form. Task ids are unique across the open ledger and every completion log.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ledger;
mod scope;
mod score;

pub use ledger::{
    StatusFilter, completed_tasks_path, load_completed_tasks, load_tasks, next_task_id,
    tasks_index_path,
};
pub use scope::{ScopeLookup, canonical_scope, infer_scopes, normalize_scope_path, scope_name};
pub use score::{ScoredTask, score_task};

use bdl_error::{ErrorCode, ToolError, ToolResult};
use serde::{Deserialize, Serialize, Serializer};

/// Open (`[ ]`) or completed (`[x]`) ledger status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TaskStatus {
    /// The task is open.
    Open,
    /// The task has been completed.
    Done,
}

impl TaskStatus {
    /// Ledger character: `" "` or `"x"`.
    #[must_use]
    pub fn as_char(&self) -> char {
        match self {
            Self::Open => ' ',
            Self::Done => 'x',
        }
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            Self::Open => " ",
            Self::Done => "x",
        })
    }
}

/// One task parsed from a ledger line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    /// Unique id across open and completed files.
    pub id: u64,
    /// Open or completed.
    pub status: TaskStatus,
    /// Title (untagged meta parts joined by `" | "`).
    pub title: String,
    /// Priority `p0..p3`, if tagged.
    pub priority: Option<String>,
    /// Owner id, if tagged.
    pub owner: Option<String>,
    /// Tags, possibly empty.
    pub tags: Vec<String>,
    /// Project name, if tagged.
    pub project: Option<String>,
    /// Canonical scope path (`life/<topic>` or `projects/...`), if known.
    pub scope: Option<String>,
    /// Due date string, if tagged.
    pub due: Option<String>,
    /// Original ledger line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Completion file the task was read from, for completed tasks.
    #[serde(rename = "sourcePath", skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl Task {
    /// A fresh open task with the given id and title.
    #[must_use]
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            status: TaskStatus::Open,
            title: title.into(),
            priority: None,
            owner: None,
            tags: Vec::new(),
            project: None,
            scope: None,
            due: None,
            raw: None,
            source_path: None,
        }
    }
}

/// Parse a single ledger line. Non-task lines return `None`.
#[must_use]
pub fn parse_task_line(line: &str) -> Option<Task> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix("- [")?;
    let status_char = rest.chars().next()?;
    let status = match status_char {
        ' ' => TaskStatus::Open,
        'x' | 'X' => TaskStatus::Done,
        _ => return None,
    };
    let rest = rest.get(1..)?.strip_prefix("] T-")?;

    let digits_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits_len == 0 {
        return None;
    }
    let id: u64 = rest[..digits_len].parse().ok()?;
    let rest = rest[digits_len..].trim_start();
    let rest = rest.strip_prefix('|')?;

    let mut task = Task::new(id, "");
    task.status = status;
    task.raw = Some(line.to_string());

    let mut title_parts: Vec<&str> = Vec::new();
    for part in rest.split('|') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if is_priority(part) {
            task.priority = Some(part.to_string());
        } else if let Some(owner) = part.strip_prefix("owner:") {
            task.owner = Some(owner.trim().to_string());
        } else if let Some(tags) = part.strip_prefix("tags:") {
            task.tags = tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        } else if let Some(scope) = part.strip_prefix("scope:") {
            task.scope = Some(normalize_scope_path(scope));
        } else if let Some(path) = part.strip_prefix("path:") {
            // Legacy prefix for the canonical scope form.
            task.scope = Some(normalize_scope_path(path));
        } else if let Some(topic) = part.strip_prefix("life:") {
            // Legacy prefix; bare topic names live under life/.
            let normalized = normalize_scope_path(topic);
            task.scope = Some(if normalized.contains('/') {
                normalized
            } else {
                format!("life/{normalized}")
            });
        } else if let Some(project) = part.strip_prefix("project:") {
            task.project = Some(project.trim().to_string());
        } else if let Some(due) = part.strip_prefix("due:") {
            task.due = Some(due.trim().to_string());
        } else {
            title_parts.push(part);
        }
    }
    task.title = title_parts.join(" | ");
    Some(task)
}

fn is_priority(part: &str) -> bool {
    let Some(rest) = part.strip_prefix('p') else {
        return false;
    };
    !rest.is_empty() && rest.len() <= 2 && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a ledger document into tasks plus the verbatim line list (used to
/// rewrite the file preserving non-task lines).
#[must_use]
pub fn parse_tasks(content: &str) -> (Vec<Task>, Vec<String>) {
    let mut tasks = Vec::new();
    let mut lines = Vec::new();
    for line in content.lines() {
        if let Some(task) = parse_task_line(line) {
            tasks.push(task);
        }
        lines.push(line.to_string());
    }
    (tasks, lines)
}

/// Render a task back into its canonical ledger line.
#[must_use]
pub fn format_task_line(task: &Task) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(priority) = &task.priority {
        parts.push(priority.clone());
    }
    if let Some(owner) = &task.owner {
        parts.push(format!("owner:{owner}"));
    }
    if !task.tags.is_empty() {
        parts.push(format!("tags:{}", task.tags.join(",")));
    }
    if let Some(scope) = &task.scope {
        parts.push(format!("scope:{scope}"));
    }
    if let Some(project) = &task.project {
        parts.push(format!("project:{project}"));
    }
    if let Some(due) = &task.due {
        parts.push(format!("due:{due}"));
    }
    parts.push(task.title.clone());
    let meta = parts.join(" | ");
    format!("- [{}] T-{:03} | {meta}", task.status.as_char(), task.id)
        .trim_end()
        .to_string()
}

/// Locate the line index carrying a task id, if present.
#[must_use]
pub fn find_task_line_index(lines: &[String], task_id: u64) -> Option<usize> {
    let needle = format!("T-{task_id:03}");
    lines.iter().position(|line| line.contains(&needle))
}

/// Remove a task (and its line) by id, returning the task.
pub fn pop_task(tasks: &mut Vec<Task>, lines: &mut Vec<String>, task_id: u64) -> Option<Task> {
    let position = tasks.iter().position(|task| task.id == task_id)?;
    let task = tasks.remove(position);
    if let Some(line_index) = find_task_line_index(lines, task_id) {
        lines.remove(line_index);
    }
    Some(task)
}

/// Apply an `update_task` fields object to a task.
///
/// # Errors
///
/// `INVALID_TYPE` when a field carries the wrong JSON type.
pub fn apply_task_updates(
    task: &mut Task,
    fields: &serde_json::Map<String, serde_json::Value>,
) -> ToolResult<()> {
    for key in ["title", "priority", "owner", "project", "due"] {
        let Some(value) = fields.get(key) else {
            continue;
        };
        let parsed = match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            _ => {
                return Err(ToolError::new(
                    ErrorCode::InvalidType,
                    format!("{key} must be a string."),
                )
                .with_detail("field", key));
            }
        };
        match key {
            "title" => task.title = parsed.unwrap_or_default(),
            "priority" => task.priority = parsed,
            "owner" => task.owner = parsed,
            "project" => task.project = parsed,
            "due" => task.due = parsed,
            _ => unreachable!(),
        }
    }

    if let Some(value) = fields.get("scope") {
        match value {
            serde_json::Value::Null => task.scope = None,
            serde_json::Value::String(s) => task.scope = Some(normalize_scope_path(s)),
            _ => {
                return Err(
                    ToolError::new(ErrorCode::InvalidType, "scope must be a string.")
                        .with_detail("field", "scope"),
                );
            }
        }
    }

    if let Some(value) = fields.get("tags") {
        let Some(items) = value.as_array() else {
            return Err(ToolError::new(ErrorCode::InvalidType, "tags must be a list.")
                .with_detail("field", "tags"));
        };
        task.tags = items
            .iter()
            .filter_map(|item| item.as_str())
            .map(String::from)
            .collect();
    }

    if let Some(value) = fields.get("status") {
        if let Some(status) = value.as_str() {
            match status.to_ascii_lowercase().as_str() {
                "open" => task.status = TaskStatus::Open,
                "completed" => task.status = TaskStatus::Done,
                _ => {}
            }
        }
    }

    Ok(())
}

/// Filter tasks by the optional owner/priority/tag/project criteria.
#[must_use]
pub fn filter_tasks(
    tasks: Vec<Task>,
    owner: Option<&str>,
    priority: Option<&str>,
    tag: Option<&str>,
    project: Option<&str>,
    lookup: &ScopeLookup,
) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|task| {
            if let Some(owner) = owner {
                if task.owner.as_deref() != Some(owner) {
                    return false;
                }
            }
            if let Some(priority) = priority {
                if task.priority.as_deref() != Some(priority) {
                    return false;
                }
            }
            if let Some(tag) = tag {
                if !task.tags.iter().any(|t| t == tag) {
                    return false;
                }
            }
            if let Some(project) = project {
                if !scope::task_matches_project(task, project, lookup) {
                    return false;
                }
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_line() {
        let task = parse_task_line("- [ ] T-001 | Write tests").unwrap();
        assert_eq!(task.id, 1);
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.title, "Write tests");
        assert!(task.priority.is_none());
    }

    #[test]
    fn parses_full_meta() {
        let task = parse_task_line(
            "- [x] T-042 | p1 | owner:alice | tags:infra,urgent | scope:projects/active/demo | project:demo | due:2026-03-01 | Ship it",
        )
        .unwrap();
        assert_eq!(task.id, 42);
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.priority.as_deref(), Some("p1"));
        assert_eq!(task.owner.as_deref(), Some("alice"));
        assert_eq!(task.tags, vec!["infra", "urgent"]);
        assert_eq!(task.scope.as_deref(), Some("projects/active/demo"));
        assert_eq!(task.project.as_deref(), Some("demo"));
        assert_eq!(task.due.as_deref(), Some("2026-03-01"));
        assert_eq!(task.title, "Ship it");
    }

    #[test]
    fn legacy_path_prefix_normalises_to_scope() {
        let task = parse_task_line("- [ ] T-003 | path:/life/fitness/ | Run").unwrap();
        assert_eq!(task.scope.as_deref(), Some("life/fitness"));
    }

    #[test]
    fn legacy_life_prefix_normalises_to_scope() {
        let task = parse_task_line("- [ ] T-004 | life:fitness | Run").unwrap();
        assert_eq!(task.scope.as_deref(), Some("life/fitness"));
    }

    #[test]
    fn untagged_parts_join_into_title() {
        let task = parse_task_line("- [ ] T-005 | p2 | first | second").unwrap();
        assert_eq!(task.title, "first | second");
    }

    #[test]
    fn priority_must_look_like_priority() {
        let task = parse_task_line("- [ ] T-006 | pay | the bill").unwrap();
        assert!(task.priority.is_none());
        assert_eq!(task.title, "pay | the bill");
    }

    #[test]
    fn uppercase_x_counts_as_done() {
        let task = parse_task_line("- [X] T-007 | done").unwrap();
        assert_eq!(task.status, TaskStatus::Done);
    }

    #[test]
    fn non_task_lines_return_none() {
        for line in ["# Pulse Index", "", "- plain bullet", "- [?] T-001 | x", "- [ ] U-1 | x"] {
            assert!(parse_task_line(line).is_none(), "line {line:?} parsed");
        }
    }

    #[test]
    fn format_roundtrips_canonical_line() {
        let line = "- [ ] T-042 | p1 | owner:alice | tags:infra | scope:life/fitness | due:2026-03-01 | Run";
        let task = parse_task_line(line).unwrap();
        assert_eq!(format_task_line(&task), line);
    }

    #[test]
    fn format_pads_short_ids_and_keeps_long_ones() {
        let mut task = Task::new(7, "t");
        assert!(format_task_line(&task).starts_with("- [ ] T-007 |"));
        task.id = 1234;
        assert!(format_task_line(&task).starts_with("- [ ] T-1234 |"));
    }

    #[test]
    fn parse_tasks_keeps_non_task_lines() {
        let content = "# Pulse Index\n- [ ] T-001 | one\nnotes\n- [ ] T-002 | two\n";
        let (tasks, lines) = parse_tasks(content);
        assert_eq!(tasks.len(), 2);
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn pop_task_removes_task_and_line() {
        let content = "# Pulse Index\n- [ ] T-001 | one\n- [ ] T-002 | two\n";
        let (mut tasks, mut lines) = parse_tasks(content);
        let popped = pop_task(&mut tasks, &mut lines, 1).unwrap();
        assert_eq!(popped.id, 1);
        assert_eq!(tasks.len(), 1);
        assert!(!lines.iter().any(|l| l.contains("T-001")));
    }

    #[test]
    fn apply_updates_changes_fields() {
        let mut task = Task::new(1, "old");
        let fields = serde_json::json!({
            "title": "new",
            "priority": "p0",
            "tags": ["a", "b"],
            "status": "completed",
        });
        apply_task_updates(&mut task, fields.as_object().unwrap()).unwrap();
        assert_eq!(task.title, "new");
        assert_eq!(task.priority.as_deref(), Some("p0"));
        assert_eq!(task.tags, vec!["a", "b"]);
        assert_eq!(task.status, TaskStatus::Done);
    }

    #[test]
    fn apply_updates_rejects_bad_types() {
        let mut task = Task::new(1, "t");
        let fields = serde_json::json!({"priority": 3});
        let err = apply_task_updates(&mut task, fields.as_object().unwrap()).unwrap_err();
        assert_eq!(err.code, bdl_error::ErrorCode::InvalidType);
    }

    #[test]
    fn status_serialises_as_ledger_char() {
        let task = Task::new(1, "t");
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["status"], " ");
    }

    #[test]
    fn filters_compose() {
        let lookup = ScopeLookup::default();
        let (tasks, _) = parse_tasks(
            "- [ ] T-001 | p1 | owner:alice | tags:infra | one\n\
             - [ ] T-002 | p2 | owner:bob | two\n",
        );
        let filtered = filter_tasks(tasks, Some("alice"), None, None, None, &lookup);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);
    }
}
