//! Task ledger tool handlers.

use crate::markdown::write_atomic;
use crate::payload::{
    as_object, optional_str, optional_string_list, reject_unknown_fields, require_str,
};
use bdl_engine::{Mutation, Rollback};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_git::FileImage;
use bdl_tasks::{
    ScopeLookup, StatusFilter, Task, TaskStatus, apply_task_updates, canonical_scope,
    completed_tasks_path, filter_tasks, find_task_line_index, format_task_line, infer_scopes,
    load_tasks, next_task_id, parse_tasks, pop_task, tasks_index_path,
};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::path::Path;

fn require_task_id(payload: &Map<String, Value>) -> ToolResult<u64> {
    let value = payload.get("id").ok_or_else(|| {
        ToolError::new(ErrorCode::MissingId, "id is required.").with_detail("fields", ["id"])
    })?;
    value.as_u64().ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidType, "id must be an integer.")
            .with_detail("id", value.to_string())
    })
}

fn filter_params<'a>(
    payload: &'a Map<String, Value>,
) -> ToolResult<(
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
)> {
    Ok((
        optional_str(payload, "owner")?,
        optional_str(payload, "priority")?,
        optional_str(payload, "tag")?,
        optional_str(payload, "project")?,
    ))
}

/// `list_tasks` — open/completed/all with inferred scopes and filters.
pub fn list_tasks(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["owner", "priority", "tag", "status", "project"])?;
    let (owner, priority, tag, project) = filter_params(payload)?;
    let status = optional_str(payload, "status")?.unwrap_or("open");

    let lookup = ScopeLookup::from_library_root(library_root);
    let mut tasks = load_tasks(library_root, StatusFilter::parse(status));
    infer_scopes(&mut tasks, &lookup);
    let filtered = filter_tasks(tasks, owner, priority, tag, project, &lookup);
    Ok(json!({"tasks": filtered}))
}

/// `create_task` — next free id, appended to the open ledger.
pub fn create_task(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(
        payload,
        &[
            "title", "owner", "priority", "tags", "project", "due", "scope", "path", "scopePath",
        ],
    )?;
    let title = require_str(payload, "title", ErrorCode::MissingTitle, "title is required.")?;

    let lookup = ScopeLookup::from_library_root(library_root);
    let mut task = Task::new(next_task_id(library_root), title);
    task.priority = Some(
        optional_str(payload, "priority")?
            .unwrap_or("p2")
            .to_string(),
    );
    task.owner = optional_str(payload, "owner")?.map(String::from);
    task.tags = optional_string_list(payload, "tags");
    task.project = optional_str(payload, "project")?.map(String::from);
    task.due = optional_str(payload, "due")?.map(String::from);

    // Scope resolution order: explicit scopePath, path, scope, then project.
    let scope_token = optional_str(payload, "scopePath")?
        .or(optional_str(payload, "path")?)
        .or(optional_str(payload, "scope")?);
    task.scope = match scope_token {
        Some(token) => canonical_scope(token, &lookup),
        None => task
            .project
            .as_deref()
            .and_then(|project| lookup.resolve_project(project)),
    };

    let index_path = tasks_index_path(library_root);
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ToolError::new(ErrorCode::WriteError, "Task index could not be created.")
                .with_detail("path", "pulse/index.md")
                .with_detail("cause", err.to_string())
        })?;
    }
    let existing = std::fs::read_to_string(&index_path).unwrap_or_default();
    let updated = bdl_fs::join_with_newline(&existing, &format_task_line(&task));

    let relative = std::path::PathBuf::from("pulse/index.md");
    let mutation = Mutation::begin(library_root)?;
    write_atomic(&index_path, &updated, "pulse/index.md")?;
    let commit_sha = mutation.finish(
        std::slice::from_ref(&relative),
        "create_task",
        &relative,
        "create task",
        Rollback::RestoreFile {
            target: index_path,
            relative: relative.clone(),
            original: FileImage::Text(existing),
        },
    )?;

    Ok(json!({"task": task, "commitSha": commit_sha}))
}

/// `update_task` — rewrite one ledger line in place.
pub fn update_task(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["id", "fields"])?;
    if !payload.contains_key("id") || !payload.contains_key("fields") {
        return Err(
            ToolError::new(ErrorCode::MissingFields, "id and fields are required.")
                .with_detail("fields", ["id", "fields"]),
        );
    }
    let task_id = require_task_id(payload)?;
    let fields = payload
        .get("fields")
        .and_then(Value::as_object)
        .ok_or_else(|| ToolError::new(ErrorCode::InvalidType, "fields must be an object."))?;

    let index_path = tasks_index_path(library_root);
    let original = std::fs::read_to_string(&index_path).map_err(|_| {
        ToolError::new(ErrorCode::FileNotFound, "Task index does not exist.")
            .with_detail("path", "pulse/index.md")
    })?;

    let (mut tasks, mut lines) = parse_tasks(&original);
    let Some(task) = tasks.iter_mut().find(|task| task.id == task_id) else {
        return Err(ToolError::new(ErrorCode::TaskNotFound, "Task ID not found.")
            .with_detail("id", task_id));
    };
    apply_task_updates(task, fields)?;
    if let Some(line_index) = find_task_line_index(&lines, task_id) {
        lines[line_index] = format_task_line(task);
    }
    let task = task.clone();

    let updated = format!("{}\n", lines.join("\n").trim_end());
    let relative = std::path::PathBuf::from("pulse/index.md");
    let mutation = Mutation::begin(library_root)?;
    write_atomic(&index_path, &updated, "pulse/index.md")?;
    let commit_sha = mutation.finish(
        std::slice::from_ref(&relative),
        "update_task",
        &relative,
        "update task",
        Rollback::RestoreFile {
            target: index_path,
            relative: relative.clone(),
            original: FileImage::Text(original),
        },
    )?;

    Ok(json!({"task": task, "commitSha": commit_sha}))
}

/// `complete_task` — move a task to the current month's completion log.
pub fn complete_task(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["id"])?;
    let task_id = require_task_id(payload)?;

    let index_path = tasks_index_path(library_root);
    let original_index = std::fs::read_to_string(&index_path).map_err(|_| {
        ToolError::new(ErrorCode::FileNotFound, "Task index does not exist.")
            .with_detail("path", "pulse/index.md")
    })?;

    let (mut tasks, mut lines) = parse_tasks(&original_index);
    let Some(mut task) = pop_task(&mut tasks, &mut lines, task_id) else {
        return Err(ToolError::new(ErrorCode::TaskNotFound, "Task ID not found.")
            .with_detail("id", task_id));
    };
    task.status = TaskStatus::Done;
    task.raw = None;

    let completed_path = completed_tasks_path(library_root, Utc::now());
    if let Some(parent) = completed_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ToolError::new(ErrorCode::WriteError, "Completed log could not be created.")
                .with_detail("cause", err.to_string())
        })?;
    }
    let original_completed = std::fs::read_to_string(&completed_path).ok();
    let updated_completed = bdl_fs::join_with_newline(
        original_completed.as_deref().unwrap_or_default(),
        &format_task_line(&task),
    );

    let index_rel = std::path::PathBuf::from("pulse/index.md");
    let completed_rel = crate::markdown::relative_of(library_root, &completed_path);

    let completed_rollback = match &original_completed {
        Some(content) => Rollback::RestoreFile {
            target: completed_path.clone(),
            relative: completed_rel.clone(),
            original: FileImage::Text(content.clone()),
        },
        None => Rollback::RemoveCreated {
            target: completed_path.clone(),
            relative: completed_rel.clone(),
        },
    };

    let mutation = Mutation::begin(library_root)?;
    write_atomic(
        &index_path,
        &format!("{}\n", lines.join("\n").trim_end()),
        "pulse/index.md",
    )?;
    write_atomic(&completed_path, &updated_completed, "pulse/completed")?;
    let commit_sha = mutation.finish(
        &[index_rel.clone(), completed_rel.clone()],
        "complete_task",
        &completed_rel,
        "complete task",
        Rollback::Many(vec![
            Rollback::RestoreFile {
                target: index_path,
                relative: index_rel,
                original: FileImage::Text(original_index),
            },
            completed_rollback,
        ]),
    )?;

    Ok(json!({"task": task, "commitSha": commit_sha}))
}

/// `reopen_task` — move a completed task back to the open ledger.
pub fn reopen_task(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["id"])?;
    let task_id = require_task_id(payload)?;

    let completed_path = completed_tasks_path(library_root, Utc::now());
    let completed_rel = crate::markdown::relative_of(library_root, &completed_path);
    let original_completed = std::fs::read_to_string(&completed_path).map_err(|_| {
        ToolError::new(ErrorCode::FileNotFound, "Completed tasks file does not exist.")
            .with_detail("path", completed_rel.to_string_lossy().replace('\\', "/"))
    })?;

    let (mut tasks, mut lines) = parse_tasks(&original_completed);
    let Some(mut task) = pop_task(&mut tasks, &mut lines, task_id) else {
        return Err(ToolError::new(ErrorCode::TaskNotFound, "Task ID not found.")
            .with_detail("id", task_id));
    };
    task.status = TaskStatus::Open;
    task.raw = None;

    let index_path = tasks_index_path(library_root);
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ToolError::new(ErrorCode::WriteError, "Task index could not be created.")
                .with_detail("cause", err.to_string())
        })?;
    }
    let original_index = std::fs::read_to_string(&index_path).ok();
    let updated_index = bdl_fs::join_with_newline(
        original_index.as_deref().unwrap_or_default(),
        &format_task_line(&task),
    );

    let index_rel = std::path::PathBuf::from("pulse/index.md");
    let index_rollback = match &original_index {
        Some(content) => Rollback::RestoreFile {
            target: index_path.clone(),
            relative: index_rel.clone(),
            original: FileImage::Text(content.clone()),
        },
        None => Rollback::RemoveCreated {
            target: index_path.clone(),
            relative: index_rel.clone(),
        },
    };

    let mutation = Mutation::begin(library_root)?;
    write_atomic(
        &completed_path,
        &format!("{}\n", lines.join("\n").trim_end()),
        "pulse/completed",
    )?;
    write_atomic(&index_path, &updated_index, "pulse/index.md")?;
    let commit_sha = mutation.finish(
        &[completed_rel.clone(), index_rel.clone()],
        "reopen_task",
        &index_rel,
        "reopen task",
        Rollback::Many(vec![
            Rollback::RestoreFile {
                target: completed_path,
                relative: completed_rel,
                original: FileImage::Text(original_completed),
            },
            index_rollback,
        ]),
    )?;

    Ok(json!({"task": task, "commitSha": commit_sha}))
}
