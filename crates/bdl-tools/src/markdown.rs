//! Markdown tool handlers.

use crate::common::{
    build_metadata, collect_markdown_files, read_markdown_text, resolve_existing_markdown_file,
    resolve_markdown_path,
};
use crate::payload::{as_object, optional_bool, reject_unknown_fields, require_str};
use bdl_engine::{Mutation, Rollback};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_git::FileImage;
use bdl_markdown::{
    EditOperation, activity_summary, apply_edit, apply_preview, apply_write, parse_operation,
    preview_summary, risk_level, unified_diff,
};
use bdl_paths::validate_path;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

/// `read_markdown` — content plus metadata.
pub fn read_markdown(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;

    let resolved = resolve_existing_markdown_file(library_root, raw_path)?;
    let content = read_markdown_text(&resolved, raw_path)?;
    let metadata = build_metadata(library_root, &resolved)?;
    Ok(json!({"content": content, "metadata": metadata}))
}

/// `list_markdown_files` — recursive listing under a directory.
pub fn list_markdown_files(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;

    let resolved = validate_path(library_root, raw_path)?;
    if !resolved.exists() {
        return Err(ToolError::new(ErrorCode::FileNotFound, "Path does not exist.")
            .with_detail("path", raw_path));
    }
    if !resolved.is_dir() {
        return Err(
            ToolError::new(ErrorCode::InvalidPath, "Path must reference a directory.")
                .with_detail("path", raw_path),
        );
    }

    Ok(json!({"files": collect_markdown_files(library_root, &resolved)}))
}

/// `search_markdown` — substring search with line snippets.
pub fn search_markdown(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["query", "path"])?;
    let query = require_str(payload, "query", ErrorCode::MissingQuery, "Query is required.")?;
    if query.trim().is_empty() {
        return Err(
            ToolError::new(ErrorCode::InvalidQuery, "Query must be a non-empty string.")
                .with_detail("query", query),
        );
    }

    let mut search_files: Vec<PathBuf> = Vec::new();
    let mut search_root = library_root.to_path_buf();
    if let Some(raw_path) = payload.get("path") {
        let raw_path = raw_path.as_str().ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "path must be a string.")
                .with_detail("path", raw_path.to_string())
        })?;
        let resolved = validate_path(library_root, raw_path)?;
        if !resolved.exists() {
            return Err(ToolError::new(ErrorCode::FileNotFound, "Path does not exist.")
                .with_detail("path", raw_path));
        }
        if resolved.is_file() {
            if !bdl_markdown::is_markdown_path(&resolved) {
                return Err(ToolError::new(
                    ErrorCode::NotMarkdown,
                    "Only markdown files are allowed.",
                )
                .with_detail("path", raw_path));
            }
            search_files.push(resolved);
        } else if resolved.is_dir() {
            search_root = resolved;
        } else {
            return Err(ToolError::new(
                ErrorCode::InvalidPath,
                "Path must reference a file or directory.",
            )
            .with_detail("path", raw_path));
        }
    }

    if search_files.is_empty() {
        search_files = collect_markdown_files(library_root, &search_root)
            .into_iter()
            .map(|relative| library_root.join(relative))
            .collect();
    }

    let mut results = Vec::new();
    for file in search_files {
        let relative = bdl_engine::relative_posix(library_root, &file);
        let content = read_markdown_text(&file, &relative)?;
        let matches: Vec<Value> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains(query))
            .map(|(index, line)| json!({"line": index + 1, "snippet": line}))
            .collect();
        if !matches.is_empty() {
            results.push(json!({"path": relative, "matches": matches}));
        }
    }
    Ok(json!({"results": results}))
}

/// `create_markdown` — new file through the full pipeline.
pub fn create_markdown(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "content"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    let content = require_str(
        payload,
        "content",
        ErrorCode::MissingContent,
        "Content is required.",
    )?;

    let resolved = resolve_markdown_path(library_root, raw_path)?;
    if resolved.exists() {
        return Err(ToolError::new(ErrorCode::PathExists, "Path already exists.")
            .with_detail("path", raw_path));
    }
    if let Some(parent) = resolved.parent() {
        if parent.exists() && !parent.is_dir() {
            return Err(ToolError::new(
                ErrorCode::InvalidPath,
                "Parent path must be a directory.",
            )
            .with_detail("path", raw_path));
        }
        std::fs::create_dir_all(parent).map_err(|err| {
            ToolError::new(ErrorCode::WriteError, "Parent directory could not be created.")
                .with_detail("path", raw_path)
                .with_detail("cause", err.to_string())
        })?;
    }

    let relative = relative_of(library_root, &resolved);
    let mutation = Mutation::begin(library_root)?;
    write_atomic(&resolved, content, raw_path)?;
    let commit_sha = mutation.finish(
        std::slice::from_ref(&relative),
        "create_markdown",
        &relative,
        "create file",
        Rollback::RemoveCreated {
            target: resolved,
            relative: relative.clone(),
        },
    )?;

    Ok(json!({"success": true, "commitSha": commit_sha}))
}

/// `preview_markdown_change` — diff without mutating.
pub fn preview_markdown_change(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "operation"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    let operation = payload.get("operation").ok_or_else(|| {
        ToolError::new(ErrorCode::MissingOperation, "Operation is required.")
            .with_detail("fields", ["operation"])
    })?;
    let operation = parse_operation(operation)?;

    let resolved = resolve_existing_markdown_file(library_root, raw_path)?;
    let current = read_markdown_text(&resolved, raw_path)?;

    let (updated, kind, target) = apply_preview(&current, &operation)?;
    let relative = bdl_engine::relative_posix(library_root, &resolved);
    let (diff, added, removed) = unified_diff(&current, &updated, &relative);
    let summary = preview_summary(kind.as_str(), target.as_deref(), added, removed);

    Ok(json!({
        "diff": diff,
        "summary": summary,
        "riskLevel": risk_level(added, removed),
    }))
}

/// `preview_bulk_changes` — heterogeneous change list with aggregate risk.
pub fn preview_bulk_changes(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["changes"])?;
    let changes = payload
        .get("changes")
        .ok_or_else(|| {
            ToolError::new(ErrorCode::MissingChanges, "changes is required.")
                .with_detail("fields", ["changes"])
        })?
        .as_array()
        .ok_or_else(|| ToolError::new(ErrorCode::InvalidType, "changes must be a list."))?;

    let mut results = Vec::new();
    let mut total_added = 0usize;
    let mut total_removed = 0usize;

    for change in changes {
        let change = change.as_object().ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "Each change must be an object.")
                .with_detail("change", change.to_string())
        })?;
        reject_unknown_fields(change, &["path", "action", "operation", "content"])?;
        if !change.contains_key("path") || !change.contains_key("action") {
            return Err(ToolError::new(
                ErrorCode::MissingFields,
                "Each change requires path and action.",
            )
            .with_detail("fields", ["path", "action"]));
        }

        let raw_path = require_str(change, "path", ErrorCode::MissingPath, "Path is required.")?;
        let action = require_str(change, "action", ErrorCode::InvalidType, "action is required.")?
            .to_ascii_lowercase();
        if !matches!(action.as_str(), "create" | "write" | "edit" | "delete") {
            return Err(ToolError::new(
                ErrorCode::InvalidAction,
                "action must be one of create/write/edit/delete.",
            )
            .with_detail("action", action));
        }

        let resolved = resolve_markdown_path(library_root, raw_path)?;
        let mut current = String::new();
        if resolved.exists() {
            if !resolved.is_file() {
                return Err(ToolError::new(
                    ErrorCode::InvalidPath,
                    "Path must reference a file.",
                )
                .with_detail("path", raw_path));
            }
            current = read_markdown_text(&resolved, raw_path)?;
        }

        let (updated, summary) = match action.as_str() {
            "create" => {
                if resolved.exists() {
                    return Err(ToolError::new(ErrorCode::PathExists, "Path already exists.")
                        .with_detail("path", raw_path));
                }
                let content = change.get("content").and_then(Value::as_str).ok_or_else(|| {
                    ToolError::new(ErrorCode::MissingContent, "content is required for create.")
                        .with_detail("path", raw_path)
                })?;
                (content.to_string(), "create file".to_string())
            }
            "delete" => {
                if !resolved.exists() {
                    return Err(ToolError::new(
                        ErrorCode::FileNotFound,
                        "Markdown file does not exist.",
                    )
                    .with_detail("path", raw_path));
                }
                (String::new(), "delete file".to_string())
            }
            "write" | "edit" => {
                if !resolved.exists() {
                    return Err(ToolError::new(
                        ErrorCode::FileNotFound,
                        "Markdown file does not exist.",
                    )
                    .with_detail("path", raw_path));
                }
                let operation = change.get("operation").ok_or_else(|| {
                    ToolError::new(
                        ErrorCode::MissingOperation,
                        format!("operation is required for {action}."),
                    )
                    .with_detail("path", raw_path)
                })?;
                let operation = parse_operation(operation)?;
                let updated = if action == "write" {
                    apply_write(&current, &operation)?
                } else {
                    apply_edit(&current, &operation)?
                };
                let summary =
                    preview_summary(&operation.kind, operation.target.as_deref(), 0, 0);
                (updated, summary)
            }
            _ => unreachable!("action validated above"),
        };

        let relative = bdl_engine::relative_posix(library_root, &resolved);
        let (diff, added, removed) = unified_diff(&current, &updated, &relative);
        total_added += added;
        total_removed += removed;
        results.push(json!({
            "path": relative,
            "action": action,
            "summary": summary,
            "diff": diff,
            "riskLevel": risk_level(added, removed),
            "added": added,
            "removed": removed,
        }));
    }

    Ok(json!({
        "changes": results,
        "summary": {
            "added": total_added,
            "removed": total_removed,
            "riskLevel": risk_level(total_added, total_removed),
        },
    }))
}

/// `write_markdown` — append/prepend through the pipeline.
pub fn write_markdown(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    apply_markdown_mutation(library_root, payload, "write_markdown", apply_write)
}

/// `edit_markdown` — section-aware edit through the pipeline.
pub fn edit_markdown(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    apply_markdown_mutation(library_root, payload, "edit_markdown", apply_edit)
}

fn apply_markdown_mutation(
    library_root: &Path,
    payload: &Value,
    operation_name: &str,
    apply: fn(&str, &EditOperation) -> ToolResult<String>,
) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "operation"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    let operation = payload.get("operation").ok_or_else(|| {
        ToolError::new(ErrorCode::MissingOperation, "Operation is required.")
            .with_detail("fields", ["operation"])
    })?;
    let operation = parse_operation(operation)?;

    let resolved = resolve_existing_markdown_file(library_root, raw_path)?;
    let current = read_markdown_text(&resolved, raw_path)?;
    let updated = apply(&current, &operation)?;

    let relative = relative_of(library_root, &resolved);
    let summary = activity_summary(operation_name, Some(&operation));
    let mutation = Mutation::begin(library_root)?;
    write_atomic(&resolved, &updated, raw_path)?;
    let commit_sha = mutation.finish(
        std::slice::from_ref(&relative),
        operation_name,
        &relative,
        &summary,
        Rollback::RestoreFile {
            target: resolved,
            relative: relative.clone(),
            original: FileImage::Text(current),
        },
    )?;

    Ok(json!({"success": true, "commitSha": commit_sha}))
}

/// `delete_markdown` — confirmed delete through the pipeline.
pub fn delete_markdown(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "confirm"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    let resolved = validate_path(library_root, raw_path)?;

    if !optional_bool(payload, "confirm", false)? {
        return Err(ToolError::new(
            ErrorCode::ConfirmRequired,
            "Deletion requires explicit confirmation.",
        )
        .with_detail("path", raw_path));
    }

    if !bdl_markdown::is_markdown_path(&resolved) {
        return Err(
            ToolError::new(ErrorCode::NotMarkdown, "Only markdown files are allowed.")
                .with_detail("path", raw_path),
        );
    }
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

    let original = bdl_engine::read_pre_image(&resolved, raw_path)?;
    let relative = relative_of(library_root, &resolved);
    let mutation = Mutation::begin(library_root)?;
    std::fs::remove_file(&resolved).map_err(|err| {
        ToolError::new(ErrorCode::WriteError, "Markdown file could not be deleted.")
            .with_detail("path", raw_path)
            .with_detail("cause", err.to_string())
    })?;
    let commit_sha = mutation.finish(
        std::slice::from_ref(&relative),
        "delete_markdown",
        &relative,
        "delete file",
        Rollback::RestoreFile {
            target: resolved,
            relative: relative.clone(),
            original: FileImage::Bytes(original),
        },
    )?;

    Ok(json!({"success": true, "commitSha": commit_sha}))
}

pub(crate) fn relative_of(library_root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(library_root).unwrap_or(path).to_path_buf()
}

pub(crate) fn write_atomic(path: &Path, content: &str, raw_path: &str) -> ToolResult<()> {
    bdl_fs::atomic_write(path, content).map_err(|err| {
        ToolError::new(ErrorCode::WriteError, "File could not be written.")
            .with_detail("path", raw_path)
            .with_detail("cause", err.to_string())
    })
}
