//! Project and scope-scaffold tool handlers.

use crate::common::{build_metadata, read_markdown_text};
use crate::markdown::{relative_of, write_atomic};
use crate::payload::{as_object, json_type_name, reject_unknown_fields};
use bdl_engine::{Mutation, Rollback};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_paths::validate_path;
use bdl_schema::{default_project_files, scope_default_files};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Resolve the `path` / `name` pair shared by the project tools: a bare name
/// lands under `projects/active/`, a slash-bearing name is treated as a path.
fn resolve_project_path(payload: &Map<String, Value>) -> ToolResult<String> {
    if !payload.contains_key("path") && !payload.contains_key("name") {
        return Err(ToolError::new(ErrorCode::MissingPath, "Path or name is required.")
            .with_detail("fields", ["path", "name"]));
    }

    if let Some(raw) = payload.get("path") {
        let raw = raw.as_str().ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "Path must be a string.")
                .with_detail("path", raw.to_string())
                .with_detail("type", json_type_name(raw))
        })?;
        return Ok(raw.to_string());
    }

    let name = payload.get("name").expect("checked above");
    let name = name.as_str().ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidType, "Name must be a string.")
            .with_detail("name", name.to_string())
            .with_detail("type", json_type_name(name))
    })?;
    if name.trim().is_empty() {
        return Err(
            ToolError::new(ErrorCode::InvalidName, "Name must be a non-empty string.")
                .with_detail("name", name),
        );
    }
    if name.contains('/') || name.contains('\\') {
        Ok(name.to_string())
    } else {
        Ok(format!("projects/active/{name}"))
    }
}

/// `project_exists` — probe the candidate directories for a project.
pub fn project_exists(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "name"])?;
    if !payload.contains_key("path") && !payload.contains_key("name") {
        return Err(ToolError::new(ErrorCode::MissingPath, "Path or name is required.")
            .with_detail("fields", ["path", "name"]));
    }

    let candidates: Vec<String> = if let Some(raw) = payload.get("path") {
        let raw = raw.as_str().ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "Path must be a string.")
                .with_detail("path", raw.to_string())
                .with_detail("type", json_type_name(raw))
        })?;
        vec![raw.to_string()]
    } else {
        let name = payload.get("name").expect("checked above");
        let name = name.as_str().ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "Name must be a string.")
                .with_detail("name", name.to_string())
                .with_detail("type", json_type_name(name))
        })?;
        if name.trim().is_empty() {
            return Err(
                ToolError::new(ErrorCode::InvalidName, "Name must be a non-empty string.")
                    .with_detail("name", name),
            );
        }
        if name.contains('/') || name.contains('\\') {
            vec![name.to_string()]
        } else {
            vec![format!("projects/active/{name}"), format!("projects/{name}")]
        }
    };

    let mut checked_paths = Vec::new();
    let mut conflict_paths = Vec::new();
    let mut found_path: Option<String> = None;
    for candidate in &candidates {
        let resolved = validate_path(library_root, candidate)?;
        if bdl_markdown::is_markdown_path(&resolved) {
            return Err(ToolError::new(
                ErrorCode::InvalidPath,
                "Project path must be a directory, not a markdown file.",
            )
            .with_detail("path", candidate));
        }
        let relative = bdl_engine::relative_posix(library_root, &resolved);
        checked_paths.push(relative.clone());
        if resolved.exists() {
            if resolved.is_dir() {
                found_path = Some(relative);
                break;
            }
            conflict_paths.push(relative);
        }
    }

    let exists = found_path.is_some();
    let conflict = !conflict_paths.is_empty() && !exists;
    let relative_path = found_path.unwrap_or_else(|| checked_paths[0].clone());

    Ok(json!({
        "path": relative_path,
        "exists": exists,
        "isDir": exists,
        "conflict": conflict,
        "checkedPaths": checked_paths,
        "conflictPaths": conflict_paths,
    }))
}

/// `list_projects` — directories under a path (defaults to projects/active).
pub fn list_projects(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path"])?;

    let raw_path = match payload.get("path") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_str().ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "Path must be a string.")
                .with_detail("path", value.to_string())
                .with_detail("type", json_type_name(value))
        })?),
    };

    let candidates: Vec<&str> = match raw_path {
        Some(path) => vec![path],
        None => vec!["projects/active", "projects"],
    };

    let mut resolved_path: Option<PathBuf> = None;
    for candidate in &candidates {
        let resolved = validate_path(library_root, candidate)?;
        if !resolved.exists() {
            continue;
        }
        if !resolved.is_dir() {
            return Err(ToolError::new(
                ErrorCode::InvalidPath,
                "Path must reference a directory.",
            )
            .with_detail("path", *candidate));
        }
        resolved_path = Some(resolved);
        break;
    }

    let Some(resolved) = resolved_path else {
        return Err(ToolError::new(ErrorCode::FileNotFound, "Path does not exist.")
            .with_detail("path", candidates[0]));
    };

    let mut projects = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(&resolved)
        .map_err(|err| {
            ToolError::new(ErrorCode::FileReadFailed, "Directory could not be read.")
                .with_detail("path", candidates[0])
                .with_detail("cause", err.to_string())
        })?
        .flatten()
        .collect();
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(_) => continue,
        };
        if file_type.is_symlink() || !file_type.is_dir() {
            continue;
        }
        projects.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "path": bdl_engine::relative_posix(library_root, &entry.path()),
        }));
    }

    Ok(json!({"projects": projects}))
}

fn validated_file_entries(payload: &Map<String, Value>) -> ToolResult<Vec<(String, String)>> {
    let files_payload = match payload.get("files") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(value) => value.as_array().ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "Files must be a list.")
                .with_detail("files", value.to_string())
                .with_detail("type", json_type_name(value))
        })?,
    };

    let mut validated = Vec::new();
    let mut provided: BTreeSet<String> = BTreeSet::new();
    for entry in files_payload {
        let entry = entry.as_object().ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "File entries must be objects.")
                .with_detail("file", entry.to_string())
                .with_detail("type", json_type_name(entry))
        })?;
        reject_unknown_fields(entry, &["path", "content"])?;
        let file_path = crate::payload::require_str(
            entry,
            "path",
            ErrorCode::MissingPath,
            "File path is required.",
        )?;
        let content = crate::payload::require_str(
            entry,
            "content",
            ErrorCode::MissingContent,
            "File content is required.",
        )?;

        let normalized = file_path.replace('\\', "/").trim_matches('/').to_string();
        let normalized_key = normalized.to_lowercase();
        if !provided.insert(normalized_key) {
            return Err(ToolError::new(
                ErrorCode::DuplicateFiles,
                "Duplicate file paths are not allowed.",
            )
            .with_detail("path", normalized));
        }
        validated.push((normalized, content.to_string()));
    }
    Ok(validated)
}

fn merge_scope_required_files(
    raw_path: &str,
    provided: Vec<(String, String)>,
) -> Vec<(String, String)> {
    let defaults = scope_default_files(raw_path);
    if provided.is_empty() {
        return defaults;
    }

    let provided_lower: BTreeSet<String> = provided
        .iter()
        .map(|(path, _)| path.to_lowercase())
        .collect();
    let mut merged = provided;
    for (filename, content) in defaults {
        if provided_lower.contains(&filename.to_lowercase()) {
            continue;
        }
        merged.push((filename, content));
    }
    merged
}

/// `create_project` — batch-create a project directory and its files.
pub fn create_project(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "files", "name"])?;
    let raw_path = resolve_project_path(payload)?;

    let resolved_project = validate_path(library_root, &raw_path)?;
    if bdl_markdown::is_markdown_path(&resolved_project) {
        return Err(ToolError::new(
            ErrorCode::InvalidPath,
            "Project path must be a directory, not a markdown file.",
        )
        .with_detail("path", raw_path));
    }
    if resolved_project.exists() {
        if resolved_project.is_dir() {
            return Err(ToolError::new(ErrorCode::ProjectExists, "Project already exists.")
                .with_detail("path", raw_path));
        }
        return Err(ToolError::new(
            ErrorCode::InvalidPath,
            "Project path conflicts with a non-directory.",
        )
        .with_detail("path", raw_path));
    }
    if let Some(parent) = resolved_project.parent() {
        if parent.exists() && !parent.is_dir() {
            return Err(ToolError::new(
                ErrorCode::InvalidPath,
                "Project parent path must be a directory.",
            )
            .with_detail("path", raw_path));
        }
    }

    let merged_files = merge_scope_required_files(&raw_path, validated_file_entries(payload)?);

    let mut resolved_files: Vec<(PathBuf, String)> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for (file_path, content) in merged_files {
        let combined = format!("{}/{}", raw_path.trim_end_matches('/'), file_path);
        let resolved_file = validate_path(library_root, &combined)?;
        if !bdl_markdown::is_markdown_path(&resolved_file) {
            return Err(
                ToolError::new(ErrorCode::NotMarkdown, "Only markdown files are allowed.")
                    .with_detail("path", combined),
            );
        }
        let relative = bdl_engine::relative_posix(library_root, &resolved_file);
        if !seen.insert(relative.clone()) {
            return Err(ToolError::new(
                ErrorCode::DuplicateFiles,
                "Duplicate file paths are not allowed.",
            )
            .with_detail("path", relative));
        }
        if resolved_file.exists() {
            return Err(
                ToolError::new(ErrorCode::FileExists, "Markdown file already exists.")
                    .with_detail("path", relative),
            );
        }
        resolved_files.push((resolved_file, content));
    }

    std::fs::create_dir_all(&resolved_project).map_err(|err| {
        ToolError::new(ErrorCode::WriteError, "Project directory could not be created.")
            .with_detail("path", raw_path.clone())
            .with_detail("cause", err.to_string())
    })?;

    let mut created_files: Vec<PathBuf> = Vec::new();
    for (resolved_file, content) in &resolved_files {
        if let Some(parent) = resolved_file.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                unwind_created(&created_files, &resolved_project);
                return Err(ToolError::new(ErrorCode::WriteError, "Failed to create project.")
                    .with_detail("path", raw_path)
                    .with_detail("cause", err.to_string()));
            }
        }
        if let Err(err) = write_atomic(resolved_file, content, &raw_path) {
            unwind_created(&created_files, &resolved_project);
            return Err(err);
        }
        created_files.push(resolved_file.clone());
    }

    let relative_paths: Vec<PathBuf> = created_files
        .iter()
        .map(|file| relative_of(library_root, file))
        .collect();
    let project_relative = relative_of(library_root, &resolved_project);

    let mutation = Mutation::begin(library_root)?;
    let commit_sha = mutation.finish(
        &relative_paths,
        "create_project",
        &project_relative,
        "create project",
        Rollback::RemoveCreatedTree {
            files: created_files.clone(),
            root: Some(resolved_project.clone()),
            relatives: relative_paths.clone(),
        },
    )?;

    let created_relative: Vec<String> = relative_paths
        .iter()
        .map(|path| path.to_string_lossy().replace('\\', "/"))
        .collect();
    Ok(json!({
        "success": true,
        "commitSha": commit_sha,
        "path": project_relative.to_string_lossy().replace('\\', "/"),
        "createdFiles": created_relative,
    }))
}

/// `create_project_scaffold` — create_project with the default file set.
pub fn create_project_scaffold(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "name"])?;
    let raw_path = resolve_project_path(payload)?;

    let files: Vec<Value> = default_project_files()
        .into_iter()
        .map(|(path, content)| json!({"path": path, "content": content}))
        .collect();
    create_project(library_root, &json!({"path": raw_path, "files": files}))
}

/// `ensure_scope_scaffold` — create the canonical files a scope is missing.
pub fn ensure_scope_scaffold(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "name"])?;
    let raw_path = resolve_project_path(payload)?;

    let scope_root = validate_path(library_root, &raw_path)?;
    if bdl_markdown::is_markdown_path(&scope_root) {
        return Err(ToolError::new(
            ErrorCode::InvalidPath,
            "Scope path must be a directory, not a markdown file.",
        )
        .with_detail("path", raw_path));
    }
    if scope_root.exists() && !scope_root.is_dir() {
        return Err(ToolError::new(
            ErrorCode::InvalidPath,
            "Scope path conflicts with a non-directory.",
        )
        .with_detail("path", raw_path));
    }

    let scope_preexisting = scope_root.exists();
    std::fs::create_dir_all(&scope_root).map_err(|err| {
        ToolError::new(ErrorCode::WriteError, "Failed to scaffold scope.")
            .with_detail("path", raw_path.clone())
            .with_detail("cause", err.to_string())
    })?;

    let scope_relative = relative_of(library_root, &scope_root);
    let scope_rel_posix = scope_relative.to_string_lossy().replace('\\', "/");

    let mut created_files: Vec<PathBuf> = Vec::new();
    for (filename, content) in scope_default_files(&scope_rel_posix) {
        let combined = format!("{scope_rel_posix}/{filename}");
        let target = validate_path(library_root, &combined)?;
        if target.exists() {
            continue;
        }
        if let Some(parent) = target.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                unwind_scaffold(&created_files, &scope_root, scope_preexisting);
                return Err(ToolError::new(ErrorCode::WriteError, "Failed to scaffold scope.")
                    .with_detail("path", raw_path)
                    .with_detail("cause", err.to_string()));
            }
        }
        if let Err(err) = write_atomic(&target, &content, &raw_path) {
            unwind_scaffold(&created_files, &scope_root, scope_preexisting);
            return Err(err);
        }
        created_files.push(target);
    }

    if created_files.is_empty() {
        return Ok(json!({
            "success": true,
            "path": scope_rel_posix,
            "createdFiles": [],
            "commitSha": null,
        }));
    }

    let relative_paths: Vec<PathBuf> = created_files
        .iter()
        .map(|file| relative_of(library_root, file))
        .collect();
    let mutation = Mutation::begin(library_root)?;
    let commit_sha = mutation.finish(
        &relative_paths,
        "ensure_scope_scaffold",
        &scope_relative,
        "ensure scope scaffold",
        Rollback::RemoveCreatedTree {
            files: created_files,
            root: (!scope_preexisting).then(|| scope_root.clone()),
            relatives: relative_paths.clone(),
        },
    )?;

    let created_relative: Vec<String> = relative_paths
        .iter()
        .map(|path| path.to_string_lossy().replace('\\', "/"))
        .collect();
    Ok(json!({
        "success": true,
        "commitSha": commit_sha,
        "path": scope_rel_posix,
        "createdFiles": created_relative,
    }))
}

/// `project_context` — key project files, metadata, missing list, optional
/// transcript index.
pub fn project_context(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "name", "include_files", "include_transcripts"])?;
    let raw_path = resolve_project_path(payload)?;
    let resolved_root = validate_path(library_root, &raw_path)?;

    if !resolved_root.exists() || !resolved_root.is_dir() {
        return Err(
            ToolError::new(ErrorCode::FileNotFound, "Project path does not exist.")
                .with_detail("path", bdl_engine::relative_posix(library_root, &resolved_root)),
        );
    }

    let include_files: Vec<String> = match payload.get("include_files") {
        None | Some(Value::Null) => default_project_files()
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect(),
        Some(value) => {
            let items = value.as_array().ok_or_else(|| {
                ToolError::new(ErrorCode::InvalidType, "include_files must be a list.")
                    .with_detail("include_files", value.to_string())
            })?;
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        }
    };

    let mut files = Vec::new();
    let mut missing = Vec::new();
    for relative_name in include_files {
        let target = resolved_root.join(&relative_name);
        if !target.exists() {
            missing.push(bdl_engine::relative_posix(library_root, &target));
            continue;
        }
        if !target.is_file() {
            continue;
        }
        let relative = bdl_engine::relative_posix(library_root, &target);
        let Ok(content) = read_markdown_text(&target, &relative) else {
            continue;
        };
        let metadata = build_metadata(library_root, &target)?;
        files.push(json!({
            "path": relative,
            "content": content,
            "metadata": metadata,
        }));
    }

    let mut transcripts: Vec<String> = Vec::new();
    if crate::payload::optional_bool(payload, "include_transcripts", false)? {
        let transcripts_root = library_root.join("transcripts");
        if transcripts_root.exists() {
            transcripts = WalkDir::new(&transcripts_root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .flatten()
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| bdl_engine::relative_posix(library_root, entry.path()))
                .collect();
            transcripts.sort();
        }
    }

    Ok(json!({"files": files, "missing": missing, "transcripts": transcripts}))
}

fn unwind_created(created_files: &[PathBuf], project_root: &Path) {
    for file in created_files {
        let _ = std::fs::remove_file(file);
    }
    let _ = std::fs::remove_dir_all(project_root);
}

fn unwind_scaffold(created_files: &[PathBuf], scope_root: &Path, preexisting: bool) {
    for file in created_files {
        let _ = std::fs::remove_file(file);
    }
    if !preexisting {
        let _ = std::fs::remove_dir_all(scope_root);
    }
}
