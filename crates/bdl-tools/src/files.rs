//! Generic filesystem tool handlers: directories, metadata, path
//! move/copy/delete with previews, and binary writes.

use crate::common::modified_stamp;
use crate::markdown::{relative_of, write_atomic};
use crate::payload::{as_object, optional_bool, reject_unknown_fields, require_str};
use base64::Engine as _;
use bdl_engine::{Mutation, Rollback, build_path_mappings, collect_file_paths, remove_path};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_paths::validate_path;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// `create_directory` — with an optional committed `.gitkeep`.
pub fn create_directory(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "gitkeep"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    let gitkeep = optional_bool(payload, "gitkeep", false)?;

    let resolved = validate_path(library_root, raw_path)?;
    if resolved.exists() && !resolved.is_dir() {
        return Err(
            ToolError::new(ErrorCode::InvalidPath, "Path must reference a directory.")
                .with_detail("path", raw_path),
        );
    }
    std::fs::create_dir_all(&resolved).map_err(|err| {
        ToolError::new(ErrorCode::WriteError, "Directory could not be created.")
            .with_detail("path", raw_path)
            .with_detail("cause", err.to_string())
    })?;

    let mut commit_sha: Option<String> = None;
    if gitkeep {
        let gitkeep_path = resolved.join(".gitkeep");
        let relative = relative_of(library_root, &gitkeep_path);
        let mutation = Mutation::begin(library_root)?;
        if !gitkeep_path.exists() {
            write_atomic(&gitkeep_path, "", raw_path)?;
        }
        let sha = mutation.finish(
            std::slice::from_ref(&relative),
            "create_directory",
            &relative,
            "create directory",
            Rollback::RemoveCreated {
                target: gitkeep_path,
                relative: relative.clone(),
            },
        )?;
        commit_sha = Some(sha);
    }

    Ok(json!({"success": true, "commitSha": commit_sha}))
}

/// `list_directory` — files and directories, flat or recursive.
pub fn list_directory(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "recursive", "include_files", "include_dirs"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    let recursive = optional_bool(payload, "recursive", false)?;
    let include_files = optional_bool(payload, "include_files", true)?;
    let include_dirs = optional_bool(payload, "include_dirs", true)?;

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

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let walker = WalkDir::new(&resolved)
        .follow_links(false)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();
    for entry in walker.into_iter().flatten() {
        if entry.path_is_symlink() {
            continue;
        }
        let relative = bdl_engine::relative_posix(library_root, entry.path());
        if entry.file_type().is_dir() {
            if include_dirs {
                dirs.push(relative);
            }
        } else if entry.file_type().is_file() && include_files {
            files.push(relative);
        }
    }
    files.sort();
    dirs.sort();

    Ok(json!({"files": files, "directories": dirs}))
}

/// `read_file_metadata` — stat any file or directory.
pub fn read_file_metadata(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;

    let resolved = validate_path(library_root, raw_path)?;
    if !resolved.exists() {
        return Err(ToolError::new(ErrorCode::FileNotFound, "Path does not exist.")
            .with_detail("path", raw_path));
    }

    let stat = std::fs::metadata(&resolved).map_err(|err| {
        ToolError::new(ErrorCode::FileReadFailed, "File metadata could not be read.")
            .with_detail("path", raw_path)
            .with_detail("cause", err.to_string())
    })?;

    Ok(json!({
        "path": bdl_engine::relative_posix(library_root, &resolved),
        "isDir": resolved.is_dir(),
        "isFile": resolved.is_file(),
        "sizeBytes": stat.len(),
        "lastModified": modified_stamp(&stat),
        "gitHead": bdl_git::resolve_head_at(library_root),
    }))
}

fn resolve_move_pair<'a>(
    library_root: &Path,
    payload: &'a serde_json::Map<String, Value>,
) -> ToolResult<(&'a str, &'a str, PathBuf, PathBuf, bool)> {
    if !payload.contains_key("from_path") || !payload.contains_key("to_path") {
        return Err(ToolError::new(
            ErrorCode::MissingPath,
            "from_path and to_path are required.",
        )
        .with_detail("fields", ["from_path", "to_path"]));
    }
    let from_raw = require_str(payload, "from_path", ErrorCode::MissingPath, "Path is required.")?;
    let to_raw = require_str(payload, "to_path", ErrorCode::MissingPath, "Path is required.")?;
    let overwrite = optional_bool(payload, "overwrite", false)?;
    let source = validate_path(library_root, from_raw)?;
    let destination = validate_path(library_root, to_raw)?;
    if !source.exists() {
        return Err(
            ToolError::new(ErrorCode::FileNotFound, "Source path does not exist.")
                .with_detail("path", from_raw),
        );
    }
    Ok((from_raw, to_raw, source, destination, overwrite))
}

/// `move_path` — rename (with cross-device copy fallback) and commit the
/// union of pre- and post-paths.
pub fn move_path(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["from_path", "to_path", "overwrite"])?;
    let (_, to_raw, source, destination, overwrite) = resolve_move_pair(library_root, payload)?;

    if destination.exists() {
        if !overwrite {
            return Err(
                ToolError::new(ErrorCode::PathExists, "Destination already exists.")
                    .with_detail("path", to_raw),
            );
        }
        remove_path(&destination, true).map_err(|err| move_error(to_raw, &err))?;
    }

    let pre_paths = collect_file_paths(library_root, &source);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|err| move_error(to_raw, &err))?;
    }
    if std::fs::rename(&source, &destination).is_err() {
        // Cross-filesystem fallback.
        bdl_engine::copy_tree(&source, &destination).map_err(|err| move_error(to_raw, &err))?;
        remove_path(&source, true).map_err(|err| move_error(to_raw, &err))?;
    }
    let post_paths = collect_file_paths(library_root, &destination);

    let mut staged = pre_paths;
    for path in post_paths {
        if !staged.contains(&path) {
            staged.push(path);
        }
    }

    let destination_rel = relative_of(library_root, &destination);
    let mutation = Mutation::begin(library_root)?;
    let commit_sha = mutation.finish(
        &staged,
        "move_path",
        &destination_rel,
        "move path",
        Rollback::None,
    )?;

    Ok(json!({"success": true, "commitSha": commit_sha}))
}

/// `copy_path` — recursive copy and commit of the new paths.
pub fn copy_path(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["from_path", "to_path", "overwrite"])?;
    let (_, to_raw, source, destination, overwrite) = resolve_move_pair(library_root, payload)?;

    if destination.exists() {
        if !overwrite {
            return Err(
                ToolError::new(ErrorCode::PathExists, "Destination already exists.")
                    .with_detail("path", to_raw),
            );
        }
        remove_path(&destination, true).map_err(|err| move_error(to_raw, &err))?;
    }

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|err| move_error(to_raw, &err))?;
    }
    bdl_engine::copy_tree(&source, &destination).map_err(|err| move_error(to_raw, &err))?;
    let post_paths = collect_file_paths(library_root, &destination);

    let destination_rel = relative_of(library_root, &destination);
    let mutation = Mutation::begin(library_root)?;
    let commit_sha = mutation.finish(
        &post_paths,
        "copy_path",
        &destination_rel,
        "copy path",
        Rollback::None,
    )?;

    Ok(json!({"success": true, "commitSha": commit_sha}))
}

/// `delete_path` — confirmed (and for directories, recursive) delete.
pub fn delete_path(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "confirm", "recursive"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    if !optional_bool(payload, "confirm", false)? {
        return Err(ToolError::new(
            ErrorCode::ConfirmRequired,
            "Deletion requires explicit confirmation.",
        )
        .with_detail("path", raw_path));
    }
    let recursive = optional_bool(payload, "recursive", false)?;

    let target = validate_path(library_root, raw_path)?;
    if !target.exists() {
        return Err(ToolError::new(ErrorCode::FileNotFound, "Path does not exist.")
            .with_detail("path", raw_path));
    }
    if target.is_dir() && !recursive {
        return Err(ToolError::new(
            ErrorCode::RecursiveRequired,
            "Directory deletion requires recursive=true.",
        )
        .with_detail("path", raw_path));
    }

    let pre_paths = collect_file_paths(library_root, &target);
    remove_path(&target, recursive).map_err(|err| {
        ToolError::new(ErrorCode::WriteError, "Path could not be deleted.")
            .with_detail("path", raw_path)
            .with_detail("cause", err.to_string())
    })?;

    let target_rel = relative_of(library_root, &target);
    let mutation = Mutation::begin(library_root)?;
    let commit_sha = mutation.finish(
        &pre_paths,
        "delete_path",
        &target_rel,
        "delete path",
        Rollback::None,
    )?;

    Ok(json!({"success": true, "commitSha": commit_sha}))
}

/// `write_binary` — base64 payload written and committed.
pub fn write_binary(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "content_base64", "content_type"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    let content_base64 = require_str(
        payload,
        "content_base64",
        ErrorCode::MissingContent,
        "content_base64 is required.",
    )?;

    let content = base64::engine::general_purpose::STANDARD
        .decode(content_base64)
        .map_err(|_| {
            ToolError::new(ErrorCode::InvalidContent, "content_base64 must be valid base64.")
                .with_detail("path", raw_path)
        })?;

    let resolved = validate_path(library_root, raw_path)?;
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
    bdl_fs::atomic_write_bytes(&resolved, &content).map_err(|err| {
        ToolError::new(ErrorCode::WriteError, "File could not be written.")
            .with_detail("path", raw_path)
            .with_detail("cause", err.to_string())
    })?;
    let commit_sha = mutation.finish(
        std::slice::from_ref(&relative),
        "write_binary",
        &relative,
        "write binary",
        Rollback::RemoveCreated {
            target: resolved,
            relative: relative.clone(),
        },
    )?;

    Ok(json!({"success": true, "commitSha": commit_sha}))
}

/// `preview_move_path` — affected `{from,to}` mappings and conflicts.
pub fn preview_move_path(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    preview_transfer(library_root, payload)
}

/// `preview_copy_path` — same mapping shape as move previews.
pub fn preview_copy_path(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    preview_transfer(library_root, payload)
}

fn preview_transfer(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["from_path", "to_path", "overwrite"])?;
    let (_, _, source, destination, _) = resolve_move_pair(library_root, payload)?;

    let (mappings, conflicts) = build_path_mappings(library_root, &source, &destination);
    let file_count = mappings.len();
    Ok(json!({
        "mappings": mappings,
        "conflicts": conflicts,
        "summary": {"files": file_count},
    }))
}

/// `preview_delete_path` — paths a delete would remove.
pub fn preview_delete_path(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["path", "recursive"])?;
    let raw_path = require_str(payload, "path", ErrorCode::MissingPath, "Path is required.")?;
    let recursive = optional_bool(payload, "recursive", false)?;

    let target = validate_path(library_root, raw_path)?;
    if !target.exists() {
        return Err(ToolError::new(ErrorCode::FileNotFound, "Path does not exist.")
            .with_detail("path", raw_path));
    }
    if target.is_dir() && !recursive {
        return Err(ToolError::new(
            ErrorCode::RecursiveRequired,
            "Directory deletion requires recursive=true.",
        )
        .with_detail("path", raw_path));
    }

    let paths: Vec<String> = collect_file_paths(library_root, &target)
        .iter()
        .map(|path| path.to_string_lossy().replace('\\', "/"))
        .collect();
    let file_count = paths.len();
    Ok(json!({
        "paths": paths,
        "summary": {"files": file_count},
    }))
}

fn move_error(raw_path: &str, err: &std::io::Error) -> ToolError {
    ToolError::new(ErrorCode::WriteError, "Path operation failed.")
        .with_detail("path", raw_path)
        .with_detail("cause", err.to_string())
}
