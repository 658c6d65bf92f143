//! Transcript ingestion handler.

use crate::markdown::{relative_of, write_atomic};
use crate::payload::{as_object, optional_str, reject_unknown_fields, require_str};
use bdl_engine::{Mutation, Rollback};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_git::FileImage;
use bdl_paths::validate_path;
use chrono::Utc;
use serde_json::{Value, json};
use std::path::Path;

/// `ingest_transcript` — store the transcript under `transcripts/YYYY-MM/`
/// and append a line to the transcripts index, committed together.
pub fn ingest_transcript(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["content", "filename", "date", "project", "source"])?;
    let content = require_str(
        payload,
        "content",
        ErrorCode::MissingContent,
        "content is required.",
    )?;

    let date_value = optional_str(payload, "date")?
        .map(String::from)
        .unwrap_or_else(|| Utc::now().date_naive().to_string());
    let parsed_date = crate::common::parse_iso_datetime(&date_value).ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidDate, "date must be ISO format (YYYY-MM-DD).")
            .with_detail("date", date_value.clone())
    })?;

    let folder = parsed_date.format("%Y-%m").to_string();
    let filename = match optional_str(payload, "filename")? {
        Some(filename) => filename.to_string(),
        None => format!("transcript-{}.md", parsed_date.format("%Y%m%d-%H%M%S")),
    };

    // The combined path goes through containment validation so a crafted
    // filename cannot escape the transcripts subtree.
    let transcript_path = validate_path(library_root, &format!("transcripts/{folder}/{filename}"))?;
    if let Some(parent) = transcript_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ToolError::new(ErrorCode::WriteError, "Transcript folder could not be created.")
                .with_detail("cause", err.to_string())
        })?;
    }
    let transcript_rel = relative_of(library_root, &transcript_path);
    let transcript_rel_posix = transcript_rel.to_string_lossy().replace('\\', "/");

    let index_path = library_root.join("transcripts").join("index.md");
    let index_rel = relative_of(library_root, &index_path);
    let original_index = std::fs::read_to_string(&index_path).ok();

    let mut entry_parts = vec![date_value.clone(), transcript_rel_posix.clone()];
    if let Some(project) = optional_str(payload, "project")? {
        entry_parts.push(format!("project:{project}"));
    }
    if let Some(source) = optional_str(payload, "source")? {
        entry_parts.push(format!("source:{source}"));
    }
    let updated_index = bdl_fs::join_with_newline(
        original_index.as_deref().unwrap_or_default(),
        &entry_parts.join(" - "),
    );

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
    write_atomic(&transcript_path, content, &transcript_rel_posix)?;
    write_atomic(&index_path, &updated_index, "transcripts/index.md")?;
    let commit_sha = mutation.finish(
        &[transcript_rel.clone(), index_rel.clone()],
        "ingest_transcript",
        &transcript_rel.clone(),
        "ingest transcript",
        Rollback::Many(vec![
            Rollback::RemoveCreated {
                target: transcript_path,
                relative: transcript_rel,
            },
            index_rollback,
        ]),
    )?;

    Ok(json!({
        "success": true,
        "commitSha": commit_sha,
        "path": transcript_rel_posix,
    }))
}
