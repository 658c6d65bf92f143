//! Onboarding and bootstrap tool handlers.

use crate::payload::{as_object, optional_str, reject_unknown_fields, require_str};
use bdl_engine::{Mutation, Rollback};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_schema::{TopicPhase, read_onboarding_state};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

/// Commit and journal a batch of already-written paths, returning `None`
/// when nothing changed. Bootstrap-style writes are idempotent on disk, so
/// there is no filesystem rollback.
fn commit_changed(
    library_root: &Path,
    changed_paths: &[PathBuf],
    operation: &str,
    target: &Path,
    summary: &str,
) -> ToolResult<Option<String>> {
    if changed_paths.is_empty() {
        return Ok(None);
    }
    let mutation = Mutation::begin(library_root)?;
    let sha = mutation.finish(changed_paths, operation, target, summary, Rollback::None)?;
    Ok(Some(sha))
}

/// `bootstrap_user_library` — idempotent schema projection + commit.
pub fn bootstrap_user_library(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &[])?;

    let result = bdl_schema::bootstrap_library(library_root)?;
    let commit_sha = commit_changed(
        library_root,
        &result.changed_paths,
        "bootstrap_user_library",
        Path::new(".braindrive/onboarding_state.json"),
        "bootstrap user library",
    )?;

    let changed_paths: Vec<String> = result
        .changed_paths
        .iter()
        .map(|path| path.to_string_lossy().replace('\\', "/"))
        .collect();
    Ok(json!({
        "changed": result.changed(),
        "changed_paths": changed_paths,
        "commitSha": commit_sha,
    }))
}

/// `get_onboarding_state` — current normalised state plus the next topic.
pub fn get_onboarding_state(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &[])?;

    let state = read_onboarding_state(library_root);
    let next_topic = state.next_incomplete_topic();
    Ok(json!({"state": state, "next_topic": next_topic}))
}

/// `start_topic_onboarding` — start event plus interview seed.
pub fn start_topic_onboarding(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["topic"])?;
    let topic = require_str(payload, "topic", ErrorCode::MissingTopic, "topic is required.")?;

    let outcome = bdl_onboarding::start_topic(library_root, topic)?;
    let commit_sha = commit_changed(
        library_root,
        &outcome.changed_paths,
        "start_topic_onboarding",
        Path::new(&format!("life/{}/interview.md", outcome.topic)),
        &format!("start topic onboarding ({})", outcome.topic),
    )?;

    Ok(json!({
        "topic": outcome.topic,
        "status": outcome.status,
        "interview_seed": outcome.interview_seed,
        "next_topic": outcome.next_topic,
        "commitSha": commit_sha,
    }))
}

/// `save_topic_onboarding_context` — approved interview context write.
pub fn save_topic_onboarding_context(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["topic", "context", "approved", "phase"])?;

    let missing: Vec<&str> = ["topic", "context", "approved"]
        .into_iter()
        .filter(|field| !payload.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(ToolError::new(
            ErrorCode::MissingFields,
            "topic, context, and approved are required.",
        )
        .with_detail("fields", missing));
    }

    let topic = require_str(payload, "topic", ErrorCode::MissingTopic, "topic is required.")?;
    let context = payload.get("context").expect("checked above");
    let context = context.as_str().ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidType, "context must be a non-empty string.")
            .with_detail("type", crate::payload::json_type_name(context))
    })?;
    let approved = payload.get("approved").expect("checked above");
    let approved = approved.as_bool().ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidType, "approved must be a boolean.")
            .with_detail("type", crate::payload::json_type_name(approved))
    })?;
    let phase = match optional_str(payload, "phase")? {
        None => None,
        Some(raw) => Some(TopicPhase::parse(raw).ok_or_else(|| {
            ToolError::new(ErrorCode::InvalidType, "phase is not a known onboarding phase.")
                .with_detail("phase", raw)
        })?),
    };

    let outcome = bdl_onboarding::save_context(library_root, topic, context, approved, phase)?;
    let commit_sha = commit_changed(
        library_root,
        &outcome.changed_paths,
        "save_topic_onboarding_context",
        &outcome.interview_path,
        &format!("save onboarding context ({})", outcome.topic),
    )?;

    Ok(json!({
        "topic": outcome.topic,
        "path": outcome.interview_path.to_string_lossy().replace('\\', "/"),
        "status": outcome.status,
        "commitSha": commit_sha,
    }))
}

/// `complete_topic_onboarding` — complete event with optional summary.
pub fn complete_topic_onboarding(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["topic", "summary"])?;
    let topic = require_str(payload, "topic", ErrorCode::MissingTopic, "topic is required.")?;
    let summary = optional_str(payload, "summary")?;

    let outcome = bdl_onboarding::complete_topic(library_root, topic, summary)?;
    let commit_sha = commit_changed(
        library_root,
        &outcome.changed_paths,
        "complete_topic_onboarding",
        &outcome.action_plan_path,
        &format!("complete topic onboarding ({})", outcome.topic),
    )?;

    Ok(json!({
        "topic": outcome.topic,
        "status": outcome.status,
        "next_topic": outcome.next_topic,
        "commitSha": commit_sha,
    }))
}

/// `rebuild_profile_context` — regenerate `me/profile.md` from approved
/// facts.
pub fn rebuild_profile_context(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["facts", "topics"])?;

    let facts: Vec<String> = match payload.get("facts") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => {
            let items = value.as_array().ok_or_else(|| {
                ToolError::new(ErrorCode::InvalidType, "facts must be a list of strings.")
                    .with_detail("type", crate::payload::json_type_name(value))
            })?;
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        }
    };

    let topics: Vec<String> = match payload.get("topics") {
        None | Some(Value::Null) => bdl_schema::TOPIC_ORDER
            .iter()
            .map(|topic| topic.to_string())
            .collect(),
        Some(value) => {
            let items = value.as_array().ok_or_else(|| {
                ToolError::new(ErrorCode::InvalidType, "topics must be a list of topic strings.")
                    .with_detail("type", crate::payload::json_type_name(value))
            })?;
            let mut topics = Vec::new();
            for item in items {
                let raw = item.as_str().ok_or_else(|| {
                    ToolError::new(
                        ErrorCode::InvalidType,
                        "topics must be a list of topic strings.",
                    )
                    .with_detail("type", crate::payload::json_type_name(item))
                })?;
                topics.push(bdl_schema::validate_topic(raw)?);
            }
            topics
        }
    };

    let outcome = bdl_onboarding::rebuild_profile(library_root, &facts, &topics)?;
    let commit_sha = commit_changed(
        library_root,
        &outcome.changed_paths,
        "rebuild_profile_context",
        Path::new("me/profile.md"),
        "rebuild profile context",
    )?;

    Ok(json!({
        "path": "me/profile.md",
        "fact_count": outcome.facts.len(),
        "facts": outcome.facts,
        "changed": !outcome.changed_paths.is_empty(),
        "commitSha": commit_sha,
    }))
}
