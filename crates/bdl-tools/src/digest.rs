//! Digest tool handlers: snapshot, scoring, and period rollups.

use crate::common::parse_since_field;
use crate::payload::{as_object, optional_bool, optional_positive, optional_str, reject_unknown_fields};
use bdl_engine::{Mutation, Rollback};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_tasks::{ScopeLookup, ScoredTask, StatusFilter, Task, filter_tasks, infer_scopes, score_task};
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};
use std::path::Path;

/// `digest_snapshot` — filtered open tasks, recent completions, and recent
/// activity in one payload.
pub fn digest_snapshot(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(
        payload,
        &[
            "owner",
            "priority",
            "tag",
            "project",
            "include_completed",
            "completed_limit",
            "activity_since",
            "activity_limit",
        ],
    )?;

    let owner = optional_str(payload, "owner")?;
    let priority = optional_str(payload, "priority")?;
    let tag = optional_str(payload, "tag")?;
    let project = optional_str(payload, "project")?;
    let include_completed = optional_bool(payload, "include_completed", true)?;
    let completed_limit = optional_positive(payload, "completed_limit", 10)? as usize;
    let activity_limit = optional_positive(payload, "activity_limit", 50)? as usize;
    let activity_since = parse_since_field(payload.get("activity_since"), "activity_since")?;

    let lookup = ScopeLookup::from_library_root(library_root);
    let mut tasks = bdl_tasks::load_tasks(library_root, StatusFilter::Open);
    infer_scopes(&mut tasks, &lookup);
    let tasks = filter_tasks(tasks, owner, priority, tag, project, &lookup);

    let completed: Vec<Task> = if include_completed {
        let mut completed = bdl_tasks::load_completed_tasks(library_root, activity_since);
        infer_scopes(&mut completed, &lookup);
        filter_tasks(completed, owner, priority, tag, project, &lookup)
            .into_iter()
            .take(completed_limit)
            .collect()
    } else {
        Vec::new()
    };

    let activity = bdl_journal::read_entries(library_root, activity_since, activity_limit);

    Ok(json!({
        "tasks": tasks,
        "completed": completed,
        "activity": activity,
    }))
}

/// `score_digest_tasks` — rank caller-supplied task payloads.
pub fn score_digest_tasks(_library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["tasks", "focus_project", "now"])?;

    let tasks = payload
        .get("tasks")
        .ok_or_else(|| {
            ToolError::new(ErrorCode::MissingTasks, "tasks is required.")
                .with_detail("fields", ["tasks"])
        })?
        .as_array()
        .ok_or_else(|| ToolError::new(ErrorCode::InvalidType, "tasks must be a list."))?;

    let focus_project = optional_str(payload, "focus_project")?;
    let now = match payload.get("now") {
        None | Some(Value::Null) => Utc::now(),
        Some(value) => {
            let rendered = value.as_str().map(String::from).unwrap_or_else(|| value.to_string());
            crate::common::parse_iso_datetime(&rendered).ok_or_else(|| {
                ToolError::new(ErrorCode::InvalidDate, "now must be ISO date-time.")
                    .with_detail("now", rendered)
            })?
        }
    };

    let mut scored: Vec<(usize, ScoredTask)> = Vec::new();
    for (index, raw_task) in tasks.iter().enumerate() {
        let Some(object) = raw_task.as_object() else {
            continue;
        };
        let task = task_from_value(object);
        let (score, reasons) = score_task(&task, focus_project, now);
        scored.push((
            index,
            ScoredTask {
                task: raw_task.clone(),
                score,
                reasons,
            },
        ));
    }

    // Stable: ties keep their original order.
    scored.sort_by(|a, b| b.1.score.cmp(&a.1.score).then(a.0.cmp(&b.0)));

    let ranked: Vec<ScoredTask> = scored.into_iter().map(|(_, scored)| scored).collect();
    Ok(json!({"tasks": ranked}))
}

/// Lenient task view over an arbitrary JSON object, for scoring payloads
/// that did not come from the ledger.
fn task_from_value(object: &serde_json::Map<String, Value>) -> Task {
    let mut task = Task::new(
        object.get("id").and_then(Value::as_u64).unwrap_or(0),
        object.get("title").and_then(Value::as_str).unwrap_or(""),
    );
    task.priority = object
        .get("priority")
        .and_then(Value::as_str)
        .map(String::from);
    task.project = object
        .get("project")
        .and_then(Value::as_str)
        .map(String::from);
    task.due = object.get("due").and_then(Value::as_str).map(String::from);
    task.tags = object
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    task
}

/// `rollup_digest_period` — rebuild one rollup document and commit when it
/// changed.
pub fn rollup_digest_period(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["period", "target_date"])?;

    let period = payload.get("period").ok_or_else(|| {
        ToolError::new(ErrorCode::MissingPeriod, "period is required.")
            .with_detail("fields", ["period"])
    })?;
    let period = period.as_str().ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidType, "period must be a string.")
            .with_detail("type", crate::payload::json_type_name(period))
    })?;
    let period = bdl_digest::Period::parse(period)?;

    let target_date = match optional_str(payload, "target_date")? {
        None => Utc::now().date_naive(),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            ToolError::new(ErrorCode::InvalidDate, "target_date must use YYYY-MM-DD format.")
                .with_detail("target_date", raw)
        })?,
    };

    let outcome = bdl_digest::rollup_period(library_root, period, target_date)?;

    let mut commit_sha: Option<String> = None;
    if !outcome.changed_paths.is_empty() {
        let mutation = Mutation::begin(library_root)?;
        let period_name = match period {
            bdl_digest::Period::Week => "week",
            bdl_digest::Period::Month => "month",
            bdl_digest::Period::Year => "year",
        };
        let sha = mutation.finish(
            &outcome.changed_paths,
            "rollup_digest_period",
            &outcome.output_path,
            &format!("rollup digest {period_name}"),
            Rollback::None,
        )?;
        commit_sha = Some(sha);
    }

    Ok(json!({
        "period": outcome.period,
        "label": outcome.label,
        "path": outcome.output_path.to_string_lossy().replace('\\', "/"),
        "daily_count": outcome.daily_count,
        "changed": !outcome.changed_paths.is_empty(),
        "commitSha": commit_sha,
    }))
}
