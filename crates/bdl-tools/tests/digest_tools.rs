//! Digest tool tests. Requires a `git` binary on PATH.

use bdl_error::ErrorCode;
use bdl_tools::dispatch;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn seed_daily(root: &Path, date: &str, content: &str) {
    let (year, month) = (&date[..4], &date[5..7]);
    let path = root
        .join("digest/daily")
        .join(year)
        .join(month)
        .join(format!("{date}.md"));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn weekly_rollup_includes_both_daily_entries() {
    let dir = TempDir::new().unwrap();
    // Both dates fall in ISO week 2026-W08.
    seed_daily(dir.path(), "2026-02-16", "# Daily\n\nMonday notes.\n");
    seed_daily(dir.path(), "2026-02-18", "# Daily\n\nWednesday notes.\n");

    let result = dispatch(
        dir.path(),
        "rollup_digest_period",
        &json!({"period": "week", "target_date": "2026-02-17"}),
    )
    .unwrap();

    assert_eq!(result["period"], "week");
    assert_eq!(result["label"], "2026-W08");
    assert_eq!(result["daily_count"], 2);
    assert_eq!(result["changed"], json!(true));
    let sha = result["commitSha"].as_str().unwrap();
    assert_eq!(sha.len(), 40);

    let body = fs::read_to_string(dir.path().join("digest/weekly/2026/2026-W08.md")).unwrap();
    assert!(body.contains("Monday notes."));
    assert!(body.contains("Wednesday notes."));

    // Exactly one commit + one journal entry for the whole rollup.
    let entries = bdl_journal::read_entries(dir.path(), None, 10);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["operation"], "rollup_digest_period");
    assert_eq!(entries[0]["commitSha"], sha);

    // Rollup state marker advanced.
    let state = fs::read_to_string(dir.path().join("digest/_meta/rollup-state.json")).unwrap();
    assert!(state.contains("last_weekly_rollup"));
    assert!(state.contains("2026-02-18"));
}

#[test]
fn rollup_rerun_reports_unchanged() {
    let dir = TempDir::new().unwrap();
    seed_daily(dir.path(), "2026-02-16", "notes\n");

    dispatch(
        dir.path(),
        "rollup_digest_period",
        &json!({"period": "week", "target_date": "2026-02-17"}),
    )
    .unwrap();
    let second = dispatch(
        dir.path(),
        "rollup_digest_period",
        &json!({"period": "week", "target_date": "2026-02-17"}),
    )
    .unwrap();
    assert_eq!(second["changed"], json!(false));
    assert!(second["commitSha"].is_null());
}

#[test]
fn rollup_validates_period_and_date() {
    let dir = TempDir::new().unwrap();
    let err = dispatch(
        dir.path(),
        "rollup_digest_period",
        &json!({"period": "quarter"}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPeriod);

    let err = dispatch(
        dir.path(),
        "rollup_digest_period",
        &json!({"period": "week", "target_date": "17/02/2026"}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidDate);
}

#[test]
fn monthly_rollup_filters_by_month() {
    let dir = TempDir::new().unwrap();
    seed_daily(dir.path(), "2026-01-31", "january\n");
    seed_daily(dir.path(), "2026-02-01", "february\n");

    let result = dispatch(
        dir.path(),
        "rollup_digest_period",
        &json!({"period": "month", "target_date": "2026-02-14"}),
    )
    .unwrap();
    assert_eq!(result["daily_count"], 1);

    let body = fs::read_to_string(dir.path().join("digest/monthly/2026/2026-02.md")).unwrap();
    assert!(body.contains("february"));
    assert!(!body.contains("january"));
}

#[test]
fn score_digest_tasks_ranks_by_score() {
    let dir = TempDir::new().unwrap();
    let result = dispatch(
        dir.path(),
        "score_digest_tasks",
        &json!({
            "now": "2026-02-17T12:00:00Z",
            "focus_project": "demo",
            "tasks": [
                {"id": 1, "title": "low", "priority": "p3"},
                {"id": 2, "title": "urgent", "priority": "p0", "due": "2026-02-16"},
                {"id": 3, "title": "blocked", "priority": "p0", "tags": ["blocked"]},
                {"id": 4, "title": "focus", "priority": "p1", "project": "demo"},
            ],
        }),
    )
    .unwrap();

    let ranked = result["tasks"].as_array().unwrap();
    assert_eq!(ranked[0]["task"]["id"], 2); // 100 + 30
    assert_eq!(ranked[0]["score"], 130);
    assert_eq!(ranked[1]["task"]["id"], 4); // 70 + 10
    assert_eq!(ranked[2]["task"]["id"], 1); // 20
    assert_eq!(ranked[3]["task"]["id"], 3); // 100 - 100
    assert!(
        ranked[0]["reasons"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r == "due_overdue")
    );
}

#[test]
fn digest_snapshot_combines_sources() {
    let dir = TempDir::new().unwrap();
    dispatch(dir.path(), "create_task", &json!({"title": "open work"})).unwrap();
    dispatch(dir.path(), "create_task", &json!({"title": "done work"})).unwrap();
    dispatch(dir.path(), "complete_task", &json!({"id": 2})).unwrap();

    let result = dispatch(dir.path(), "digest_snapshot", &json!({})).unwrap();
    assert_eq!(result["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(result["tasks"][0]["title"], "open work");
    assert_eq!(result["completed"].as_array().unwrap().len(), 1);
    assert_eq!(result["completed"][0]["status"], "x");
    assert!(!result["activity"].as_array().unwrap().is_empty());
}

#[test]
fn digest_snapshot_validates_limits() {
    let dir = TempDir::new().unwrap();
    let err = dispatch(
        dir.path(),
        "digest_snapshot",
        &json!({"completed_limit": 0}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidType);

    let err = dispatch(
        dir.path(),
        "digest_snapshot",
        &json!({"activity_since": "not a date"}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidDate);
}

#[test]
fn ingest_transcript_stores_file_and_index() {
    let dir = TempDir::new().unwrap();
    let result = dispatch(
        dir.path(),
        "ingest_transcript",
        &json!({
            "content": "Q: hello\nA: world\n",
            "date": "2026-02-17",
            "filename": "session-1.md",
            "project": "demo",
            "source": "voice",
        }),
    )
    .unwrap();

    assert_eq!(result["path"], "transcripts/2026-02/session-1.md");
    assert_eq!(
        fs::read_to_string(dir.path().join("transcripts/2026-02/session-1.md")).unwrap(),
        "Q: hello\nA: world\n"
    );
    let index = fs::read_to_string(dir.path().join("transcripts/index.md")).unwrap();
    assert!(index.contains(
        "2026-02-17 - transcripts/2026-02/session-1.md - project:demo - source:voice"
    ));
}

#[test]
fn read_activity_log_returns_tail() {
    let dir = TempDir::new().unwrap();
    for index in 0..3 {
        dispatch(
            dir.path(),
            "create_markdown",
            &json!({"path": format!("doc-{index}.md"), "content": "x\n"}),
        )
        .unwrap();
    }

    let result = dispatch(dir.path(), "read_activity_log", &json!({"limit": 2})).unwrap();
    let entries = result["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["path"], "doc-1.md");
    assert_eq!(entries[1]["path"], "doc-2.md");
}
