//! Task ledger lifecycle tests. Requires a `git` binary on PATH.

use bdl_error::ErrorCode;
use bdl_tools::dispatch;
use chrono::Utc;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn completed_rel() -> String {
    format!("pulse/completed/{}.md", Utc::now().format("%Y-%m"))
}

#[test]
fn full_task_lifecycle() {
    let dir = TempDir::new().unwrap();

    // Create — first id is 1.
    let created = dispatch(
        dir.path(),
        "create_task",
        &json!({"title": "Write tests", "project": "demo", "priority": "p1"}),
    )
    .unwrap();
    assert_eq!(created["task"]["id"], 1);
    assert_eq!(created["task"]["priority"], "p1");
    let index = fs::read_to_string(dir.path().join("pulse/index.md")).unwrap();
    assert!(index.contains("- [ ] T-001 | p1 | project:demo | Write tests"));

    // Update — priority bump.
    let updated = dispatch(
        dir.path(),
        "update_task",
        &json!({"id": 1, "fields": {"priority": "p0"}}),
    )
    .unwrap();
    assert_eq!(updated["task"]["priority"], "p0");
    let index = fs::read_to_string(dir.path().join("pulse/index.md")).unwrap();
    assert!(index.contains("T-001 | p0 |"));

    // Complete — moves to the monthly log.
    let completed = dispatch(dir.path(), "complete_task", &json!({"id": 1})).unwrap();
    assert_eq!(completed["task"]["status"], "x");
    let index = fs::read_to_string(dir.path().join("pulse/index.md")).unwrap();
    assert!(!index.contains("T-001"));
    let log = fs::read_to_string(dir.path().join(completed_rel())).unwrap();
    assert!(log.contains("- [x] T-001"));

    // Reopen — returns with open status.
    let reopened = dispatch(dir.path(), "reopen_task", &json!({"id": 1})).unwrap();
    assert_eq!(reopened["task"]["status"], " ");
    let index = fs::read_to_string(dir.path().join("pulse/index.md")).unwrap();
    assert!(index.contains("- [ ] T-001"));
    let log = fs::read_to_string(dir.path().join(completed_rel())).unwrap();
    assert!(!log.contains("T-001"));
}

#[test]
fn ids_stay_unique_across_open_and_completed() {
    let dir = TempDir::new().unwrap();
    dispatch(dir.path(), "create_task", &json!({"title": "one"})).unwrap();
    dispatch(dir.path(), "create_task", &json!({"title": "two"})).unwrap();
    dispatch(dir.path(), "complete_task", &json!({"id": 1})).unwrap();

    // Even with T-001 completed, the next id must not collide with it.
    let third = dispatch(dir.path(), "create_task", &json!({"title": "three"})).unwrap();
    assert_eq!(third["task"]["id"], 3);
}

#[test]
fn unknown_ids_are_task_not_found() {
    let dir = TempDir::new().unwrap();
    dispatch(dir.path(), "create_task", &json!({"title": "one"})).unwrap();

    for tool in ["update_task", "complete_task"] {
        let payload = if tool == "update_task" {
            json!({"id": 99, "fields": {}})
        } else {
            json!({"id": 99})
        };
        let err = dispatch(dir.path(), tool, &payload).unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskNotFound, "{tool}");
    }
}

#[test]
fn update_requires_existing_index() {
    let dir = TempDir::new().unwrap();
    let err = dispatch(
        dir.path(),
        "update_task",
        &json!({"id": 1, "fields": {"title": "x"}}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::FileNotFound);
}

#[test]
fn create_task_resolves_scope_from_project_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("projects/active/demo")).unwrap();

    let created = dispatch(
        dir.path(),
        "create_task",
        &json!({"title": "Scoped", "project": "demo"}),
    )
    .unwrap();
    assert_eq!(created["task"]["scope"], "projects/active/demo");
    let index = fs::read_to_string(dir.path().join("pulse/index.md")).unwrap();
    assert!(index.contains("scope:projects/active/demo"));
}

#[test]
fn list_tasks_filters_by_project_scope() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("projects/active/demo")).unwrap();
    fs::create_dir_all(dir.path().join("life/fitness")).unwrap();

    dispatch(
        dir.path(),
        "create_task",
        &json!({"title": "demo work", "project": "demo"}),
    )
    .unwrap();
    dispatch(
        dir.path(),
        "create_task",
        &json!({"title": "run", "scope": "life/fitness"}),
    )
    .unwrap();

    let all = dispatch(dir.path(), "list_tasks", &json!({})).unwrap();
    assert_eq!(all["tasks"].as_array().unwrap().len(), 2);

    let demo = dispatch(dir.path(), "list_tasks", &json!({"project": "demo"})).unwrap();
    let tasks = demo["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["title"], "demo work");

    let by_path = dispatch(
        dir.path(),
        "list_tasks",
        &json!({"project": "life/fitness"}),
    )
    .unwrap();
    assert_eq!(by_path["tasks"].as_array().unwrap().len(), 1);
}

#[test]
fn list_tasks_reads_legacy_prefixes() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("pulse")).unwrap();
    fs::write(
        dir.path().join("pulse/index.md"),
        "# Pulse Index\n- [ ] T-001 | path:life/fitness | legacy path\n- [ ] T-002 | life:career | legacy life\n",
    )
    .unwrap();

    let result = dispatch(dir.path(), "list_tasks", &json!({})).unwrap();
    let tasks = result["tasks"].as_array().unwrap();
    assert_eq!(tasks[0]["scope"], "life/fitness");
    assert_eq!(tasks[1]["scope"], "life/career");
}

#[test]
fn status_filter_selects_ledgers() {
    let dir = TempDir::new().unwrap();
    dispatch(dir.path(), "create_task", &json!({"title": "open one"})).unwrap();
    dispatch(dir.path(), "create_task", &json!({"title": "done one"})).unwrap();
    dispatch(dir.path(), "complete_task", &json!({"id": 2})).unwrap();

    let open = dispatch(dir.path(), "list_tasks", &json!({"status": "open"})).unwrap();
    assert_eq!(open["tasks"].as_array().unwrap().len(), 1);

    let completed = dispatch(dir.path(), "list_tasks", &json!({"status": "completed"})).unwrap();
    assert_eq!(completed["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(completed["tasks"][0]["status"], "x");

    let all = dispatch(dir.path(), "list_tasks", &json!({"status": "all"})).unwrap();
    assert_eq!(all["tasks"].as_array().unwrap().len(), 2);
}

#[test]
fn create_task_requires_title() {
    let dir = TempDir::new().unwrap();
    let err = dispatch(dir.path(), "create_task", &json!({"owner": "alice"})).unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingTitle);
}
