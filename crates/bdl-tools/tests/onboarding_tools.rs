//! Bootstrap and onboarding tool tests. Requires a `git` binary on PATH.

use bdl_error::ErrorCode;
use bdl_tools::dispatch;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn bootstrap_is_idempotent_with_one_commit() {
    let dir = TempDir::new().unwrap();

    let first = dispatch(dir.path(), "bootstrap_user_library", &json!({})).unwrap();
    assert_eq!(first["changed"], json!(true));
    assert!(first["commitSha"].as_str().is_some());
    assert!(dir.path().join(".braindrive/schema-version.json").exists());
    assert!(dir.path().join("life/finances/interview.md").exists());

    let second = dispatch(dir.path(), "bootstrap_user_library", &json!({})).unwrap();
    assert_eq!(second["changed"], json!(false));
    assert!(second["commitSha"].is_null());
    assert_eq!(second["changed_paths"], json!([]));

    // Exactly one journal entry from the first run.
    assert_eq!(bdl_journal::read_entries(dir.path(), None, 50).len(), 1);
}

#[test]
fn get_onboarding_state_reports_next_topic() {
    let dir = TempDir::new().unwrap();
    let result = dispatch(dir.path(), "get_onboarding_state", &json!({})).unwrap();
    assert_eq!(result["next_topic"], "finances");
    assert_eq!(result["state"]["version"], 2);
    assert_eq!(result["state"]["starter_topics"]["fitness"], "not_started");
}

#[test]
fn start_save_complete_flow() {
    let dir = TempDir::new().unwrap();

    let started = dispatch(
        dir.path(),
        "start_topic_onboarding",
        &json!({"topic": "finances"}),
    )
    .unwrap();
    assert_eq!(started["status"], "in_progress");
    assert!(
        started["interview_seed"]
            .as_str()
            .unwrap()
            .contains("Finances Interview")
    );

    let saved = dispatch(
        dir.path(),
        "save_topic_onboarding_context",
        &json!({
            "topic": "finances",
            "context": "Monthly budget is stable.",
            "approved": true,
        }),
    )
    .unwrap();
    assert_eq!(saved["path"], "life/finances/interview.md");
    assert_eq!(saved["status"], "in_progress");

    let completed = dispatch(
        dir.path(),
        "complete_topic_onboarding",
        &json!({"topic": "finances", "summary": "Baseline set."}),
    )
    .unwrap();
    assert_eq!(completed["status"], "complete");
    assert_eq!(completed["next_topic"], "fitness");

    let state = dispatch(dir.path(), "get_onboarding_state", &json!({})).unwrap();
    assert_eq!(state["state"]["starter_topics"]["finances"], "complete");
    assert!(state["state"]["completed_at"]["finances"].is_string());
    assert!(
        state["state"]["topic_progress"]["finances"]["completed_at_utc"].is_string(),
    );
    let history = state["state"]["topic_history"].as_array().unwrap();
    assert!(history.iter().any(|entry| entry["event"] == "complete"));
}

#[test]
fn save_requires_approval_flag() {
    let dir = TempDir::new().unwrap();
    let err = dispatch(
        dir.path(),
        "save_topic_onboarding_context",
        &json!({"topic": "fitness", "context": "x", "approved": false}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::ApprovalRequired);
}

#[test]
fn save_rejects_missing_fields_together() {
    let dir = TempDir::new().unwrap();
    let err = dispatch(
        dir.path(),
        "save_topic_onboarding_context",
        &json!({"topic": "fitness"}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingFields);
}

#[test]
fn unknown_topic_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = dispatch(
        dir.path(),
        "start_topic_onboarding",
        &json!({"topic": "cooking"}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTopic);
}

#[test]
fn goals_phase_save_touches_goals_and_plan() {
    let dir = TempDir::new().unwrap();
    dispatch(
        dir.path(),
        "save_topic_onboarding_context",
        &json!({
            "topic": "career",
            "context": "Reach staff level in two years.",
            "approved": true,
            "phase": "goals_tasks",
        }),
    )
    .unwrap();

    let goals = std::fs::read_to_string(dir.path().join("life/career/goals.md")).unwrap();
    assert!(goals.contains("- Reach staff level in two years."));
    let plan = std::fs::read_to_string(dir.path().join("life/career/action-plan.md")).unwrap();
    assert!(plan.contains("Reach staff level in two years."));
}

#[test]
fn rebuild_profile_merges_facts() {
    let dir = TempDir::new().unwrap();
    dispatch(
        dir.path(),
        "save_topic_onboarding_context",
        &json!({"topic": "fitness", "context": "Trains twice a week.", "approved": true}),
    )
    .unwrap();

    let result = dispatch(
        dir.path(),
        "rebuild_profile_context",
        &json!({"facts": ["Prefers mornings."], "topics": ["fitness"]}),
    )
    .unwrap();
    assert_eq!(result["fact_count"], 2);
    assert_eq!(result["path"], "me/profile.md");

    let profile = std::fs::read_to_string(dir.path().join("me/profile.md")).unwrap();
    assert!(profile.contains("- Prefers mornings."));
    assert!(profile.contains("- [Fitness] Trains twice a week."));
}

#[test]
fn rebuild_profile_validates_topics() {
    let dir = TempDir::new().unwrap();
    let err = dispatch(
        dir.path(),
        "rebuild_profile_context",
        &json!({"topics": ["cooking"]}),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTopic);
}
