//! bdl-onboarding
//!
//! The per-topic onboarding state machine. Events mutate the persisted state
//! file and the topic's markdown documents; every transition is recorded in
//! the capped history ring. Callers commit the returned changed paths through
//! the mutation engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_schema::{
    OnboardingState, TopicHistoryEntry, TopicPhase, TopicStatus, persist_onboarding_state,
    read_onboarding_state, topic_file_path, topic_title, utc_now_iso,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of `start_topic_onboarding`.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    /// Validated topic slug.
    pub topic: String,
    /// Status after the event.
    pub status: TopicStatus,
    /// Interview seed text returned to the interviewer.
    pub interview_seed: String,
    /// Next incomplete topic after the event.
    pub next_topic: Option<String>,
    /// Paths written by the event (bootstrap included).
    pub changed_paths: Vec<PathBuf>,
}

/// Outcome of `save_topic_onboarding_context`.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// Validated topic slug.
    pub topic: String,
    /// Status after the event.
    pub status: TopicStatus,
    /// Tenant-relative interview path the context was appended to.
    pub interview_path: PathBuf,
    /// Paths written by the event.
    pub changed_paths: Vec<PathBuf>,
}

/// Outcome of `complete_topic_onboarding`.
#[derive(Debug, Clone)]
pub struct CompleteOutcome {
    /// Validated topic slug.
    pub topic: String,
    /// Status after the event (always complete).
    pub status: TopicStatus,
    /// Next incomplete topic after the event.
    pub next_topic: Option<String>,
    /// Tenant-relative action-plan path.
    pub action_plan_path: PathBuf,
    /// Paths written by the event.
    pub changed_paths: Vec<PathBuf>,
}

/// Outcome of `rebuild_profile_context`.
#[derive(Debug, Clone)]
pub struct ProfileOutcome {
    /// Merged, deduplicated fact lines.
    pub facts: Vec<String>,
    /// Paths written by the rebuild.
    pub changed_paths: Vec<PathBuf>,
}

/// `start` event: status → in_progress, phase → opening, started stamp set
/// once, history appended, interview seed returned.
pub fn start_topic(library_root: &Path, topic: &str) -> ToolResult<StartOutcome> {
    let topic = bdl_schema::validate_topic(topic)?;
    let mut changed = changed_set(bdl_schema::bootstrap_library(library_root)?.changed_paths);

    let now = utc_now_iso();
    let mut state = read_onboarding_state(library_root);
    let from_status = status_of(&state, &topic);

    if from_status != TopicStatus::Complete {
        let progress = state
            .topic_progress
            .get_mut(&topic)
            .expect("progress covers every topic");
        progress.status = TopicStatus::InProgress;
        if progress.phase == TopicPhase::NotStarted {
            progress.phase = TopicPhase::Opening;
        }
        if progress.started_at_utc.is_none() {
            progress.started_at_utc = Some(now.clone());
        }
        progress.last_updated_at_utc = now.clone();
        state
            .starter_topics
            .insert(topic.clone(), TopicStatus::InProgress);
        state.active_topic = Some(topic.clone());
    }

    let to_status = status_of(&state, &topic);
    state.push_history(history(
        "start",
        &topic,
        &now,
        Some(from_status),
        Some(to_status),
        None,
    ));
    if let Some(path) = persist_onboarding_state(library_root, &state)? {
        changed.insert(key(&path), path);
    }

    let interview_abs = topic_file_path(library_root, &topic, "interview.md");
    let interview_seed = std::fs::read_to_string(&interview_abs).map_err(|err| {
        ToolError::new(ErrorCode::FileReadFailed, "Interview seed could not be read.")
            .with_detail("path", format!("life/{topic}/interview.md"))
            .with_detail("cause", err.to_string())
    })?;

    let state = read_onboarding_state(library_root);
    debug!(target: "bdl.onboarding", topic = %topic, "topic onboarding started");
    Ok(StartOutcome {
        status: status_of(&state, &topic),
        next_topic: state.next_incomplete_topic(),
        interview_seed,
        changed_paths: changed.into_values().collect(),
        topic,
    })
}

/// `save_context` event: requires approval, appends the stamped block to the
/// topic interview and mirrors it into the topic AGENT file. In the
/// goals_tasks phase the context also lands in `goals.md` (deduplicated
/// under `## Current Goals`) and `action-plan.md`.
pub fn save_context(
    library_root: &Path,
    topic: &str,
    context: &str,
    approved: bool,
    phase: Option<TopicPhase>,
) -> ToolResult<SaveOutcome> {
    let topic = bdl_schema::validate_topic(topic)?;
    if !approved {
        return Err(ToolError::new(
            ErrorCode::ApprovalRequired,
            "approved=true is required for mutating onboarding context writes.",
        )
        .with_detail("topic", topic));
    }
    let context = context.trim();
    if context.is_empty() {
        return Err(
            ToolError::new(ErrorCode::InvalidType, "context must be a non-empty string.")
                .with_detail("topic", topic),
        );
    }

    let mut changed = changed_set(bdl_schema::bootstrap_library(library_root)?.changed_paths);
    let now = utc_now_iso();
    let section = format!("## Approved Context {now}\n\n{context}\n");

    let interview_rel = PathBuf::from(format!("life/{topic}/interview.md"));
    append_block(library_root, &interview_rel, &section)?;
    changed.insert(key(&interview_rel), interview_rel.clone());

    let agent_rel = PathBuf::from(format!("life/{topic}/AGENT.md"));
    append_block(library_root, &agent_rel, &section)?;
    changed.insert(key(&agent_rel), agent_rel);

    let phase = phase.unwrap_or(TopicPhase::Opening);
    if phase == TopicPhase::GoalsTasks {
        let goals_rel = PathBuf::from(format!("life/{topic}/goals.md"));
        if upsert_goal(library_root, &goals_rel, context)? {
            changed.insert(key(&goals_rel), goals_rel);
        }

        let plan_rel = PathBuf::from(format!("life/{topic}/action-plan.md"));
        let plan_block = format!("## Plan Update {now}\n\n{context}\n");
        append_block(library_root, &plan_rel, &plan_block)?;
        changed.insert(key(&plan_rel), plan_rel);
    }

    let mut state = read_onboarding_state(library_root);
    let from_status = status_of(&state, &topic);
    if from_status != TopicStatus::Complete {
        state
            .starter_topics
            .insert(topic.clone(), TopicStatus::InProgress);
    }
    {
        let progress = state
            .topic_progress
            .get_mut(&topic)
            .expect("progress covers every topic");
        if progress.status != TopicStatus::Complete {
            progress.status = TopicStatus::InProgress;
        }
        progress.phase = phase;
        progress.last_interview_at_utc = Some(now.clone());
        progress.last_updated_at_utc = now.clone();
    }
    let to_status = status_of(&state, &topic);
    state.push_history(history(
        "save_context",
        &topic,
        &now,
        Some(from_status),
        Some(to_status),
        Some(phase.as_str().to_string()),
    ));
    if let Some(path) = persist_onboarding_state(library_root, &state)? {
        changed.insert(key(&path), path);
    }

    Ok(SaveOutcome {
        status: to_status,
        interview_path: interview_rel,
        changed_paths: changed.into_values().collect(),
        topic,
    })
}

/// `complete` event: status and phase → complete, completion stamps set, an
/// optional dated summary appended to the action plan.
pub fn complete_topic(
    library_root: &Path,
    topic: &str,
    summary: Option<&str>,
) -> ToolResult<CompleteOutcome> {
    let topic = bdl_schema::validate_topic(topic)?;
    let mut changed = changed_set(bdl_schema::bootstrap_library(library_root)?.changed_paths);

    let now = utc_now_iso();
    let mut state = read_onboarding_state(library_root);
    let from_status = status_of(&state, &topic);
    {
        let progress = state
            .topic_progress
            .get_mut(&topic)
            .expect("progress covers every topic");
        progress.status = TopicStatus::Complete;
        progress.phase = TopicPhase::Complete;
        progress.completed_at_utc = Some(now.clone());
        progress.last_updated_at_utc = now.clone();
    }
    state
        .starter_topics
        .insert(topic.clone(), TopicStatus::Complete);
    state.completed_at.insert(topic.clone(), now.clone());
    if state.active_topic.as_deref() == Some(topic.as_str()) {
        state.active_topic = None;
    }
    state.topic_queue.retain(|queued| queued != &topic);
    state.recommended_next_topic = None;
    state.push_history(history(
        "complete",
        &topic,
        &now,
        Some(from_status),
        Some(TopicStatus::Complete),
        None,
    ));
    if let Some(path) = persist_onboarding_state(library_root, &state)? {
        changed.insert(key(&path), path);
    }

    let plan_rel = PathBuf::from(format!("life/{topic}/action-plan.md"));
    if let Some(summary) = summary.map(str::trim).filter(|s| !s.is_empty()) {
        let date = Utc::now().date_naive();
        let block = format!("## Onboarding Summary {date}\n\n{summary}\n");
        append_block(library_root, &plan_rel, &block)?;
        changed.insert(key(&plan_rel), plan_rel.clone());
    }

    let state = read_onboarding_state(library_root);
    debug!(target: "bdl.onboarding", topic = %topic, "topic onboarding complete");
    Ok(CompleteOutcome {
        status: TopicStatus::Complete,
        next_topic: state.next_incomplete_topic(),
        action_plan_path: plan_rel,
        changed_paths: changed.into_values().collect(),
        topic,
    })
}

/// Block prefixes recognised as approved interview context.
const APPROVED_BLOCK_PREFIXES: [&str; 3] = [
    "## Approved Context",
    "## Approved Interview Turn",
    "## Approved User Context",
];

/// Rebuild `me/profile.md` from the approved interview blocks of the given
/// topics merged with caller-supplied facts, deduplicated preserving order.
pub fn rebuild_profile(
    library_root: &Path,
    explicit_facts: &[String],
    topics: &[String],
) -> ToolResult<ProfileOutcome> {
    let mut changed = changed_set(bdl_schema::bootstrap_library(library_root)?.changed_paths);

    let mut merged: Vec<String> = Vec::new();
    for fact in explicit_facts {
        let fact = fact.trim();
        if !fact.is_empty() && !merged.iter().any(|existing| existing == fact) {
            merged.push(fact.to_string());
        }
    }
    for topic in topics {
        for fact in extract_topic_facts(library_root, topic) {
            if !merged.contains(&fact) {
                merged.push(fact);
            }
        }
    }

    let profile_rel = PathBuf::from("me/profile.md");
    let profile_abs = library_root.join(&profile_rel);
    let rendered = render_profile(&merged);
    let existing = std::fs::read_to_string(&profile_abs).ok();
    if existing.as_deref() != Some(rendered.as_str()) {
        if let Some(parent) = profile_abs.parent() {
            std::fs::create_dir_all(parent).map_err(|err| write_error(&profile_rel, &err))?;
        }
        bdl_fs::atomic_write(&profile_abs, &rendered)
            .map_err(|err| write_error(&profile_rel, &err))?;
        changed.insert(key(&profile_rel), profile_rel);
    }

    Ok(ProfileOutcome {
        facts: merged,
        changed_paths: changed.into_values().collect(),
    })
}

fn extract_topic_facts(library_root: &Path, topic: &str) -> Vec<String> {
    let interview = topic_file_path(library_root, topic, "interview.md");
    let Ok(content) = std::fs::read_to_string(&interview) else {
        return Vec::new();
    };

    let title = topic_title(topic);
    let mut facts = Vec::new();
    let mut block: Option<Vec<String>> = None;

    let mut flush = |block: &mut Option<Vec<String>>, facts: &mut Vec<String>| {
        if let Some(lines) = block.take() {
            let normalized = lines.join(" ");
            let normalized = normalized.trim();
            if !normalized.is_empty() {
                facts.push(format!("[{title}] {normalized}"));
            }
        }
    };

    for line in content.lines() {
        if APPROVED_BLOCK_PREFIXES
            .iter()
            .any(|prefix| line.starts_with(prefix))
        {
            flush(&mut block, &mut facts);
            block = Some(Vec::new());
            continue;
        }
        if line.starts_with("## ") {
            flush(&mut block, &mut facts);
            continue;
        }
        if let Some(lines) = block.as_mut() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }
    flush(&mut block, &mut facts);
    facts
}

fn render_profile(facts: &[String]) -> String {
    let mut lines = vec![
        "# Profile".to_string(),
        String::new(),
        "## Identity".to_string(),
        String::new(),
        "## Goals".to_string(),
        String::new(),
        "## Constraints".to_string(),
        String::new(),
        "## Preferences".to_string(),
        String::new(),
        "## Onboarding Facts".to_string(),
        String::new(),
    ];
    if facts.is_empty() {
        lines.push("- (no approved onboarding facts yet)".to_string());
    } else {
        for fact in facts {
            lines.push(format!("- {fact}"));
        }
    }
    lines.push(String::new());
    lines.push("## Last Updated".to_string());
    lines.push(String::new());
    lines.push(format!("- {}", utc_now_iso()));
    lines.push(String::new());
    lines.join("\n")
}

fn append_block(library_root: &Path, relative: &Path, block: &str) -> ToolResult<()> {
    let absolute = library_root.join(relative);
    let existing = std::fs::read_to_string(&absolute).unwrap_or_default();
    let updated = bdl_fs::join_with_newline(&existing, block);
    if let Some(parent) = absolute.parent() {
        std::fs::create_dir_all(parent).map_err(|err| write_error(relative, &err))?;
    }
    bdl_fs::atomic_write(&absolute, &updated).map_err(|err| write_error(relative, &err))
}

/// Add a goal bullet under `## Current Goals`, skipping duplicates. Returns
/// whether the file changed.
fn upsert_goal(library_root: &Path, relative: &Path, context: &str) -> ToolResult<bool> {
    let absolute = library_root.join(relative);
    let existing = std::fs::read_to_string(&absolute).unwrap_or_default();
    let goal_line = format!("- {}", collapse_to_line(context));

    const TARGET: &str = "## Current Goals";
    match bdl_markdown::extract_section(&existing, TARGET) {
        Ok(section) => {
            if section.lines().any(|line| line.trim() == goal_line) {
                return Ok(false);
            }
            let op = bdl_markdown::EditOperation {
                kind: "insert_after".to_string(),
                content: format!("{goal_line}\n"),
                target: Some(TARGET.to_string()),
            };
            let updated = bdl_markdown::apply_edit(&existing, &op)?;
            bdl_fs::atomic_write(&absolute, &updated)
                .map_err(|err| write_error(relative, &err))?;
            Ok(true)
        }
        Err(_) => {
            // Seed the section when a hand-edited file dropped it.
            let block = format!("{TARGET}\n\n{goal_line}\n");
            let updated = bdl_fs::join_with_newline(&existing, &block);
            bdl_fs::atomic_write(&absolute, &updated)
                .map_err(|err| write_error(relative, &err))?;
            Ok(true)
        }
    }
}

fn collapse_to_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn status_of(state: &OnboardingState, topic: &str) -> TopicStatus {
    *state
        .starter_topics
        .get(topic)
        .unwrap_or(&TopicStatus::NotStarted)
}

fn history(
    event: &str,
    topic: &str,
    now: &str,
    from_status: Option<TopicStatus>,
    to_status: Option<TopicStatus>,
    detail: Option<String>,
) -> TopicHistoryEntry {
    TopicHistoryEntry {
        event: event.to_string(),
        topic: topic.to_string(),
        at_utc: now.to_string(),
        from_status,
        to_status,
        detail,
    }
}

fn changed_set(paths: Vec<PathBuf>) -> BTreeMap<String, PathBuf> {
    paths.into_iter().map(|path| (key(&path), path)).collect()
}

fn key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn write_error(path: &Path, err: &std::io::Error) -> ToolError {
    ToolError::new(ErrorCode::WriteError, "Onboarding write failed.")
        .with_detail("path", key(path))
        .with_detail("cause", err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn start_moves_topic_to_in_progress_opening() {
        let dir = library();
        let outcome = start_topic(dir.path(), "fitness").unwrap();
        assert_eq!(outcome.status, TopicStatus::InProgress);
        assert!(outcome.interview_seed.contains("Fitness Interview"));

        let state = read_onboarding_state(dir.path());
        assert_eq!(state.topic_progress["fitness"].phase, TopicPhase::Opening);
        assert!(state.topic_progress["fitness"].started_at_utc.is_some());
        assert_eq!(state.active_topic.as_deref(), Some("fitness"));
        assert_eq!(state.topic_history.last().unwrap().event, "start");
    }

    #[test]
    fn start_keeps_existing_started_stamp() {
        let dir = library();
        start_topic(dir.path(), "fitness").unwrap();
        let first = read_onboarding_state(dir.path()).topic_progress["fitness"]
            .started_at_utc
            .clone();
        start_topic(dir.path(), "fitness").unwrap();
        let second = read_onboarding_state(dir.path()).topic_progress["fitness"]
            .started_at_utc
            .clone();
        assert_eq!(first, second);
    }

    #[test]
    fn start_rejects_unknown_topic() {
        let dir = library();
        let err = start_topic(dir.path(), "cooking").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTopic);
    }

    #[test]
    fn save_requires_approval() {
        let dir = library();
        let err = save_context(dir.path(), "fitness", "ctx", false, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalRequired);
    }

    #[test]
    fn save_rejects_empty_context() {
        let dir = library();
        let err = save_context(dir.path(), "fitness", "   ", true, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidType);
    }

    #[test]
    fn save_appends_block_to_interview_and_agent() {
        let dir = library();
        save_context(dir.path(), "fitness", "Trains twice a week.", true, None).unwrap();

        let interview =
            std::fs::read_to_string(dir.path().join("life/fitness/interview.md")).unwrap();
        assert!(interview.contains("## Approved Context "));
        assert!(interview.contains("Trains twice a week."));

        let agent = std::fs::read_to_string(dir.path().join("life/fitness/AGENT.md")).unwrap();
        assert!(agent.contains("Trains twice a week."));

        let state = read_onboarding_state(dir.path());
        assert_eq!(state.starter_topics["fitness"], TopicStatus::InProgress);
        assert!(state.topic_progress["fitness"].last_interview_at_utc.is_some());
        assert_eq!(state.topic_history.last().unwrap().event, "save_context");
    }

    #[test]
    fn goals_tasks_phase_updates_goals_and_plan() {
        let dir = library();
        save_context(
            dir.path(),
            "fitness",
            "Run a 10k by June.",
            true,
            Some(TopicPhase::GoalsTasks),
        )
        .unwrap();

        let goals = std::fs::read_to_string(dir.path().join("life/fitness/goals.md")).unwrap();
        assert!(goals.contains("- Run a 10k by June."));

        let plan = std::fs::read_to_string(dir.path().join("life/fitness/action-plan.md")).unwrap();
        assert!(plan.contains("## Plan Update "));
        assert!(plan.contains("Run a 10k by June."));

        let state = read_onboarding_state(dir.path());
        assert_eq!(state.topic_progress["fitness"].phase, TopicPhase::GoalsTasks);
    }

    #[test]
    fn goal_upsert_deduplicates() {
        let dir = library();
        for _ in 0..2 {
            save_context(
                dir.path(),
                "fitness",
                "Run a 10k by June.",
                true,
                Some(TopicPhase::GoalsTasks),
            )
            .unwrap();
        }
        let goals = std::fs::read_to_string(dir.path().join("life/fitness/goals.md")).unwrap();
        let occurrences = goals.matches("- Run a 10k by June.").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn complete_stamps_all_three_invariant_sites() {
        let dir = library();
        start_topic(dir.path(), "finances").unwrap();
        let outcome = complete_topic(dir.path(), "finances", Some("Solid baseline.")).unwrap();
        assert_eq!(outcome.status, TopicStatus::Complete);
        assert_eq!(outcome.next_topic.as_deref(), Some("fitness"));

        let state = read_onboarding_state(dir.path());
        assert_eq!(state.starter_topics["finances"], TopicStatus::Complete);
        assert!(state.completed_at.contains_key("finances"));
        assert!(state.topic_progress["finances"].completed_at_utc.is_some());
        assert_eq!(state.topic_progress["finances"].phase, TopicPhase::Complete);
        assert!(!state.topic_queue.contains(&"finances".to_string()));
        assert_eq!(state.recommended_next_topic.as_deref(), Some("fitness"));

        let plan =
            std::fs::read_to_string(dir.path().join("life/finances/action-plan.md")).unwrap();
        assert!(plan.contains("## Onboarding Summary "));
        assert!(plan.contains("Solid baseline."));
    }

    #[test]
    fn rebuild_profile_collects_approved_blocks() {
        let dir = library();
        save_context(dir.path(), "fitness", "Trains twice a week.", true, None).unwrap();
        save_context(dir.path(), "finances", "Saves 10% monthly.", true, None).unwrap();

        let outcome = rebuild_profile(
            dir.path(),
            &["Prefers morning work.".to_string()],
            &["fitness".to_string(), "finances".to_string()],
        )
        .unwrap();

        assert_eq!(outcome.facts.len(), 3);
        assert_eq!(outcome.facts[0], "Prefers morning work.");
        assert!(outcome.facts.contains(&"[Fitness] Trains twice a week.".to_string()));
        assert!(outcome.facts.contains(&"[Finances] Saves 10% monthly.".to_string()));

        let profile = std::fs::read_to_string(dir.path().join("me/profile.md")).unwrap();
        assert!(profile.contains("## Onboarding Facts"));
        assert!(profile.contains("- [Fitness] Trains twice a week."));
    }

    #[test]
    fn rebuild_profile_dedupes_and_handles_empty() {
        let dir = library();
        let outcome = rebuild_profile(dir.path(), &[], &[]).unwrap();
        assert!(outcome.facts.is_empty());
        let profile = std::fs::read_to_string(dir.path().join("me/profile.md")).unwrap();
        assert!(profile.contains("- (no approved onboarding facts yet)"));

        // A rebuild with identical inputs does not rewrite the profile...
        // except for the Last Updated stamp, so just assert it succeeds.
        rebuild_profile(dir.path(), &[], &[]).unwrap();
    }

    #[test]
    fn multiline_blocks_collapse_to_single_fact_line() {
        let dir = library();
        save_context(
            dir.path(),
            "career",
            "Wants a staff role.\nTimeline: two years.",
            true,
            None,
        )
        .unwrap();
        let outcome = rebuild_profile(dir.path(), &[], &["career".to_string()]).unwrap();
        assert_eq!(
            outcome.facts,
            vec!["[Career] Wants a staff role. Timeline: two years.".to_string()]
        );
    }
}
