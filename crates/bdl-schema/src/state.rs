//! Onboarding state: the per-topic status/phase record persisted as
//! canonical JSON at `.braindrive/onboarding_state.json`.
//!
//! Reads are lenient — unknown fields, bad types, and out-of-range values
//! degrade to defaults rather than failing — because the file is also edited
//! by older service versions. Writes always re-normalise and only touch disk
//! when the canonical rendering differs.

use crate::{TOPIC_ORDER, utc_now_iso};
use bdl_error::{ErrorCode, ToolError, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Cap on retained history entries.
pub const TOPIC_HISTORY_LIMIT: usize = 200;

/// Per-topic onboarding status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    /// Not yet started.
    NotStarted,
    /// Interviewing in progress.
    InProgress,
    /// Onboarding finished.
    Complete,
}

impl TopicStatus {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Per-topic interview phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicPhase {
    /// Not yet started.
    NotStarted,
    /// Opening interview questions.
    Opening,
    /// Goals and tasks capture.
    GoalsTasks,
    /// Follow-up cycle.
    Followup,
    /// Finished.
    Complete,
}

impl TopicPhase {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Opening => "opening",
            Self::GoalsTasks => "goals_tasks",
            Self::Followup => "followup",
            Self::Complete => "complete",
        }
    }

    /// Parse a wire phase name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "not_started" => Some(Self::NotStarted),
            "opening" => Some(Self::Opening),
            "goals_tasks" => Some(Self::GoalsTasks),
            "followup" => Some(Self::Followup),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Progress record for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicProgress {
    /// Topic status, kept in sync with `starter_topics`.
    pub status: TopicStatus,
    /// Interview phase.
    pub phase: TopicPhase,
    /// When the topic was first started.
    pub started_at_utc: Option<String>,
    /// Last interview save.
    pub last_interview_at_utc: Option<String>,
    /// Completion stamp; set iff status is complete.
    pub completed_at_utc: Option<String>,
    /// Next follow-up due stamp.
    pub next_followup_due_at_utc: Option<String>,
    /// Planned question count.
    pub question_total: u32,
    /// Current question index.
    pub question_index: u32,
    /// Completed follow-up cycles.
    pub followup_cycles: u32,
    /// Topics queued for future interviews.
    pub future_interview_topics: Vec<String>,
    /// Last touch stamp.
    pub last_updated_at_utc: String,
}

impl TopicProgress {
    fn default_at(timestamp: &str) -> Self {
        Self {
            status: TopicStatus::NotStarted,
            phase: TopicPhase::NotStarted,
            started_at_utc: None,
            last_interview_at_utc: None,
            completed_at_utc: None,
            next_followup_due_at_utc: None,
            question_total: 0,
            question_index: 0,
            followup_cycles: 0,
            future_interview_topics: Vec::new(),
            last_updated_at_utc: timestamp.to_string(),
        }
    }
}

/// One history ring entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicHistoryEntry {
    /// Event name (`start`, `save_context`, `complete`, ...).
    pub event: String,
    /// Topic slug.
    pub topic: String,
    /// Event stamp.
    pub at_utc: String,
    /// Status before the event, when it changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_status: Option<TopicStatus>,
    /// Status after the event, when it changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_status: Option<TopicStatus>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The whole onboarding state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingState {
    /// Schema version of this file.
    pub version: i64,
    /// Status per topic (kept in sync with `topic_progress`).
    pub starter_topics: BTreeMap<String, TopicStatus>,
    /// Completion stamps per completed topic.
    pub completed_at: BTreeMap<String, String>,
    /// File creation stamp.
    pub created_at_utc: String,
    /// Last write stamp.
    pub updated_at_utc: String,
    /// Topic currently being interviewed.
    pub active_topic: Option<String>,
    /// Remaining topic queue.
    pub topic_queue: Vec<String>,
    /// Suggested next topic.
    pub recommended_next_topic: Option<String>,
    /// Per-topic progress records.
    pub topic_progress: BTreeMap<String, TopicProgress>,
    /// Capped event history.
    pub topic_history: Vec<TopicHistoryEntry>,
}

impl OnboardingState {
    /// Fresh default state stamped `now`.
    #[must_use]
    pub fn default_at(now: &str) -> Self {
        let mut starter_topics = BTreeMap::new();
        let mut topic_progress = BTreeMap::new();
        for topic in TOPIC_ORDER {
            starter_topics.insert(topic.to_string(), TopicStatus::NotStarted);
            topic_progress.insert(topic.to_string(), TopicProgress::default_at(now));
        }
        Self {
            version: 2,
            starter_topics,
            completed_at: BTreeMap::new(),
            created_at_utc: now.to_string(),
            updated_at_utc: now.to_string(),
            active_topic: None,
            topic_queue: TOPIC_ORDER.iter().map(|t| t.to_string()).collect(),
            recommended_next_topic: Some(TOPIC_ORDER[0].to_string()),
            topic_progress,
            topic_history: Vec::new(),
        }
    }

    /// Lenient parse: every recognisable field of `raw` overlays the default
    /// state; everything else is dropped.
    #[must_use]
    pub fn from_value(raw: &Value, now: &str) -> Self {
        let mut state = Self::default_at(now);
        let Some(object) = raw.as_object() else {
            return state;
        };

        if let Some(version) = object.get("version").and_then(Value::as_i64) {
            state.version = version;
        }
        if let Some(created) = timestamp_field(object.get("created_at_utc")) {
            state.created_at_utc = created;
        }
        if let Some(updated) = timestamp_field(object.get("updated_at_utc")) {
            state.updated_at_utc = updated;
        }
        if let Some(topic) = topic_field(object.get("active_topic")) {
            state.active_topic = Some(topic);
        }
        if let Some(queue) = object.get("topic_queue").and_then(Value::as_array) {
            let parsed = topic_list(queue);
            if !parsed.is_empty() {
                state.topic_queue = parsed;
            }
        }
        if let Some(topic) = topic_field(object.get("recommended_next_topic")) {
            state.recommended_next_topic = Some(topic);
        }

        if let Some(starter) = object.get("starter_topics").and_then(Value::as_object) {
            for topic in TOPIC_ORDER {
                if let Some(status) = starter
                    .get(topic)
                    .and_then(Value::as_str)
                    .and_then(TopicStatus::parse)
                {
                    state.starter_topics.insert(topic.to_string(), status);
                }
            }
        }

        if let Some(completed) = object.get("completed_at").and_then(Value::as_object) {
            state.completed_at = completed
                .iter()
                .filter_map(|(topic, value)| {
                    value.as_str().map(|v| (topic.clone(), v.to_string()))
                })
                .collect();
        }

        if let Some(progress) = object.get("topic_progress").and_then(Value::as_object) {
            for topic in TOPIC_ORDER {
                let Some(raw_progress) = progress.get(topic).and_then(Value::as_object) else {
                    continue;
                };
                let target = state
                    .topic_progress
                    .get_mut(topic)
                    .expect("default progress covers every topic");

                if let Some(status) = raw_progress
                    .get("status")
                    .and_then(Value::as_str)
                    .and_then(TopicStatus::parse)
                {
                    target.status = status;
                    state.starter_topics.insert(topic.to_string(), status);
                }
                if let Some(phase) = raw_progress
                    .get("phase")
                    .and_then(Value::as_str)
                    .and_then(TopicPhase::parse)
                {
                    target.phase = phase;
                }

                for (key, slot) in [
                    ("started_at_utc", &mut target.started_at_utc),
                    ("last_interview_at_utc", &mut target.last_interview_at_utc),
                    ("completed_at_utc", &mut target.completed_at_utc),
                    (
                        "next_followup_due_at_utc",
                        &mut target.next_followup_due_at_utc,
                    ),
                ] {
                    if let Some(value) = timestamp_field(raw_progress.get(key)) {
                        *slot = Some(value);
                    }
                }
                if let Some(value) = timestamp_field(raw_progress.get("last_updated_at_utc")) {
                    target.last_updated_at_utc = value;
                }

                for (key, slot) in [
                    ("question_total", &mut target.question_total),
                    ("question_index", &mut target.question_index),
                    ("followup_cycles", &mut target.followup_cycles),
                ] {
                    if let Some(value) = raw_progress.get(key).and_then(Value::as_u64) {
                        *slot = u32::try_from(value).unwrap_or(u32::MAX);
                    }
                }

                if let Some(future) = raw_progress
                    .get("future_interview_topics")
                    .and_then(Value::as_array)
                {
                    target.future_interview_topics = topic_list(future);
                }
            }
        }

        if let Some(history) = object.get("topic_history").and_then(Value::as_array) {
            let mut parsed: Vec<TopicHistoryEntry> =
                history.iter().filter_map(history_entry).collect();
            let skip = parsed.len().saturating_sub(TOPIC_HISTORY_LIMIT);
            state.topic_history = parsed.split_off(skip);
        }

        state.reconcile(now);
        state
    }

    /// Enforce the cross-field invariants: `starter_topics[t] == complete`
    /// iff `completed_at[t]` is set iff `topic_progress[t].completed_at_utc`
    /// is set; the queue and recommendation never go empty while topics
    /// remain.
    pub fn reconcile(&mut self, now: &str) {
        for topic in TOPIC_ORDER {
            let status = *self
                .starter_topics
                .get(topic)
                .unwrap_or(&TopicStatus::NotStarted);
            let progress = self
                .topic_progress
                .get_mut(topic)
                .expect("progress covers every topic");
            progress.status = status;

            if status == TopicStatus::Complete {
                if let Some(stamp) = progress.completed_at_utc.clone() {
                    self.completed_at.insert(topic.to_string(), stamp);
                } else if let Some(stamp) = self.completed_at.get(topic).cloned() {
                    progress.completed_at_utc = Some(stamp);
                } else {
                    progress.completed_at_utc = Some(now.to_string());
                    self.completed_at.insert(topic.to_string(), now.to_string());
                }
            } else {
                self.completed_at.remove(topic);
                progress.completed_at_utc = None;
            }
        }

        let recommendation_valid = self
            .recommended_next_topic
            .as_deref()
            .is_some_and(|topic| TOPIC_ORDER.contains(&topic));
        if !recommendation_valid {
            self.recommended_next_topic = self.next_incomplete_topic();
        }
        if self.topic_queue.is_empty() {
            self.topic_queue = TOPIC_ORDER.iter().map(|t| t.to_string()).collect();
        }

        let skip = self.topic_history.len().saturating_sub(TOPIC_HISTORY_LIMIT);
        if skip > 0 {
            self.topic_history = self.topic_history.split_off(skip);
        }
    }

    /// First topic in canonical order that is not complete.
    #[must_use]
    pub fn next_incomplete_topic(&self) -> Option<String> {
        TOPIC_ORDER
            .iter()
            .find(|topic| {
                self.starter_topics.get(**topic) != Some(&TopicStatus::Complete)
            })
            .map(|topic| topic.to_string())
    }

    /// Append a history entry, truncating to the ring limit.
    pub fn push_history(&mut self, entry: TopicHistoryEntry) {
        self.topic_history.push(entry);
        let skip = self.topic_history.len().saturating_sub(TOPIC_HISTORY_LIMIT);
        if skip > 0 {
            self.topic_history = self.topic_history.split_off(skip);
        }
    }
}

fn timestamp_field(value: Option<&Value>) -> Option<String> {
    let raw = value?.as_str()?.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

fn topic_field(value: Option<&Value>) -> Option<String> {
    let raw = value?.as_str()?.trim().to_ascii_lowercase();
    TOPIC_ORDER.contains(&raw.as_str()).then_some(raw)
}

fn topic_list(values: &[Value]) -> Vec<String> {
    let mut topics = Vec::new();
    for value in values {
        let Some(raw) = value.as_str() else {
            continue;
        };
        let topic = raw.trim().to_ascii_lowercase();
        if TOPIC_ORDER.contains(&topic.as_str()) && !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    topics
}

fn history_entry(value: &Value) -> Option<TopicHistoryEntry> {
    let object = value.as_object()?;
    let event = object.get("event")?.as_str()?.trim();
    if event.is_empty() {
        return None;
    }
    let topic = object.get("topic")?.as_str()?.trim().to_ascii_lowercase();
    if !TOPIC_ORDER.contains(&topic.as_str()) {
        return None;
    }
    let at_utc = timestamp_field(object.get("at_utc"))?;

    Some(TopicHistoryEntry {
        event: event.to_string(),
        topic,
        at_utc,
        from_status: object
            .get("from_status")
            .and_then(Value::as_str)
            .and_then(TopicStatus::parse),
        to_status: object
            .get("to_status")
            .and_then(Value::as_str)
            .and_then(TopicStatus::parse),
        detail: object
            .get("detail")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from),
    })
}

/// Path of the onboarding state file.
#[must_use]
pub fn state_path(library_root: &Path) -> PathBuf {
    library_root.join(".braindrive").join("onboarding_state.json")
}

/// Read and normalise the onboarding state; missing or corrupt files yield a
/// fresh default.
#[must_use]
pub fn read_onboarding_state(library_root: &Path) -> OnboardingState {
    let now = utc_now_iso();
    let Ok(content) = std::fs::read_to_string(state_path(library_root)) else {
        return OnboardingState::default_at(&now);
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(raw) => OnboardingState::from_value(&raw, &now),
        Err(_) => OnboardingState::default_at(&now),
    }
}

/// Persist the state as canonical JSON (2-space indent, trailing newline).
///
/// The state is re-reconciled and stamped; nothing is written when the
/// canonical rendering already matches the file. Returns the relative path
/// when a write happened.
pub fn persist_onboarding_state(
    library_root: &Path,
    state: &OnboardingState,
) -> ToolResult<Option<PathBuf>> {
    let path = state_path(library_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| write_error(&path, &err))?;
    }

    let now = utc_now_iso();
    let mut normalized = state.clone();
    normalized.reconcile(&now);
    if normalized.created_at_utc.trim().is_empty() {
        normalized.created_at_utc = now.clone();
    }
    normalized.updated_at_utc = now;

    let existing = std::fs::read_to_string(&path)
        .ok()
        .and_then(|content| serde_json::from_str::<Value>(&content).ok());
    let desired = serde_json::to_value(&normalized).expect("state serialises");
    // The write stamp alone must not force a rewrite, or bootstrap would
    // never converge to "no changes".
    if let Some(existing) = &existing {
        if strip_updated_stamp(existing) == strip_updated_stamp(&desired) {
            return Ok(None);
        }
    }

    let rendered = format!(
        "{}\n",
        serde_json::to_string_pretty(&desired).expect("state serialises")
    );
    bdl_fs::atomic_write(&path, &rendered).map_err(|err| write_error(&path, &err))?;
    Ok(Some(PathBuf::from(".braindrive/onboarding_state.json")))
}

fn strip_updated_stamp(value: &Value) -> Value {
    let mut stripped = value.clone();
    if let Some(object) = stripped.as_object_mut() {
        object.remove("updated_at_utc");
    }
    stripped
}

fn write_error(path: &Path, err: &std::io::Error) -> ToolError {
    ToolError::new(ErrorCode::WriteError, "Onboarding state could not be written.")
        .with_detail("path", path.display().to_string())
        .with_detail("cause", err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const NOW: &str = "2026-02-17T12:00:00Z";

    #[test]
    fn default_state_covers_every_topic() {
        let state = OnboardingState::default_at(NOW);
        assert_eq!(state.version, 2);
        assert_eq!(state.starter_topics.len(), TOPIC_ORDER.len());
        assert_eq!(state.topic_progress.len(), TOPIC_ORDER.len());
        assert_eq!(state.topic_queue.len(), TOPIC_ORDER.len());
        assert_eq!(state.recommended_next_topic.as_deref(), Some("finances"));
    }

    #[test]
    fn from_value_tolerates_garbage() {
        let state = OnboardingState::from_value(&json!("not an object"), NOW);
        assert_eq!(state, {
            let mut default = OnboardingState::default_at(NOW);
            default.reconcile(NOW);
            default
        });
    }

    #[test]
    fn from_value_keeps_valid_fields_drops_invalid() {
        let state = OnboardingState::from_value(
            &json!({
                "version": 7,
                "active_topic": "Fitness",
                "topic_queue": ["fitness", "bogus", "fitness", "career"],
                "starter_topics": {"fitness": "in_progress", "career": "nope"},
                "topic_progress": {
                    "fitness": {"status": "in_progress", "phase": "opening", "question_total": 6}
                },
            }),
            NOW,
        );
        assert_eq!(state.version, 7);
        assert_eq!(state.active_topic.as_deref(), Some("fitness"));
        assert_eq!(state.topic_queue, vec!["fitness", "career"]);
        assert_eq!(
            state.starter_topics["fitness"],
            TopicStatus::InProgress
        );
        assert_eq!(state.starter_topics["career"], TopicStatus::NotStarted);
        assert_eq!(state.topic_progress["fitness"].phase, TopicPhase::Opening);
        assert_eq!(state.topic_progress["fitness"].question_total, 6);
    }

    #[test]
    fn reconcile_links_complete_status_and_stamps() {
        let mut state = OnboardingState::default_at(NOW);
        state
            .starter_topics
            .insert("finances".into(), TopicStatus::Complete);
        state.reconcile(NOW);

        assert_eq!(state.completed_at.get("finances").map(String::as_str), Some(NOW));
        assert_eq!(
            state.topic_progress["finances"].completed_at_utc.as_deref(),
            Some(NOW)
        );

        // Downgrading clears both stamps.
        state
            .starter_topics
            .insert("finances".into(), TopicStatus::InProgress);
        state.reconcile(NOW);
        assert!(state.completed_at.get("finances").is_none());
        assert!(state.topic_progress["finances"].completed_at_utc.is_none());
    }

    #[test]
    fn reconcile_recomputes_recommendation() {
        let mut state = OnboardingState::default_at(NOW);
        state
            .starter_topics
            .insert("finances".into(), TopicStatus::Complete);
        state.recommended_next_topic = None;
        state.reconcile(NOW);
        assert_eq!(state.recommended_next_topic.as_deref(), Some("fitness"));
    }

    #[test]
    fn history_ring_truncates_at_limit() {
        let mut state = OnboardingState::default_at(NOW);
        for index in 0..(TOPIC_HISTORY_LIMIT + 25) {
            state.push_history(TopicHistoryEntry {
                event: format!("event-{index}"),
                topic: "finances".into(),
                at_utc: NOW.into(),
                from_status: None,
                to_status: None,
                detail: None,
            });
        }
        assert_eq!(state.topic_history.len(), TOPIC_HISTORY_LIMIT);
        assert_eq!(state.topic_history[0].event, "event-25");
    }

    #[test]
    fn persist_writes_once_then_detects_no_change() {
        let dir = TempDir::new().unwrap();
        let state = read_onboarding_state(dir.path());

        let first = persist_onboarding_state(dir.path(), &state).unwrap();
        assert!(first.is_some());

        let reread = read_onboarding_state(dir.path());
        let second = persist_onboarding_state(dir.path(), &reread).unwrap();
        assert!(second.is_none(), "second persist must be a no-op");
    }

    #[test]
    fn persisted_file_is_canonical_json() {
        let dir = TempDir::new().unwrap();
        let state = read_onboarding_state(dir.path());
        persist_onboarding_state(dir.path(), &state).unwrap();

        let content = std::fs::read_to_string(state_path(dir.path())).unwrap();
        assert!(content.ends_with('\n'));
        assert!(content.starts_with("{\n  \""));
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["version"], 2);
    }

    #[test]
    fn corrupt_file_reads_as_default() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".braindrive")).unwrap();
        std::fs::write(state_path(dir.path()), "{ not json").unwrap();
        let state = read_onboarding_state(dir.path());
        assert_eq!(state.version, 2);
        assert!(state.topic_history.is_empty());
    }

    #[test]
    fn history_entries_validate_topic_and_event() {
        let state = OnboardingState::from_value(
            &json!({
                "topic_history": [
                    {"event": "start", "topic": "finances", "at_utc": NOW},
                    {"event": "", "topic": "finances", "at_utc": NOW},
                    {"event": "start", "topic": "unknown", "at_utc": NOW},
                    {"event": "start", "topic": "fitness"},
                ],
            }),
            NOW,
        );
        assert_eq!(state.topic_history.len(), 1);
        assert_eq!(state.topic_history[0].topic, "finances");
    }
}
