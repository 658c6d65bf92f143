//! Digest scoring: rank tasks for display by priority, focus, blockage, and
//! due-date pressure. Ties keep their original order (the sort is stable).

use crate::Task;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// A task with its computed score and the reasons behind it.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredTask {
    /// The scored task payload.
    pub task: serde_json::Value,
    /// Total score.
    pub score: i64,
    /// Human-readable scoring reasons, in application order.
    pub reasons: Vec<String>,
}

/// Score a single task.
///
/// Priority maps p0→100, p1→70, p2→40, p3→20 (default 10). A focus-project
/// match adds 10. The `blocked` tag subtracts 100. Due dates add 30 when
/// overdue, 25 within a day, 20 within three, 10 within seven.
#[must_use]
pub fn score_task(task: &Task, focus_project: Option<&str>, now: DateTime<Utc>) -> (i64, Vec<String>) {
    let mut reasons = Vec::new();
    let mut score: i64 = 0;

    let priority = task.priority.as_deref().unwrap_or("p2");
    let priority_score = match priority {
        "p0" => 100,
        "p1" => 70,
        "p2" => 40,
        "p3" => 20,
        _ => 10,
    };
    score += priority_score;
    reasons.push(format!("priority:{priority}"));

    if let (Some(focus), Some(project)) = (focus_project, task.project.as_deref()) {
        if focus == project {
            score += 10;
            reasons.push("focus_project".to_string());
        }
    }

    if task.tags.iter().any(|tag| tag == "blocked") {
        score -= 100;
        reasons.push("blocked".to_string());
    }

    if let Some(due) = task.due.as_deref() {
        match parse_due(due) {
            Some(due_at) => {
                // Whole days until due, floored. Date-only dues parse as
                // midnight, so anything due today or tomorrow-at-midnight
                // from a partial day out floors to <= 0 and scores overdue.
                let delta_days = (due_at - now).num_seconds().div_euclid(86_400);
                if delta_days <= 0 {
                    score += 30;
                    reasons.push("due_overdue".to_string());
                } else if delta_days <= 1 {
                    score += 25;
                    reasons.push("due_1d".to_string());
                } else if delta_days <= 3 {
                    score += 20;
                    reasons.push("due_3d".to_string());
                } else if delta_days <= 7 {
                    score += 10;
                    reasons.push("due_7d".to_string());
                }
            }
            None => reasons.push("due_invalid".to_string()),
        }
    }

    (score, reasons)
}

fn parse_due(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-17T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn task_with(priority: Option<&str>, tags: &[&str], due: Option<&str>) -> Task {
        let mut task = Task::new(1, "t");
        task.priority = priority.map(String::from);
        task.tags = tags.iter().map(|t| t.to_string()).collect();
        task.due = due.map(String::from);
        task
    }

    #[test]
    fn priority_table() {
        for (priority, expected) in [("p0", 100), ("p1", 70), ("p2", 40), ("p3", 20), ("p9", 10)] {
            let (score, reasons) = score_task(&task_with(Some(priority), &[], None), None, now());
            assert_eq!(score, expected, "priority {priority}");
            assert_eq!(reasons[0], format!("priority:{priority}"));
        }
    }

    #[test]
    fn missing_priority_defaults_to_p2() {
        let (score, reasons) = score_task(&task_with(None, &[], None), None, now());
        assert_eq!(score, 40);
        assert_eq!(reasons[0], "priority:p2");
    }

    #[test]
    fn focus_project_bonus() {
        let mut task = task_with(Some("p2"), &[], None);
        task.project = Some("demo".into());
        let (score, reasons) = score_task(&task, Some("demo"), now());
        assert_eq!(score, 50);
        assert!(reasons.contains(&"focus_project".to_string()));

        let (score, _) = score_task(&task, Some("other"), now());
        assert_eq!(score, 40);
    }

    #[test]
    fn blocked_penalty() {
        let (score, reasons) = score_task(&task_with(Some("p0"), &["blocked"], None), None, now());
        assert_eq!(score, 0);
        assert!(reasons.contains(&"blocked".to_string()));
    }

    #[test]
    fn due_date_ladder() {
        for (due, bonus, reason) in [
            ("2026-02-16", 30, "due_overdue"),
            ("2026-02-17", 30, "due_overdue"),
            // Midnight due, midday now: the floored delta is 0, so a
            // date-only "tomorrow" still reads as overdue.
            ("2026-02-18", 30, "due_overdue"),
            ("2026-02-19", 25, "due_1d"),
            ("2026-02-20", 20, "due_3d"),
            ("2026-02-24", 10, "due_7d"),
            ("2026-03-17", 0, "priority:p2"),
        ] {
            let (score, reasons) =
                score_task(&task_with(Some("p2"), &[], Some(due)), None, now());
            assert_eq!(score, 40 + bonus, "due {due}");
            assert!(reasons.iter().any(|r| r == reason), "due {due}: {reasons:?}");
        }
    }

    #[test]
    fn invalid_due_noted_without_bonus() {
        let (score, reasons) =
            score_task(&task_with(Some("p2"), &[], Some("someday")), None, now());
        assert_eq!(score, 40);
        assert!(reasons.contains(&"due_invalid".to_string()));
    }
}
