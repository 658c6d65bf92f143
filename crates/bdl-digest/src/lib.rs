//! bdl-digest
//!
//! Digest rollups. Canonical content lives in `digest/daily/**/*.md` (one
//! file per ISO date); the rollup engine groups those entries by ISO week,
//! month, or year, renders a single rollup document, and maintains the
//! `digest/_meta/rollup-state.json` marker. Filesystem changes are reported
//! back so the caller can commit and journal them in one mutation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bdl_error::{ErrorCode, ToolError, ToolResult};
use chrono::{Datelike, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Rollup grouping period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// ISO week.
    Week,
    /// Calendar month.
    Month,
    /// Calendar year.
    Year,
}

impl Period {
    /// Parse the wire period name.
    ///
    /// # Errors
    ///
    /// `INVALID_PERIOD` for anything but `week`/`month`/`year`.
    pub fn parse(raw: &str) -> ToolResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(ToolError::new(
                ErrorCode::InvalidPeriod,
                "period must be one of week, month, or year.",
            )
            .with_detail("period", other)),
        }
    }

    fn header(&self) -> &'static str {
        match self {
            Self::Week => "Weekly",
            Self::Month => "Monthly",
            Self::Year => "Yearly",
        }
    }

    fn state_key(&self) -> &'static str {
        match self {
            Self::Week => "last_weekly_rollup",
            Self::Month => "last_monthly_rollup",
            Self::Year => "last_yearly_rollup",
        }
    }
}

/// One daily digest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyEntry {
    /// Date parsed from the file stem.
    pub date: NaiveDate,
    /// Tenant-relative path.
    pub relative_path: PathBuf,
    /// File content.
    pub content: String,
}

/// The `digest/_meta/rollup-state.json` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupState {
    /// Marker schema version.
    pub version: i64,
    /// Date of the newest daily entry included in any rollup.
    pub last_daily_ingest: Option<String>,
    /// Stamp of the last weekly rollup.
    pub last_weekly_rollup: Option<String>,
    /// Stamp of the last monthly rollup.
    pub last_monthly_rollup: Option<String>,
    /// Stamp of the last yearly rollup.
    pub last_yearly_rollup: Option<String>,
}

impl Default for RollupState {
    fn default() -> Self {
        Self {
            version: 1,
            last_daily_ingest: None,
            last_weekly_rollup: None,
            last_monthly_rollup: None,
            last_yearly_rollup: None,
        }
    }
}

/// Result of one rollup pass, before commit/journal.
#[derive(Debug, Clone)]
pub struct RollupOutcome {
    /// The requested period.
    pub period: Period,
    /// Rendered period label (e.g. `2026-W08`).
    pub label: String,
    /// Tenant-relative rollup document path.
    pub output_path: PathBuf,
    /// Number of daily entries included.
    pub daily_count: usize,
    /// Paths written this pass (empty when everything already matched).
    pub changed_paths: Vec<PathBuf>,
}

/// Collect daily entries whose stem parses as an ISO date, ascending.
#[must_use]
pub fn collect_daily_entries(library_root: &Path) -> Vec<DailyEntry> {
    let daily_root = library_root.join("digest").join("daily");
    let mut entries = Vec::new();

    for entry in WalkDir::new(&daily_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .flatten()
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
            continue;
        };
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        entries.push(DailyEntry {
            date,
            relative_path: path
                .strip_prefix(library_root)
                .unwrap_or(path)
                .to_path_buf(),
            content,
        });
    }

    entries.sort_by_key(|entry| entry.date);
    entries
}

/// Keep the entries that fall inside `period` around `target_date`.
#[must_use]
pub fn filter_period_entries(
    entries: Vec<DailyEntry>,
    period: Period,
    target_date: NaiveDate,
) -> Vec<DailyEntry> {
    entries
        .into_iter()
        .filter(|entry| match period {
            Period::Week => {
                let target = target_date.iso_week();
                let candidate = entry.date.iso_week();
                candidate.year() == target.year() && candidate.week() == target.week()
            }
            Period::Month => {
                entry.date.year() == target_date.year()
                    && entry.date.month() == target_date.month()
            }
            Period::Year => entry.date.year() == target_date.year(),
        })
        .collect()
}

/// The rollup document path and label for a period around `target_date`.
#[must_use]
pub fn period_output_path(
    library_root: &Path,
    period: Period,
    target_date: NaiveDate,
) -> (PathBuf, String) {
    match period {
        Period::Week => {
            let iso = target_date.iso_week();
            let label = format!("{:04}-W{:02}", iso.year(), iso.week());
            (
                library_root
                    .join("digest")
                    .join("weekly")
                    .join(format!("{:04}", iso.year()))
                    .join(format!("{label}.md")),
                label,
            )
        }
        Period::Month => {
            let label = format!("{:04}-{:02}", target_date.year(), target_date.month());
            (
                library_root
                    .join("digest")
                    .join("monthly")
                    .join(format!("{:04}", target_date.year()))
                    .join(format!("{label}.md")),
                label,
            )
        }
        Period::Year => {
            let label = format!("{:04}", target_date.year());
            (
                library_root.join("digest").join("yearly").join(format!("{label}.md")),
                label,
            )
        }
    }
}

/// Render the rollup document: a header line, then one dated subsection per
/// entry with the stripped body (or `_empty_`).
#[must_use]
pub fn render_rollup(period: Period, label: &str, entries: &[DailyEntry]) -> String {
    let mut lines = vec![
        format!("# {} Digest {label}", period.header()),
        String::new(),
        "## Source Daily Entries".to_string(),
    ];

    if entries.is_empty() {
        lines.push(String::new());
        lines.push("- (none)".to_string());
        lines.push(String::new());
        return format!("{}\n", lines.join("\n").trim_end());
    }

    for entry in entries {
        let relative = entry.relative_path.to_string_lossy().replace('\\', "/");
        lines.push(String::new());
        lines.push(format!("### {} ({relative})", entry.date));
        lines.push(String::new());
        let body = entry.content.trim();
        if body.is_empty() {
            lines.push("_empty_".to_string());
        } else {
            lines.push(body.to_string());
        }
    }

    format!("{}\n", lines.join("\n").trim_end())
}

fn rollup_state_path(library_root: &Path) -> PathBuf {
    library_root.join("digest").join("_meta").join("rollup-state.json")
}

/// Read the rollup-state marker, defaulting on missing or corrupt files.
#[must_use]
pub fn read_rollup_state(library_root: &Path) -> RollupState {
    let Ok(content) = std::fs::read_to_string(rollup_state_path(library_root)) else {
        return RollupState::default();
    };
    let Ok(raw) = serde_json::from_str::<serde_json::Value>(&content) else {
        return RollupState::default();
    };

    let mut state = RollupState::default();
    if let Some(version) = raw.get("version").and_then(|v| v.as_i64()) {
        state.version = version;
    }
    for (key, slot) in [
        ("last_daily_ingest", &mut state.last_daily_ingest),
        ("last_weekly_rollup", &mut state.last_weekly_rollup),
        ("last_monthly_rollup", &mut state.last_monthly_rollup),
        ("last_yearly_rollup", &mut state.last_yearly_rollup),
    ] {
        *slot = raw.get(key).and_then(|v| v.as_str()).map(String::from);
    }
    state
}

/// Rebuild the rollup for `period` around `target_date`, updating the rollup
/// document and the state marker when their content changed.
pub fn rollup_period(
    library_root: &Path,
    period: Period,
    target_date: NaiveDate,
) -> ToolResult<RollupOutcome> {
    let entries = collect_daily_entries(library_root);
    let period_entries = filter_period_entries(entries, period, target_date);
    let (output_path, label) = period_output_path(library_root, period, target_date);

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| write_error(parent, &err))?;
    }

    let rendered = render_rollup(period, &label, &period_entries);
    let mut changed_paths = Vec::new();

    let previous = std::fs::read_to_string(&output_path).ok();
    if previous.as_deref() != Some(rendered.as_str()) {
        bdl_fs::atomic_write(&output_path, &rendered)
            .map_err(|err| write_error(&output_path, &err))?;
        changed_paths.push(
            output_path
                .strip_prefix(library_root)
                .unwrap_or(&output_path)
                .to_path_buf(),
        );
    }

    let mut state = read_rollup_state(library_root);
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    match period {
        Period::Week => state.last_weekly_rollup = Some(now),
        Period::Month => state.last_monthly_rollup = Some(now),
        Period::Year => state.last_yearly_rollup = Some(now),
    }
    if let Some(last) = period_entries.last() {
        state.last_daily_ingest = Some(last.date.to_string());
    }

    let state_path = rollup_state_path(library_root);
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| write_error(parent, &err))?;
    }
    let state_rendered = format!(
        "{}\n",
        serde_json::to_string_pretty(&state).expect("state serialises")
    );
    let state_previous = std::fs::read_to_string(&state_path).ok();
    // Only the period stamp moves on a no-op re-run; skip the write unless
    // something else changed so repeated rollups converge.
    let state_differs = match &state_previous {
        None => true,
        Some(previous) => {
            stripped_state(previous) != stripped_state(&state_rendered)
                || !changed_paths.is_empty()
        }
    };
    if state_differs {
        bdl_fs::atomic_write(&state_path, &state_rendered)
            .map_err(|err| write_error(&state_path, &err))?;
        changed_paths.push(
            state_path
                .strip_prefix(library_root)
                .unwrap_or(&state_path)
                .to_path_buf(),
        );
    }

    Ok(RollupOutcome {
        period,
        label,
        output_path: output_path
            .strip_prefix(library_root)
            .unwrap_or(&output_path)
            .to_path_buf(),
        daily_count: period_entries.len(),
        changed_paths,
    })
}

fn stripped_state(rendered: &str) -> serde_json::Value {
    let mut value: serde_json::Value =
        serde_json::from_str(rendered).unwrap_or(serde_json::Value::Null);
    if let Some(object) = value.as_object_mut() {
        object.remove("last_weekly_rollup");
        object.remove("last_monthly_rollup");
        object.remove("last_yearly_rollup");
    }
    value
}

fn write_error(path: &Path, err: &std::io::Error) -> ToolError {
    ToolError::new(ErrorCode::WriteError, "Digest rollup write failed.")
        .with_detail("path", path.display().to_string())
        .with_detail("cause", err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_daily(root: &Path, date: &str, content: &str) {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let path = root
            .join("digest/daily")
            .join(format!("{:04}", parsed.year()))
            .join(format!("{:02}", parsed.month()))
            .join(format!("{date}.md"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn collects_only_iso_dated_markdown() {
        let dir = TempDir::new().unwrap();
        seed_daily(dir.path(), "2026-02-16", "a\n");
        seed_daily(dir.path(), "2026-02-17", "b\n");
        std::fs::write(dir.path().join("digest/daily/notes.md"), "x").unwrap();
        std::fs::write(dir.path().join("digest/daily/2026/02/.gitkeep"), "").unwrap();

        let entries = collect_daily_entries(dir.path());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date, date("2026-02-16"));
        assert_eq!(entries[1].date, date("2026-02-17"));
    }

    #[test]
    fn week_filter_uses_iso_weeks() {
        let dir = TempDir::new().unwrap();
        // 2026-02-16 (Mon) .. 2026-02-22 (Sun) is ISO week 2026-W08.
        seed_daily(dir.path(), "2026-02-15", "sunday before\n");
        seed_daily(dir.path(), "2026-02-16", "monday\n");
        seed_daily(dir.path(), "2026-02-22", "sunday\n");
        seed_daily(dir.path(), "2026-02-23", "next monday\n");

        let entries = collect_daily_entries(dir.path());
        let filtered = filter_period_entries(entries, Period::Week, date("2026-02-18"));
        let dates: Vec<String> = filtered.iter().map(|e| e.date.to_string()).collect();
        assert_eq!(dates, vec!["2026-02-16", "2026-02-22"]);
    }

    #[test]
    fn month_and_year_filters() {
        let dir = TempDir::new().unwrap();
        seed_daily(dir.path(), "2025-12-31", "old year\n");
        seed_daily(dir.path(), "2026-01-31", "january\n");
        seed_daily(dir.path(), "2026-02-01", "february\n");

        let entries = collect_daily_entries(dir.path());
        let month = filter_period_entries(entries.clone(), Period::Month, date("2026-02-14"));
        assert_eq!(month.len(), 1);
        assert_eq!(month[0].date, date("2026-02-01"));

        let year = filter_period_entries(entries, Period::Year, date("2026-06-01"));
        assert_eq!(year.len(), 2);
    }

    #[test]
    fn output_paths_and_labels() {
        let dir = TempDir::new().unwrap();
        let (weekly, label) = period_output_path(dir.path(), Period::Week, date("2026-02-18"));
        assert_eq!(label, "2026-W08");
        assert!(weekly.ends_with("digest/weekly/2026/2026-W08.md"));

        let (monthly, label) = period_output_path(dir.path(), Period::Month, date("2026-02-18"));
        assert_eq!(label, "2026-02");
        assert!(monthly.ends_with("digest/monthly/2026/2026-02.md"));

        let (yearly, label) = period_output_path(dir.path(), Period::Year, date("2026-02-18"));
        assert_eq!(label, "2026");
        assert!(yearly.ends_with("digest/yearly/2026.md"));
    }

    #[test]
    fn render_includes_bodies_and_marks_empty() {
        let entries = vec![
            DailyEntry {
                date: date("2026-02-16"),
                relative_path: PathBuf::from("digest/daily/2026/02/2026-02-16.md"),
                content: "# Daily\n\nDid things.\n".into(),
            },
            DailyEntry {
                date: date("2026-02-17"),
                relative_path: PathBuf::from("digest/daily/2026/02/2026-02-17.md"),
                content: "   \n".into(),
            },
        ];
        let rendered = render_rollup(Period::Week, "2026-W08", &entries);
        assert!(rendered.starts_with("# Weekly Digest 2026-W08\n"));
        assert!(rendered.contains("### 2026-02-16 (digest/daily/2026/02/2026-02-16.md)"));
        assert!(rendered.contains("Did things."));
        assert!(rendered.contains("_empty_"));
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn render_handles_no_entries() {
        let rendered = render_rollup(Period::Month, "2026-02", &[]);
        assert!(rendered.contains("- (none)"));
    }

    #[test]
    fn rollup_writes_document_and_state() {
        let dir = TempDir::new().unwrap();
        seed_daily(dir.path(), "2026-02-16", "monday work\n");
        seed_daily(dir.path(), "2026-02-17", "tuesday work\n");

        let outcome = rollup_period(dir.path(), Period::Week, date("2026-02-18")).unwrap();
        assert_eq!(outcome.daily_count, 2);
        assert_eq!(outcome.label, "2026-W08");
        assert_eq!(outcome.changed_paths.len(), 2);

        let body =
            std::fs::read_to_string(dir.path().join("digest/weekly/2026/2026-W08.md")).unwrap();
        assert!(body.contains("monday work"));
        assert!(body.contains("tuesday work"));

        let state = read_rollup_state(dir.path());
        assert!(state.last_weekly_rollup.is_some());
        assert_eq!(state.last_daily_ingest.as_deref(), Some("2026-02-17"));
    }

    #[test]
    fn rerun_without_new_entries_changes_nothing() {
        let dir = TempDir::new().unwrap();
        seed_daily(dir.path(), "2026-02-16", "monday work\n");

        let first = rollup_period(dir.path(), Period::Week, date("2026-02-18")).unwrap();
        assert!(!first.changed_paths.is_empty());

        let second = rollup_period(dir.path(), Period::Week, date("2026-02-18")).unwrap();
        assert!(
            second.changed_paths.is_empty(),
            "rerun changed {:?}",
            second.changed_paths
        );
    }

    #[test]
    fn corrupt_state_reads_as_default() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("digest/_meta")).unwrap();
        std::fs::write(dir.path().join("digest/_meta/rollup-state.json"), "nope").unwrap();
        assert_eq!(read_rollup_state(dir.path()), RollupState::default());
    }

    #[test]
    fn period_parse_rejects_unknown() {
        assert_eq!(Period::parse(" Week ").unwrap(), Period::Week);
        let err = Period::parse("quarter").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPeriod);
    }
}
