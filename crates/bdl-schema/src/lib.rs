// SPDX-License-Identifier: MIT OR Apache-2.0
//! bdl-schema
//!
//! Canonical library schema: the required directory tree, seed files, legacy
//! migrations, schema-version stamp, and the onboarding state file. The
//! bootstrap is idempotent — every write compares desired content to what is
//! on disk and only touches files that differ, so applying it twice reports
//! zero changes the second time.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod state;
mod templates;

pub use state::{
    OnboardingState, TOPIC_HISTORY_LIMIT, TopicHistoryEntry, TopicPhase, TopicProgress,
    TopicStatus, persist_onboarding_state, read_onboarding_state, state_path,
};
pub use templates::{
    CAPTURE_AGENT_TEMPLATE, DIGEST_AGENT_TEMPLATE, LIFE_DOMAIN_AGENT_TEMPLATE,
    PROFILE_TEMPLATE, PROJECTS_AGENT_TEMPLATE, PULSE_AGENT_TEMPLATE, ROLLUP_STATE_TEMPLATE,
    ROOT_AGENT_TEMPLATE, SHARE_AGENT_TEMPLATE, default_project_files, scope_default_files,
    scope_slug, scope_title, topic_seed_files,
};

use bdl_error::{ErrorCode, ToolError, ToolResult};
use chrono::{Datelike, NaiveDate, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Schema version stamped into `.braindrive/schema-version.json`.
pub const SCHEMA_VERSION: &str = "2026-02-17-v2";

/// Fixed, ordered life-topic slugs.
pub const TOPIC_ORDER: [&str; 5] = ["finances", "fitness", "relationships", "career", "whyfinder"];

/// Display titles per topic.
pub const TOPIC_TITLES: [(&str, &str); 5] = [
    ("finances", "Finances"),
    ("fitness", "Fitness"),
    ("relationships", "Relationships"),
    ("career", "Career"),
    ("whyfinder", "WhyFinder"),
];

/// Environment variable pointing at an external template root.
pub const ENV_BASE_TEMPLATE_PATH: &str = "BRAINDRIVE_LIBRARY_BASE_TEMPLATE_PATH";

/// Bundled fallback template root, relative to the working directory.
pub const BUNDLED_TEMPLATE_PATH: &str = "library_templates/Base_Library";

const REQUIRED_DIRECTORIES: [&str; 20] = [
    ".braindrive",
    "me",
    "capture",
    "capture/inbox",
    "life",
    "projects",
    "projects/active",
    "projects/archived",
    "pulse",
    "pulse/completed",
    "digest",
    "digest/daily",
    "digest/weekly",
    "digest/monthly",
    "digest/yearly",
    "digest/_meta",
    "transcripts",
    "share",
    "share/templates",
    "share/exports",
];

const GITKEEP_FILES: [&str; 10] = [
    "capture/inbox/.gitkeep",
    "projects/active/.gitkeep",
    "projects/archived/.gitkeep",
    "digest/daily/.gitkeep",
    "digest/weekly/.gitkeep",
    "digest/monthly/.gitkeep",
    "digest/yearly/.gitkeep",
    "transcripts/.gitkeep",
    "share/templates/.gitkeep",
    "share/exports/.gitkeep",
];

const AGENT_MIGRATION_DIRECTORIES: [&str; 12] = [
    ".",
    "capture",
    "life",
    "projects",
    "pulse",
    "digest",
    "share",
    "life/finances",
    "life/fitness",
    "life/relationships",
    "life/career",
    "life/whyfinder",
];

/// Display title of a topic slug (falls back to the slug itself).
#[must_use]
pub fn topic_title(topic: &str) -> &str {
    TOPIC_TITLES
        .iter()
        .find(|(slug, _)| *slug == topic)
        .map(|(_, title)| *title)
        .unwrap_or(topic)
}

/// Validate a wire topic value against the fixed list.
///
/// # Errors
///
/// `INVALID_TOPIC` for slugs outside [`TOPIC_ORDER`].
pub fn validate_topic(raw: &str) -> ToolResult<String> {
    let topic = raw.trim().to_ascii_lowercase();
    if !TOPIC_ORDER.contains(&topic.as_str()) {
        return Err(ToolError::new(ErrorCode::InvalidTopic, "Unsupported onboarding topic.")
            .with_detail("topic", raw)
            .with_detail("allowed", TOPIC_ORDER));
    }
    Ok(topic)
}

/// Path of a topic file: `life/<topic>/<filename>`.
#[must_use]
pub fn topic_file_path(library_root: &Path, topic: &str, filename: &str) -> PathBuf {
    library_root.join("life").join(topic).join(filename)
}

/// Current UTC time in the canonical second-precision RFC 3339 form.
#[must_use]
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn required_text_files() -> Vec<(&'static str, String)> {
    vec![
        ("AGENT.md", ROOT_AGENT_TEMPLATE.to_string()),
        ("activity.log", String::new()),
        ("me/profile.md", PROFILE_TEMPLATE.to_string()),
        ("capture/AGENT.md", CAPTURE_AGENT_TEMPLATE.to_string()),
        ("life/AGENT.md", LIFE_DOMAIN_AGENT_TEMPLATE.to_string()),
        ("projects/AGENT.md", PROJECTS_AGENT_TEMPLATE.to_string()),
        ("pulse/AGENT.md", PULSE_AGENT_TEMPLATE.to_string()),
        ("pulse/index.md", "# Pulse Index\n".to_string()),
        ("digest/AGENT.md", DIGEST_AGENT_TEMPLATE.to_string()),
        ("share/AGENT.md", SHARE_AGENT_TEMPLATE.to_string()),
        ("digest/_meta/rollup-state.json", ROLLUP_STATE_TEMPLATE.to_string()),
    ]
}

/// Result of one bootstrap application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaApplyResult {
    /// Every path written this run, sorted and deduplicated.
    pub changed_paths: Vec<PathBuf>,
    /// Paths created from scratch.
    pub created_paths: Vec<PathBuf>,
    /// Legacy `agents.md` files copied into `AGENT.md`.
    pub migrated_paths: Vec<PathBuf>,
}

impl SchemaApplyResult {
    /// Whether this run touched anything.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.changed_paths.is_empty()
    }
}

/// Ensure the canonical user-scoped structure exists without destructive
/// writes.
///
/// `today` pins the digest starter file names; `None` uses the current UTC
/// date. Period starter files are only seeded when
/// `include_digest_period_files` is set.
pub fn ensure_scoped_library_structure(
    library_root: &Path,
    include_digest_period_files: bool,
    today: Option<NaiveDate>,
) -> ToolResult<SchemaApplyResult> {
    std::fs::create_dir_all(library_root)
        .map_err(|err| write_error(library_root, &err))?;

    let mut created: Vec<PathBuf> = Vec::new();
    let mut migrated: Vec<PathBuf> = Vec::new();
    let mut changed: BTreeMap<String, PathBuf> = BTreeMap::new();
    fn note(path: PathBuf, changed: &mut BTreeMap<String, PathBuf>) {
        changed.insert(path.to_string_lossy().replace('\\', "/"), path);
    }

    for relative_dir in REQUIRED_DIRECTORIES {
        let target = library_root.join(relative_dir);
        if !target.exists() {
            std::fs::create_dir_all(&target).map_err(|err| write_error(&target, &err))?;
            let relative = PathBuf::from(relative_dir);
            created.push(relative.clone());
            note(relative, &mut changed);
        }
    }

    for relative in migrate_legacy_agents(library_root)? {
        migrated.push(relative.clone());
        note(relative, &mut changed);
    }

    for (relative_path, content) in required_text_files() {
        if let Some(relative) = write_text_if_missing(library_root, relative_path, &content)? {
            created.push(relative.clone());
            note(relative, &mut changed);
        }
    }

    for topic in TOPIC_ORDER {
        let topic_root = library_root.join("life").join(topic);
        if !topic_root.exists() {
            std::fs::create_dir_all(&topic_root).map_err(|err| write_error(&topic_root, &err))?;
            let relative = PathBuf::from("life").join(topic);
            created.push(relative.clone());
            note(relative, &mut changed);
        }
        for (filename, content) in topic_seed_files(topic) {
            let relative_path = format!("life/{topic}/{filename}");
            if let Some(relative) = write_text_if_missing(library_root, &relative_path, &content)? {
                created.push(relative.clone());
                note(relative, &mut changed);
            }
        }
    }

    for relative_path in GITKEEP_FILES {
        if let Some(relative) = write_text_if_missing(library_root, relative_path, "")? {
            created.push(relative.clone());
            note(relative, &mut changed);
        }
    }

    if include_digest_period_files {
        let marker_day = today.unwrap_or_else(|| Utc::now().date_naive());
        for (path, content) in digest_starter_paths(library_root, marker_day) {
            if path.exists() {
                continue;
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| write_error(parent, &err))?;
            }
            bdl_fs::atomic_write(&path, &content).map_err(|err| write_error(&path, &err))?;
            let relative = path
                .strip_prefix(library_root)
                .unwrap_or(&path)
                .to_path_buf();
            created.push(relative.clone());
            note(relative, &mut changed);
        }
    }

    if let Some(relative) = ensure_schema_version(library_root)? {
        note(relative, &mut changed);
    }

    let state = read_onboarding_state(library_root);
    if let Some(relative) = persist_onboarding_state(library_root, &state)? {
        created.push(relative.clone());
        note(relative, &mut changed);
    }

    let result = SchemaApplyResult {
        changed_paths: changed.into_values().collect(),
        created_paths: created,
        migrated_paths: migrated,
    };
    debug!(
        target: "bdl.schema",
        changed = result.changed_paths.len(),
        migrated = result.migrated_paths.len(),
        "schema ensure pass complete"
    );
    Ok(result)
}

/// Full bootstrap: template projection (when configured) followed by the
/// canonical structure pass.
pub fn bootstrap_library(library_root: &Path) -> ToolResult<SchemaApplyResult> {
    let mut changed: BTreeMap<String, PathBuf> = BTreeMap::new();

    if let Some(template_root) = resolve_template_root()? {
        for relative in copy_template_idempotent(&template_root, library_root)? {
            changed.insert(relative.to_string_lossy().replace('\\', "/"), relative);
        }
    }

    let mut result = ensure_scoped_library_structure(library_root, true, None)?;
    for path in result.changed_paths {
        changed.insert(path.to_string_lossy().replace('\\', "/"), path);
    }
    result.changed_paths = changed.into_values().collect();
    Ok(result)
}

/// Resolve the template root: the environment override when set (it must
/// exist), otherwise the bundled fallback when present.
pub fn resolve_template_root() -> ToolResult<Option<PathBuf>> {
    let raw = std::env::var(ENV_BASE_TEMPLATE_PATH).unwrap_or_default();
    let raw = raw.trim();
    if !raw.is_empty() {
        let candidate = PathBuf::from(raw);
        if !candidate.is_dir() {
            return Err(ToolError::new(
                ErrorCode::InvalidTemplatePath,
                "Configured base template path does not exist.",
            )
            .with_detail("path", raw));
        }
        return Ok(Some(candidate));
    }

    let fallback = PathBuf::from(BUNDLED_TEMPLATE_PATH);
    if fallback.is_dir() {
        return Ok(Some(fallback));
    }
    Ok(None)
}

/// Copy a template tree into the library. Existing targets are never
/// overwritten. Returns the relative paths of copied files.
pub fn copy_template_idempotent(
    source_root: &Path,
    destination_root: &Path,
) -> ToolResult<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for entry in WalkDir::new(source_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .flatten()
    {
        let Ok(relative) = entry.path().strip_prefix(source_root) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = destination_root.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|err| write_error(&target, &err))?;
            continue;
        }
        if !entry.file_type().is_file() || target.exists() {
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|err| write_error(parent, &err))?;
        }
        std::fs::copy(entry.path(), &target).map_err(|err| write_error(&target, &err))?;
        copied.push(relative.to_path_buf());
    }
    Ok(copied)
}

/// Seed the current daily/weekly/monthly/yearly digest files for `today`.
fn digest_starter_paths(library_root: &Path, today: NaiveDate) -> Vec<(PathBuf, String)> {
    let iso = today.iso_week();
    let week_label = format!("{:04}-W{:02}", iso.year(), iso.week());
    let month_label = format!("{:04}-{:02}", today.year(), today.month());
    vec![
        (
            library_root
                .join("digest")
                .join("daily")
                .join(format!("{:04}", today.year()))
                .join(format!("{:02}", today.month()))
                .join(format!("{today}.md")),
            format!("# Daily Digest {today}\n\n"),
        ),
        (
            library_root
                .join("digest")
                .join("weekly")
                .join(format!("{:04}", iso.year()))
                .join(format!("{week_label}.md")),
            format!("# Weekly Digest {week_label}\n\n"),
        ),
        (
            library_root
                .join("digest")
                .join("monthly")
                .join(format!("{:04}", today.year()))
                .join(format!("{month_label}.md")),
            format!("# Monthly Digest {month_label}\n\n"),
        ),
        (
            library_root
                .join("digest")
                .join("yearly")
                .join(format!("{:04}.md", today.year())),
            format!("# Yearly Digest {:04}\n\n", today.year()),
        ),
    ]
}

/// Copy legacy lowercase `agents.md` into `AGENT.md` for the closed
/// migration set. The legacy file stays in place.
fn migrate_legacy_agents(library_root: &Path) -> ToolResult<Vec<PathBuf>> {
    let mut changed = Vec::new();
    for relative_dir in AGENT_MIGRATION_DIRECTORIES {
        let directory = if relative_dir == "." {
            library_root.to_path_buf()
        } else {
            library_root.join(relative_dir)
        };
        if !directory.is_dir() {
            continue;
        }

        let canonical = directory.join("AGENT.md");
        let legacy = directory.join("agents.md");
        if canonical.exists() || !legacy.exists() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&legacy) else {
            continue;
        };
        bdl_fs::atomic_write(&canonical, &content).map_err(|err| write_error(&canonical, &err))?;
        changed.push(
            canonical
                .strip_prefix(library_root)
                .unwrap_or(&canonical)
                .to_path_buf(),
        );
    }
    Ok(changed)
}

fn ensure_schema_version(library_root: &Path) -> ToolResult<Option<PathBuf>> {
    let version_path = library_root.join(".braindrive").join("schema-version.json");
    if let Some(parent) = version_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| write_error(parent, &err))?;
    }
    let desired = serde_json::json!({"schema_version": SCHEMA_VERSION});

    let existing = std::fs::read_to_string(&version_path)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok());
    if existing.as_ref() == Some(&desired) {
        return Ok(None);
    }

    let rendered = format!("{}\n", serde_json::to_string_pretty(&desired).expect("serialises"));
    bdl_fs::atomic_write(&version_path, &rendered).map_err(|err| write_error(&version_path, &err))?;
    Ok(Some(PathBuf::from(".braindrive/schema-version.json")))
}

fn write_text_if_missing(
    library_root: &Path,
    relative_path: &str,
    content: &str,
) -> ToolResult<Option<PathBuf>> {
    let target = library_root.join(relative_path);
    if target.exists() {
        return Ok(None);
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|err| write_error(parent, &err))?;
    }
    bdl_fs::atomic_write(&target, content).map_err(|err| write_error(&target, &err))?;
    Ok(Some(PathBuf::from(relative_path)))
}

fn write_error(path: &Path, err: &std::io::Error) -> ToolError {
    ToolError::new(ErrorCode::WriteError, "Library schema write failed.")
        .with_detail("path", path.display().to_string())
        .with_detail("cause", err.to_string())
}
