//! Seed text for the canonical library tree.

use crate::{TOPIC_TITLES, topic_title};

/// Root AGENT contract.
pub const ROOT_AGENT_TEMPLATE: &str = "# BrainDrive Library Agent\n\n\
You are working in a user-scoped BrainDrive library.\n\
Read this contract before mutating files.\n\n\
## Priorities\n\
1. Preserve user data.\n\
2. Keep paths canonical.\n\
3. Require explicit approval before mutating writes.\n";

/// `life/AGENT.md` seed.
pub const LIFE_DOMAIN_AGENT_TEMPLATE: &str = "# Life Domain Agent\n\n\
Life-domain context lives under `life/<topic>`.\n\
Each topic must include AGENT.md, spec.md, and build-plan.md.\n";

/// `projects/AGENT.md` seed.
pub const PROJECTS_AGENT_TEMPLATE: &str = "# Projects Domain Agent\n\n\
Use `projects/active` for active projects and `projects/archived` for archived work.\n\
Each project must include AGENT.md, spec.md, build-plan.md, decisions.md, and ideas.md.\n";

/// `capture/AGENT.md` seed.
pub const CAPTURE_AGENT_TEMPLATE: &str = "# Capture Agent\n\n\
Capture raw input in `capture/inbox` and then route it intentionally.\n";

/// `pulse/AGENT.md` seed.
pub const PULSE_AGENT_TEMPLATE: &str = "# Pulse Agent\n\n\
Pulse tracks active tasks in `pulse/index.md` and completed tasks in `pulse/completed/YYYY-MM.md`.\n";

/// `digest/AGENT.md` seed.
pub const DIGEST_AGENT_TEMPLATE: &str = "# Digest Agent\n\n\
Digest rollups derive from `digest/daily` entries.\n";

/// `share/AGENT.md` seed.
pub const SHARE_AGENT_TEMPLATE: &str = "# Share Agent\n\n\
Share templates in `share/templates` and exports in `share/exports`.\n";

/// `me/profile.md` seed.
pub const PROFILE_TEMPLATE: &str =
    "# Profile\n\n## Identity\n\n## Goals\n\n## Constraints\n\n## Preferences\n\n## Last Updated\n";

/// Default rollup-state JSON (canonical 2-space indent, trailing newline).
pub const ROLLUP_STATE_TEMPLATE: &str = "{\n  \"version\": 1,\n  \"last_daily_ingest\": null,\n  \"last_weekly_rollup\": null,\n  \"last_monthly_rollup\": null,\n  \"last_yearly_rollup\": null\n}\n";

/// Default file set for a project directory.
pub fn default_project_files() -> Vec<(&'static str, String)> {
    vec![
        ("AGENT.md", "# Project Agent\n".to_string()),
        ("spec.md", "# Spec\n\n## Scope\nInitial scope.\n".to_string()),
        ("build-plan.md", "# Build Plan\n".to_string()),
        ("decisions.md", "# Decisions\n".to_string()),
        ("ideas.md", "# Ideas\n".to_string()),
    ]
}

/// Seed files for a life topic. Finances carries the richer onboarding seed;
/// the other topics share the generic set.
pub fn topic_seed_files(topic: &str) -> Vec<(&'static str, String)> {
    if topic == "finances" {
        return vec![
            (
                "AGENT.md",
                "# Finances Agent\n\n\
                 This topic helps the user build financial clarity, consistency, and confidence.\n\n\
                 ## Focus Description\n\n\
                 Prioritize practical money management and steady progress.\n\n\
                 ## Interview Focus\n\n\
                 - Income and cash-flow stability\n\
                 - Budget consistency and spending awareness\n\
                 - Debt payoff priorities\n\
                 - Savings and emergency buffer goals\n\
                 - Near-term milestones (30/60/90 days)\n\
                 - Constraints and tradeoffs\n"
                    .to_string(),
            ),
            (
                "interview.md",
                "# Finances Interview\n\n\
                 ## Opening Interview Policy\n\n\
                 - Ask one question at a time.\n\
                 - Opening set should be high-level and capped at 6 questions.\n\
                 - Require approval before each write.\n\
                 - Convert relative dates to explicit dates before final save.\n\n\
                 ## Seed Questions (Fallback)\n\
                 1. What matters most in finances over the next 90 days?\n\
                 2. What is working well today, and what is not?\n\
                 3. Which constraints are blocking progress?\n\
                 4. What would make the next 30 days successful?\n"
                    .to_string(),
            ),
            (
                "spec.md",
                "# Finances Spec\n\n## Current Reality\n\n## Desired Outcomes\n\n## Constraints\n\n## Success Criteria\n"
                    .to_string(),
            ),
            (
                "build-plan.md",
                "# Finances Build Plan\n\n## Phase 1\n\n## Phase 2\n\n## Risks\n\n## Next Review\n"
                    .to_string(),
            ),
            (
                "goals.md",
                "# Finances Goals\n\n## Current Goals\n\n- (to be populated during onboarding)\n"
                    .to_string(),
            ),
            (
                "action-plan.md",
                "# Finances Action Plan\n\n## Immediate Actions\n\n- (to be populated during onboarding)\n"
                    .to_string(),
            ),
        ];
    }

    let title = topic_title(topic);
    let lowered = title.to_lowercase();
    vec![
        (
            "AGENT.md",
            format!("# {title} Agent\n\nUse this folder for {lowered} planning and execution.\n"),
        ),
        (
            "interview.md",
            format!(
                "# {title} Interview\n\n\
                 ## Seed Questions\n\
                 1. What matters most in {lowered} right now?\n\
                 2. What is working and what is not?\n\
                 3. What constraints are blocking progress?\n\
                 4. What would make the next 30 days successful?\n"
            ),
        ),
        (
            "spec.md",
            format!(
                "# {title} Spec\n\n## Current Reality\n\n## Desired Outcomes\n\n## Constraints\n\n## Success Criteria\n"
            ),
        ),
        (
            "build-plan.md",
            format!("# {title} Build Plan\n\n## Phase 1\n\n## Phase 2\n\n## Risks\n\n## Next Review\n"),
        ),
        ("goals.md", format!("# {title} Goals\n\n## Current Goals\n\n")),
        (
            "action-plan.md",
            format!("# {title} Action Plan\n\n## Immediate Actions\n\n"),
        ),
    ]
}

/// Slug of a scope path: the topic for `life/<topic>`, the project name for
/// `projects/...`, otherwise the last segment.
pub fn scope_slug(raw_path: &str) -> String {
    let normalized = raw_path.trim().replace('\\', "/");
    let parts: Vec<&str> = normalized
        .split('/')
        .filter(|part| !part.is_empty())
        .collect();
    match parts.as_slice() {
        [] => "scope".to_string(),
        ["life", topic, ..] => (*topic).to_string(),
        ["projects", "active" | "archived", name, ..] => (*name).to_string(),
        ["projects", name, ..] => (*name).to_string(),
        [.., last] => (*last).to_string(),
    }
}

/// Title-cased display name derived from a scope slug.
pub fn scope_title(raw_path: &str) -> String {
    let slug = scope_slug(raw_path);
    let spaced: String = slug
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    let title: Vec<String> = spaced
        .split_whitespace()
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if title.is_empty() {
        return "Scope".to_string();
    }
    title.join(" ")
}

/// Canonical default file set for a scope path, keyed by what kind of scope
/// the path denotes (life topic, capture, project, generic).
pub fn scope_default_files(raw_path: &str) -> Vec<(String, String)> {
    let normalized = raw_path.trim().replace('\\', "/");
    let normalized = normalized.trim_matches('/');
    let title = scope_title(normalized);

    if normalized.starts_with("life/") {
        let slug = scope_slug(normalized);
        if TOPIC_TITLES.iter().any(|(topic, _)| *topic == slug) {
            return topic_seed_files(&slug)
                .into_iter()
                .map(|(name, content)| (name.to_string(), content))
                .collect();
        }
        let lowered = title.to_lowercase();
        return vec![
            (
                "AGENT.md".to_string(),
                format!("# {title} Agent\n\nUse this folder for {lowered} planning and execution.\n"),
            ),
            (
                "interview.md".to_string(),
                format!(
                    "# {title} Interview\n\n\
                     ## Seed Questions\n\
                     1. What matters most in {lowered} right now?\n\
                     2. What is working and what is not?\n\
                     3. What constraints are blocking progress?\n\
                     4. What would make the next 30 days successful?\n"
                ),
            ),
            (
                "spec.md".to_string(),
                format!(
                    "# {title} Spec\n\n## Current Reality\n\n## Desired Outcomes\n\n## Constraints\n\n## Success Criteria\n"
                ),
            ),
            (
                "build-plan.md".to_string(),
                format!("# {title} Build Plan\n\n## Phase 1\n\n## Phase 2\n\n## Risks\n\n## Next Review\n"),
            ),
            ("goals.md".to_string(), format!("# {title} Goals\n\n## Current Goals\n\n")),
            (
                "action-plan.md".to_string(),
                format!("# {title} Action Plan\n\n## Immediate Actions\n\n"),
            ),
        ];
    }

    if normalized == "capture" || normalized.starts_with("capture/") {
        return vec![(
            "AGENT.md".to_string(),
            "# Capture Agent\n\nCapture raw input in this scope and route intentionally.\n"
                .to_string(),
        )];
    }

    if normalized.starts_with("projects/") {
        let mut files: Vec<(String, String)> = default_project_files()
            .into_iter()
            .map(|(name, content)| (name.to_string(), content))
            .collect();
        for (name, content) in files.iter_mut() {
            if name == "AGENT.md" {
                *content = format!("# {title} Agent\n");
            } else if name == "spec.md" {
                *content = format!("# {title}\n");
            }
        }
        return files;
    }

    vec![
        ("AGENT.md".to_string(), format!("# {title} Agent\n")),
        ("spec.md".to_string(), format!("# {title} Spec\n")),
        ("build-plan.md".to_string(), format!("# {title} Build Plan\n")),
    ]
}
