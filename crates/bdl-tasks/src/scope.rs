//! Scope inference from directory conventions.
//!
//! A scope is a canonical tenant-relative directory: `life/<topic>` or
//! `projects/active/<name>` (with plain `projects/<name>` as a fallback for
//! trees that predate the active/archived split). The lookup indexes the
//! scope directories that actually exist so bare names in task meta can be
//! resolved without guessing.

use crate::Task;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Trim separators and normalise backslashes in a scope token.
#[must_use]
pub fn normalize_scope_path(raw: &str) -> String {
    raw.trim()
        .replace('\\', "/")
        .trim_matches('/')
        .to_string()
}

/// The display/name key of a scope path: the topic for `life/<topic>`, the
/// project name for `projects/...`, otherwise the last segment.
#[must_use]
pub fn scope_name(scope_path: &str) -> &str {
    let parts: Vec<&str> = scope_path.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        ["life", topic, ..] => topic,
        ["projects", "active" | "archived", name, ..] => name,
        ["projects", name, ..] => name,
        [.., last] => last,
        [] => scope_path,
    }
}

/// Index of existing scope directories, keyed by bare name.
#[derive(Debug, Clone, Default)]
pub struct ScopeLookup {
    by_name: BTreeMap<String, BTreeSet<String>>,
}

impl ScopeLookup {
    /// Scan `life/*` and `projects/active/*` under the library root, with
    /// direct `projects/<name>` children as a fallback namespace.
    #[must_use]
    pub fn from_library_root(library_root: &Path) -> Self {
        let mut lookup = Self::default();
        for topic in list_dirs(&library_root.join("life")) {
            let scope = format!("life/{topic}");
            lookup.insert(&topic, &scope);
        }
        for name in list_dirs(&library_root.join("projects").join("active")) {
            let scope = format!("projects/active/{name}");
            lookup.insert(&name, &scope);
        }
        for name in list_dirs(&library_root.join("projects")) {
            if name == "active" || name == "archived" {
                continue;
            }
            let scope = format!("projects/{name}");
            lookup.insert(&name, &scope);
        }
        lookup
    }

    /// Register a scope directory under its bare name.
    pub fn insert(&mut self, name: &str, scope_path: &str) {
        self.by_name
            .entry(name.to_string())
            .or_default()
            .insert(scope_path.to_string());
    }

    /// Every scope path registered for a bare name.
    #[must_use]
    pub fn scopes_for(&self, name: &str) -> Vec<String> {
        self.by_name
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve a bare name only when it maps to exactly one scope.
    #[must_use]
    pub fn resolve_unique(&self, name: &str) -> Option<String> {
        let scopes = self.scopes_for(name);
        match scopes.as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        }
    }

    /// Resolve a name the way a project reference does: a `projects/` entry
    /// wins over a `life/` entry carrying the same name.
    #[must_use]
    pub fn resolve_project(&self, name: &str) -> Option<String> {
        let scopes = self.scopes_for(name);
        scopes
            .iter()
            .find(|scope| scope.starts_with("projects/"))
            .or_else(|| scopes.first())
            .cloned()
    }
}

fn list_dirs(path: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(path) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_type()
                .map(|t| t.is_dir() && !t.is_symlink())
                .unwrap_or(false)
        })
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

/// Resolve a token (path or bare name) to a canonical scope path.
///
/// Path-shaped tokens pass through normalisation; bare names consult the
/// lookup and resolve only when unambiguous.
#[must_use]
pub fn canonical_scope(token: &str, lookup: &ScopeLookup) -> Option<String> {
    let normalized = normalize_scope_path(token);
    if normalized.is_empty() {
        return None;
    }
    if normalized.contains('/') {
        return Some(normalized);
    }
    lookup.resolve_unique(&normalized)
}

/// Resolve each task's canonical scope, consulting in order the explicit
/// scope, the project name, then a single unambiguous tag match. When every
/// scoped task in the batch agrees on one scope it propagates to unscoped
/// tasks whose project and tag keys are consistent with it.
pub fn infer_scopes(tasks: &mut [Task], lookup: &ScopeLookup) {
    for task in tasks.iter_mut() {
        if task.scope.is_none() {
            task.scope = resolve_task_scope(task, lookup);
        } else if let Some(scope) = task.scope.clone() {
            // Bare names stored in scope meta still resolve through the lookup.
            if !scope.contains('/') {
                if let Some(resolved) = canonical_scope(&scope, lookup) {
                    task.scope = Some(resolved);
                }
            }
        }
    }

    let mut shared: BTreeSet<String> = BTreeSet::new();
    for task in tasks.iter() {
        if let Some(scope) = &task.scope {
            shared.insert(scope.clone());
        }
    }
    if shared.len() != 1 {
        return;
    }
    let scope = shared.into_iter().next().expect("single shared scope");
    let name = scope_name(&scope).to_string();

    for task in tasks.iter_mut() {
        if task.scope.is_some() {
            continue;
        }
        if let Some(project) = &task.project {
            if project != &name {
                continue;
            }
        }
        let conflicting_tag = task.tags.iter().any(|tag| {
            lookup
                .resolve_unique(tag)
                .is_some_and(|resolved| resolved != scope)
        });
        if conflicting_tag {
            continue;
        }
        task.scope = Some(scope.clone());
    }
}

fn resolve_task_scope(task: &Task, lookup: &ScopeLookup) -> Option<String> {
    if let Some(project) = &task.project {
        if let Some(scope) = lookup.resolve_project(project) {
            return Some(scope);
        }
    }

    let mut tag_matches: BTreeSet<String> = BTreeSet::new();
    for tag in &task.tags {
        if let Some(scope) = lookup.resolve_unique(tag) {
            tag_matches.insert(scope);
        }
    }
    if tag_matches.len() == 1 {
        return tag_matches.into_iter().next();
    }
    None
}

/// Whether a task matches a `project` filter token.
///
/// A path-shaped token must equal the task's canonical scope. A bare name
/// matches the task's project, the name key of its scope, or one of its tags;
/// when the same name exists under both `life/` and `projects/`, a project
/// filter prefers the `projects/` entry.
#[must_use]
pub fn task_matches_project(task: &Task, token: &str, lookup: &ScopeLookup) -> bool {
    let normalized = normalize_scope_path(token);
    if normalized.contains('/') {
        return task.scope.as_deref() == Some(normalized.as_str());
    }

    if task.project.as_deref() == Some(token) {
        return true;
    }

    if let Some(scope) = &task.scope {
        if scope_name(scope) == token {
            let scopes = lookup.scopes_for(token);
            if scopes.len() > 1 {
                if let Some(preferred) = scopes.iter().find(|s| s.starts_with("projects/")) {
                    return scope == preferred;
                }
            }
            return true;
        }
    }

    task.tags.iter().any(|tag| tag == token)
}
