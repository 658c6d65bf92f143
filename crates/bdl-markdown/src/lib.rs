//! bdl-markdown
//!
//! Markdown section editing. An ATX heading is a line whose first non-space
//! characters are a contiguous run of `#`; its level is the run length. A
//! section spans from its heading through the line before the next heading of
//! equal or lesser level. Edits splice whole lines, preserving the original
//! line endings of everything they do not touch.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bdl_error::{ErrorCode, ToolError, ToolResult};
use bdl_fs::join_with_newline;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::TextDiff;
use std::path::Path;

/// File extensions accepted as markdown (lowercase, no dot).
pub const MARKDOWN_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// Whether a path carries a markdown extension.
#[must_use]
pub fn is_markdown_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lowered = ext.to_ascii_lowercase();
            MARKDOWN_EXTENSIONS.contains(&lowered.as_str())
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Supported markdown operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Concatenate after the document.
    Append,
    /// Concatenate before the document.
    Prepend,
    /// Replace a heading's section bounds.
    ReplaceSection,
    /// Splice content at the start of a section.
    InsertBefore,
    /// Splice content at the end of a section.
    InsertAfter,
}

impl OperationKind {
    /// Parse a wire operation type. Unknown types return `None` so callers
    /// can surface `INVALID_OPERATION` with the raw string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "append" => Some(Self::Append),
            "prepend" => Some(Self::Prepend),
            "replace_section" => Some(Self::ReplaceSection),
            "insert_before" => Some(Self::InsertBefore),
            "insert_after" => Some(Self::InsertAfter),
            _ => None,
        }
    }

    /// Wire name of the operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::ReplaceSection => "replace_section",
            Self::InsertBefore => "insert_before",
            Self::InsertAfter => "insert_after",
        }
    }

    /// Whether the operation addresses a heading section.
    #[must_use]
    pub fn is_section(&self) -> bool {
        matches!(
            self,
            Self::ReplaceSection | Self::InsertBefore | Self::InsertAfter
        )
    }
}

/// A validated operation payload: `{type, content, target?}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
    /// Raw operation type string (membership is checked per apply entry point).
    pub kind: String,
    /// Content to write.
    pub content: String,
    /// Target heading for section operations.
    pub target: Option<String>,
}

/// Validate the shape of an operation payload without applying it.
///
/// # Errors
///
/// `INVALID_TYPE` for non-object payloads or wrongly typed fields,
/// `UNKNOWN_FIELD` for extraneous keys, `MISSING_OPERATION_TYPE` and
/// `MISSING_CONTENT` for absent required fields.
pub fn parse_operation(value: &Value) -> ToolResult<EditOperation> {
    let Some(object) = value.as_object() else {
        return Err(ToolError::new(ErrorCode::InvalidType, "Operation must be an object.")
            .with_detail("operation", value.to_string()));
    };

    let unknown: Vec<&String> = object
        .keys()
        .filter(|key| !matches!(key.as_str(), "type" | "content" | "target"))
        .collect();
    if !unknown.is_empty() {
        return Err(
            ToolError::new(ErrorCode::UnknownField, "Unknown fields are not allowed.")
                .with_detail("fields", unknown),
        );
    }

    let Some(kind_value) = object.get("type") else {
        return Err(
            ToolError::new(ErrorCode::MissingOperationType, "Operation type is required.")
                .with_detail("fields", ["type"]),
        );
    };
    let Some(kind) = kind_value.as_str() else {
        return Err(ToolError::new(ErrorCode::InvalidType, "Operation type must be a string."));
    };

    let Some(content_value) = object.get("content") else {
        return Err(
            ToolError::new(ErrorCode::MissingContent, "Operation content is required.")
                .with_detail("fields", ["content"]),
        );
    };
    let Some(content) = content_value.as_str() else {
        return Err(ToolError::new(
            ErrorCode::InvalidType,
            "Operation content must be a string.",
        ));
    };

    let target = match object.get("target") {
        None | Some(Value::Null) => None,
        Some(Value::String(target)) => Some(target.clone()),
        Some(_) => {
            return Err(ToolError::new(
                ErrorCode::InvalidType,
                "Operation target must be a string.",
            ));
        }
    };

    Ok(EditOperation {
        kind: kind.to_string(),
        content: content.to_string(),
        target,
    })
}

fn resolve_kind(op: &EditOperation) -> ToolResult<OperationKind> {
    OperationKind::parse(&op.kind).ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidOperation, "Unsupported operation type.")
            .with_detail("type", op.kind.clone())
    })
}

/// Apply a whole-document write operation (`append` / `prepend`).
pub fn apply_write(content: &str, op: &EditOperation) -> ToolResult<String> {
    match resolve_kind(op)? {
        OperationKind::Append => Ok(join_with_newline(content, &op.content)),
        OperationKind::Prepend => Ok(join_with_newline(&op.content, content)),
        other => Err(
            ToolError::new(ErrorCode::InvalidOperation, "Unsupported operation type.")
                .with_detail("type", other.as_str()),
        ),
    }
}

/// Apply a section-aware edit operation.
pub fn apply_edit(content: &str, op: &EditOperation) -> ToolResult<String> {
    let kind = resolve_kind(op)?;
    if !kind.is_section() {
        return Err(
            ToolError::new(ErrorCode::InvalidOperation, "Unsupported operation type.")
                .with_detail("type", kind.as_str()),
        );
    }
    let Some(target) = op.target.as_deref().filter(|t| !t.is_empty()) else {
        return Err(ToolError::new(
            ErrorCode::MissingTarget,
            "Target is required for section operations.",
        )
        .with_detail("type", kind.as_str()));
    };
    apply_section_operation(content, kind, target, &op.content)
}

/// Apply any supported operation, as previews do.
///
/// Returns the updated content plus the resolved kind and target for summary
/// rendering.
pub fn apply_preview(
    content: &str,
    op: &EditOperation,
) -> ToolResult<(String, OperationKind, Option<String>)> {
    let kind = resolve_kind(op)?;
    if kind.is_section() && op.target.as_deref().map_or(true, str::is_empty) {
        return Err(ToolError::new(
            ErrorCode::MissingTarget,
            "Target is required for section operations.",
        )
        .with_detail("type", kind.as_str()));
    }

    let updated = match kind {
        OperationKind::Append => join_with_newline(content, &op.content),
        OperationKind::Prepend => join_with_newline(&op.content, content),
        _ => {
            let target = op.target.as_deref().unwrap_or_default();
            apply_section_operation(content, kind, target, &op.content)?
        }
    };
    Ok((updated, kind, op.target.clone()))
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn apply_section_operation(
    content: &str,
    kind: OperationKind,
    target: &str,
    op_content: &str,
) -> ToolResult<String> {
    let lines = split_keepends(content);
    let (start, end) = find_section_bounds(&lines, target)?;
    let insert: Vec<&str> = split_keepends(op_content);

    let spliced: Vec<&str> = match kind {
        OperationKind::ReplaceSection => lines[..start]
            .iter()
            .chain(insert.iter())
            .chain(lines[end..].iter())
            .copied()
            .collect(),
        OperationKind::InsertBefore => lines[..start]
            .iter()
            .chain(insert.iter())
            .chain(lines[start..].iter())
            .copied()
            .collect(),
        OperationKind::InsertAfter => lines[..end]
            .iter()
            .chain(insert.iter())
            .chain(lines[end..].iter())
            .copied()
            .collect(),
        // Callers route append/prepend elsewhere.
        _ => unreachable!("section operation expected"),
    };
    Ok(spliced.concat())
}

/// Extract a target heading's section, including the heading line.
pub fn extract_section(content: &str, target: &str) -> ToolResult<String> {
    let lines = split_keepends(content);
    let (start, end) = find_section_bounds(&lines, target)?;
    Ok(lines[start..end].concat())
}

/// Locate the section bounds for `target` within `lines` (keepends form):
/// the heading line index through the exclusive end index.
fn find_section_bounds(lines: &[&str], target: &str) -> ToolResult<(usize, usize)> {
    let target_line = target.trim();
    if target_line.is_empty() {
        return Err(ToolError::new(
            ErrorCode::InvalidTarget,
            "Target must be a non-empty heading.",
        )
        .with_detail("target", target));
    }

    if heading_level(target_line).is_none() {
        return Err(ToolError::new(
            ErrorCode::InvalidTarget,
            "Target must be a markdown heading.",
        )
        .with_detail("target", target));
    }

    for (index, line) in lines.iter().enumerate() {
        if line.trim() != target_line {
            continue;
        }
        let Some(level) = heading_level(line.trim()) else {
            continue;
        };
        for (offset, next) in lines[index + 1..].iter().enumerate() {
            if let Some(next_level) = heading_level(next.trim_end_matches(['\r', '\n'])) {
                if next_level <= level {
                    return Ok((index, index + 1 + offset));
                }
            }
        }
        return Ok((index, lines.len()));
    }

    Err(ToolError::new(ErrorCode::SectionNotFound, "Target section not found.")
        .with_detail("target", target))
}

/// ATX heading level: the length of the leading `#` run, or `None` for
/// non-heading lines.
fn heading_level(line: &str) -> Option<usize> {
    let stripped = line.trim_start();
    if !stripped.starts_with('#') {
        return None;
    }
    Some(stripped.chars().take_while(|c| *c == '#').count())
}

fn split_keepends(content: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (index, byte) in content.bytes().enumerate() {
        if byte == b'\n' {
            lines.push(&content[start..=index]);
            start = index + 1;
        }
    }
    if start < content.len() {
        lines.push(&content[start..]);
    }
    lines
}

// ---------------------------------------------------------------------------
// Diffs
// ---------------------------------------------------------------------------

/// Produce a unified diff labelled with the tenant-relative path on both
/// sides, plus the added/removed line counts.
pub fn unified_diff(before: &str, after: &str, relative_path: &str) -> (String, usize, usize) {
    if before == after {
        return (String::new(), 0, 0);
    }
    let diff = TextDiff::from_lines(before, after);
    let rendered = diff
        .unified_diff()
        .context_radius(3)
        .header(relative_path, relative_path)
        .to_string();
    let (added, removed) = count_diff_changes(&rendered);
    (rendered, added, removed)
}

fn count_diff_changes(diff: &str) -> (usize, usize) {
    let mut added = 0;
    let mut removed = 0;
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if line.starts_with('+') {
            added += 1;
        } else if line.starts_with('-') {
            removed += 1;
        }
    }
    (added, removed)
}

/// Change-magnitude classification of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// At most 5 changed lines.
    Low,
    /// At most 20 changed lines.
    Medium,
    /// More than 20 changed lines.
    High,
}

impl RiskLevel {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Classify added+removed line counts into a [`RiskLevel`].
#[must_use]
pub fn risk_level(added: usize, removed: usize) -> RiskLevel {
    match added + removed {
        0..=5 => RiskLevel::Low,
        6..=20 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Human summary for previews: `"<type> (<target>): +A -R lines"`.
#[must_use]
pub fn preview_summary(
    kind: &str,
    target: Option<&str>,
    added: usize,
    removed: usize,
) -> String {
    let base = match target {
        Some(target) if !target.is_empty() => format!("{kind} ({target})"),
        _ => kind.to_string(),
    };
    if added == 0 && removed == 0 {
        return base;
    }
    format!("{base}: +{added} -{removed} lines")
}

/// Journal summary for a mutation.
pub fn activity_summary(operation: &str, op: Option<&EditOperation>) -> String {
    match (operation, op) {
        ("write_markdown" | "edit_markdown", Some(op)) => match op.target.as_deref() {
            Some(target) if !target.is_empty() => format!("{} ({target})", op.kind),
            _ => op.kind.clone(),
        },
        ("delete_markdown", _) => "delete file".to_string(),
        _ => operation.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOC: &str = "# Doc\n\n## Scope\nOld scope.\n\n## Details\nOther.\n";

    fn op(kind: &str, content: &str, target: Option<&str>) -> EditOperation {
        EditOperation {
            kind: kind.into(),
            content: content.into(),
            target: target.map(String::from),
        }
    }

    // -- parsing ---------------------------------------------------------

    #[test]
    fn parse_accepts_full_payload() {
        let parsed = parse_operation(&json!({
            "type": "replace_section",
            "content": "## Scope\nNew.\n",
            "target": "## Scope",
        }))
        .unwrap();
        assert_eq!(parsed.kind, "replace_section");
        assert_eq!(parsed.target.as_deref(), Some("## Scope"));
    }

    #[test]
    fn parse_rejects_non_object() {
        let err = parse_operation(&json!("append")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidType);
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let err = parse_operation(&json!({
            "type": "append",
            "content": "x",
            "mode": "force",
        }))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownField);
    }

    #[test]
    fn parse_requires_type_and_content() {
        let err = parse_operation(&json!({"content": "x"})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingOperationType);
        let err = parse_operation(&json!({"type": "append"})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingContent);
    }

    #[test]
    fn parse_rejects_non_string_target() {
        let err = parse_operation(&json!({
            "type": "replace_section",
            "content": "x",
            "target": 7,
        }))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidType);
    }

    // -- write operations ------------------------------------------------

    #[test]
    fn append_joins_with_single_newline() {
        let updated = apply_write("Intro", &op("append", "More", None)).unwrap();
        assert_eq!(updated, "Intro\nMore");
    }

    #[test]
    fn append_does_not_double_newlines() {
        let updated = apply_write("Intro\n", &op("append", "More details\n", None)).unwrap();
        assert_eq!(updated, "Intro\nMore details\n");
    }

    #[test]
    fn prepend_joins_before() {
        let updated = apply_write("body\n", &op("prepend", "# Title\n", None)).unwrap();
        assert_eq!(updated, "# Title\nbody\n");
    }

    #[test]
    fn write_rejects_section_types() {
        let err = apply_write(DOC, &op("replace_section", "x", Some("## Scope"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOperation);
    }

    #[test]
    fn write_rejects_unknown_type() {
        let err = apply_write(DOC, &op("annihilate", "x", None)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOperation);
    }

    // -- section operations ----------------------------------------------

    #[test]
    fn replace_section_swaps_bounds_only() {
        let updated = apply_edit(
            DOC,
            &op(
                "replace_section",
                "## Scope\nNew scope.\n\nMore here.\n\n",
                Some("## Scope"),
            ),
        )
        .unwrap();
        assert_eq!(
            updated,
            "# Doc\n\n## Scope\nNew scope.\n\nMore here.\n\n## Details\nOther.\n"
        );
    }

    #[test]
    fn replace_section_at_end_of_file() {
        let updated = apply_edit(
            DOC,
            &op("replace_section", "## Details\nRewritten.\n", Some("## Details")),
        )
        .unwrap();
        assert_eq!(updated, "# Doc\n\n## Scope\nOld scope.\n\n## Details\nRewritten.\n");
    }

    #[test]
    fn deeper_headings_stay_inside_section() {
        let doc = "## Scope\nbody\n### Sub\nsub body\n## Next\n";
        let updated = apply_edit(
            doc,
            &op("replace_section", "## Scope\nnew\n", Some("## Scope")),
        )
        .unwrap();
        assert_eq!(updated, "## Scope\nnew\n## Next\n");
    }

    #[test]
    fn insert_before_splices_at_section_start() {
        let updated = apply_edit(DOC, &op("insert_before", "Note.\n", Some("## Details"))).unwrap();
        assert_eq!(
            updated,
            "# Doc\n\n## Scope\nOld scope.\n\nNote.\n## Details\nOther.\n"
        );
    }

    #[test]
    fn insert_after_splices_at_section_end() {
        let updated = apply_edit(DOC, &op("insert_after", "Tail.\n", Some("## Scope"))).unwrap();
        assert_eq!(
            updated,
            "# Doc\n\n## Scope\nOld scope.\n\nTail.\n## Details\nOther.\n"
        );
    }

    #[test]
    fn edit_requires_target() {
        let err = apply_edit(DOC, &op("replace_section", "x", None)).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingTarget);
    }

    #[test]
    fn edit_missing_section_errors() {
        let err = apply_edit(DOC, &op("replace_section", "x", Some("## Nope"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::SectionNotFound);
    }

    #[test]
    fn edit_rejects_non_heading_target() {
        let err = apply_edit(DOC, &op("replace_section", "x", Some("Scope"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTarget);
    }

    #[test]
    fn section_roundtrip_is_identity() {
        for target in ["# Doc", "## Scope", "## Details"] {
            let section = extract_section(DOC, target).unwrap();
            let round = apply_edit(DOC, &op("replace_section", &section, Some(target))).unwrap();
            assert_eq!(round, DOC, "round-trip broke for {target}");
        }
    }

    #[test]
    fn preview_handles_all_kinds() {
        let (updated, kind, _target) =
            apply_preview(DOC, &op("append", "tail\n", None)).unwrap();
        assert!(updated.ends_with("tail\n"));
        assert_eq!(kind, OperationKind::Append);

        let (updated, kind, target) = apply_preview(
            DOC,
            &op("insert_after", "Tail.\n", Some("## Scope")),
        )
        .unwrap();
        assert!(updated.contains("Tail.\n"));
        assert_eq!(kind, OperationKind::InsertAfter);
        assert_eq!(target.as_deref(), Some("## Scope"));
    }

    // -- diffs & risk ----------------------------------------------------

    #[test]
    fn unified_diff_labels_both_sides() {
        let (diff, added, removed) = unified_diff("a\n", "b\n", "docs/readme.md");
        assert!(diff.starts_with("--- docs/readme.md\n+++ docs/readme.md\n"));
        assert_eq!((added, removed), (1, 1));
    }

    #[test]
    fn unified_diff_empty_when_unchanged() {
        let (diff, added, removed) = unified_diff("same\n", "same\n", "a.md");
        assert!(diff.is_empty());
        assert_eq!((added, removed), (0, 0));
    }

    #[test]
    fn risk_level_boundaries() {
        assert_eq!(risk_level(5, 0), RiskLevel::Low);
        assert_eq!(risk_level(3, 3), RiskLevel::Medium);
        assert_eq!(risk_level(20, 0), RiskLevel::Medium);
        assert_eq!(risk_level(15, 6), RiskLevel::High);
    }

    #[test]
    fn risk_level_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"high\"");
    }

    // -- summaries -------------------------------------------------------

    #[test]
    fn preview_summary_formats() {
        assert_eq!(preview_summary("append", None, 0, 0), "append");
        assert_eq!(
            preview_summary("replace_section", Some("## Scope"), 2, 1),
            "replace_section (## Scope): +2 -1 lines"
        );
    }

    #[test]
    fn activity_summary_variants() {
        let section = op("replace_section", "x", Some("## Scope"));
        assert_eq!(
            activity_summary("edit_markdown", Some(&section)),
            "replace_section (## Scope)"
        );
        let append = op("append", "x", None);
        assert_eq!(activity_summary("write_markdown", Some(&append)), "append");
        assert_eq!(activity_summary("delete_markdown", None), "delete file");
    }

    #[test]
    fn markdown_extension_check() {
        assert!(is_markdown_path(Path::new("a/b.md")));
        assert!(is_markdown_path(Path::new("a/B.MARKDOWN")));
        assert!(!is_markdown_path(Path::new("a/b.txt")));
        assert!(!is_markdown_path(Path::new("a/b")));
    }
}
