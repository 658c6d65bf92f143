//! Tool catalogue: every tool name with its request schema, derived from the
//! typed request structs.

use crate::requests::*;
use bdl_error::{ErrorCode, ToolError, ToolResult};
use serde::Serialize;
use serde_json::Value;

/// One catalogue entry.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Tool name as dispatched.
    pub name: String,
    /// One-line purpose.
    pub description: String,
    /// JSON schema of the request payload.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn descriptor<T: schemars::JsonSchema>(name: &str, description: &str) -> ToolResult<ToolDescriptor> {
    let schema = schemars::schema_for!(T);
    let input_schema = serde_json::to_value(schema).map_err(|err| {
        ToolError::new(ErrorCode::ToolSchemaError, "Tool definitions could not be loaded.")
            .with_detail("tool", name)
            .with_detail("error", err.to_string())
    })?;
    Ok(ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    })
}

/// Build the full tool catalogue.
pub fn tool_catalog() -> ToolResult<Vec<ToolDescriptor>> {
    Ok(vec![
        descriptor::<ReadMarkdownRequest>("read_markdown", "Read markdown content and metadata.")?,
        descriptor::<ListMarkdownFilesRequest>(
            "list_markdown_files",
            "List markdown files recursively under a directory.",
        )?,
        descriptor::<SearchMarkdownRequest>(
            "search_markdown",
            "Search markdown files for a substring.",
        )?,
        descriptor::<PreviewMarkdownChangeRequest>(
            "preview_markdown_change",
            "Preview a markdown edit as a unified diff.",
        )?,
        descriptor::<PreviewBulkChangesRequest>(
            "preview_bulk_changes",
            "Preview multiple markdown changes with aggregate risk.",
        )?,
        descriptor::<CreateMarkdownRequest>("create_markdown", "Create a new markdown file.")?,
        descriptor::<WriteMarkdownRequest>(
            "write_markdown",
            "Append or prepend to a markdown file.",
        )?,
        descriptor::<EditMarkdownRequest>(
            "edit_markdown",
            "Apply a section-aware markdown edit.",
        )?,
        descriptor::<DeleteMarkdownRequest>(
            "delete_markdown",
            "Delete a markdown file with confirmation.",
        )?,
        descriptor::<CreateDirectoryRequest>("create_directory", "Create a directory.")?,
        descriptor::<ListDirectoryRequest>("list_directory", "List files and directories.")?,
        descriptor::<ReadFileMetadataRequest>(
            "read_file_metadata",
            "Read metadata for a file or directory.",
        )?,
        descriptor::<MovePathRequest>("move_path", "Move or rename a file or directory.")?,
        descriptor::<CopyPathRequest>("copy_path", "Copy a file or directory.")?,
        descriptor::<DeletePathRequest>(
            "delete_path",
            "Delete a file or directory with confirmation.",
        )?,
        descriptor::<WriteBinaryRequest>("write_binary", "Write a base64-encoded binary file.")?,
        descriptor::<PreviewMovePathRequest>(
            "preview_move_path",
            "Preview the paths a move would affect.",
        )?,
        descriptor::<PreviewCopyPathRequest>(
            "preview_copy_path",
            "Preview the paths a copy would affect.",
        )?,
        descriptor::<PreviewDeletePathRequest>(
            "preview_delete_path",
            "Preview the paths a delete would remove.",
        )?,
        descriptor::<ProjectExistsRequest>(
            "project_exists",
            "Check whether a project directory exists.",
        )?,
        descriptor::<ListProjectsRequest>("list_projects", "List project directories.")?,
        descriptor::<CreateProjectRequest>(
            "create_project",
            "Create a project directory with markdown files.",
        )?,
        descriptor::<CreateProjectScaffoldRequest>(
            "create_project_scaffold",
            "Create a project with the default scaffold.",
        )?,
        descriptor::<EnsureScopeScaffoldRequest>(
            "ensure_scope_scaffold",
            "Ensure canonical scaffold files exist for a scope.",
        )?,
        descriptor::<ProjectContextRequest>(
            "project_context",
            "Read key project files and metadata in one call.",
        )?,
        descriptor::<ListTasksRequest>("list_tasks", "List tasks with optional filters.")?,
        descriptor::<CreateTaskRequest>("create_task", "Create a task with the next free id.")?,
        descriptor::<UpdateTaskRequest>("update_task", "Update a task by id.")?,
        descriptor::<CompleteTaskRequest>(
            "complete_task",
            "Complete a task, moving it to the monthly log.",
        )?,
        descriptor::<ReopenTaskRequest>("reopen_task", "Reopen a completed task.")?,
        descriptor::<BootstrapUserLibraryRequest>(
            "bootstrap_user_library",
            "Ensure the canonical library structure exists.",
        )?,
        descriptor::<GetOnboardingStateRequest>(
            "get_onboarding_state",
            "Read the onboarding state and next topic.",
        )?,
        descriptor::<StartTopicOnboardingRequest>(
            "start_topic_onboarding",
            "Start onboarding for a topic.",
        )?,
        descriptor::<SaveTopicOnboardingContextRequest>(
            "save_topic_onboarding_context",
            "Persist approved onboarding context.",
        )?,
        descriptor::<CompleteTopicOnboardingRequest>(
            "complete_topic_onboarding",
            "Mark a topic onboarding complete.",
        )?,
        descriptor::<RebuildProfileContextRequest>(
            "rebuild_profile_context",
            "Rebuild the profile from approved facts.",
        )?,
        descriptor::<DigestSnapshotRequest>(
            "digest_snapshot",
            "Tasks, completions, and activity for digests.",
        )?,
        descriptor::<ScoreDigestTasksRequest>(
            "score_digest_tasks",
            "Score and rank tasks for digest display.",
        )?,
        descriptor::<RollupDigestPeriodRequest>(
            "rollup_digest_period",
            "Rebuild a weekly/monthly/yearly digest rollup.",
        )?,
        descriptor::<IngestTranscriptRequest>(
            "ingest_transcript",
            "Store a transcript and update the index.",
        )?,
        descriptor::<ReadActivityLogRequest>(
            "read_activity_log",
            "Read recent activity journal entries.",
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalogue_names_are_unique_and_complete() {
        let catalog = tool_catalog().unwrap();
        let names: HashSet<&str> = catalog.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names.len(), catalog.len());
        assert_eq!(catalog.len(), crate::ToolName::ALL.len());
        for tool in crate::ToolName::ALL {
            assert!(names.contains(tool.as_str()), "{} missing", tool.as_str());
        }
    }

    #[test]
    fn schemas_forbid_unknown_fields() {
        let catalog = tool_catalog().unwrap();
        let read = catalog
            .iter()
            .find(|tool| tool.name == "read_markdown")
            .unwrap();
        assert_eq!(read.input_schema["additionalProperties"], false);
        assert!(
            read.input_schema["required"]
                .as_array()
                .unwrap()
                .iter()
                .any(|v| v == "path")
        );
    }

    #[test]
    fn descriptor_serialises_camel_case_schema_key() {
        let catalog = tool_catalog().unwrap();
        let value = serde_json::to_value(&catalog[0]).unwrap();
        assert!(value.get("inputSchema").is_some());
    }
}
