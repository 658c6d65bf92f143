// SPDX-License-Identifier: MIT OR Apache-2.0
//! bdl-tools
//!
//! The typed tool surface of the library service. Each tool takes a JSON
//! payload and a tenant library root; dispatch routes a tool name to its
//! handler and the transport wraps results in the uniform envelope.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod activity;
mod catalog;
mod common;
mod digest;
mod files;
mod markdown;
mod onboarding;
mod payload;
mod projects;
mod requests;
mod tasks;
mod transcripts;

pub use catalog::{ToolDescriptor, tool_catalog};
pub use requests::*;

use bdl_error::{ErrorCode, ToolError, ToolResult};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

macro_rules! tool_names {
    ($(($variant:ident, $name:literal, $handler:path)),+ $(,)?) => {
        /// Every dispatchable tool.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ToolName {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl ToolName {
            /// All tools, in catalogue order.
            pub const ALL: &'static [ToolName] = &[$(ToolName::$variant),+];

            /// Wire name of the tool.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            /// Parse a wire tool name.
            #[must_use]
            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn handler(&self) -> fn(&Path, &Value) -> ToolResult<Value> {
                match self {
                    $(Self::$variant => $handler,)+
                }
            }
        }
    };
}

tool_names! {
    (ReadMarkdown, "read_markdown", markdown::read_markdown),
    (ListMarkdownFiles, "list_markdown_files", markdown::list_markdown_files),
    (SearchMarkdown, "search_markdown", markdown::search_markdown),
    (PreviewMarkdownChange, "preview_markdown_change", markdown::preview_markdown_change),
    (PreviewBulkChanges, "preview_bulk_changes", markdown::preview_bulk_changes),
    (CreateMarkdown, "create_markdown", markdown::create_markdown),
    (WriteMarkdown, "write_markdown", markdown::write_markdown),
    (EditMarkdown, "edit_markdown", markdown::edit_markdown),
    (DeleteMarkdown, "delete_markdown", markdown::delete_markdown),
    (CreateDirectory, "create_directory", files::create_directory),
    (ListDirectory, "list_directory", files::list_directory),
    (ReadFileMetadata, "read_file_metadata", files::read_file_metadata),
    (MovePath, "move_path", files::move_path),
    (CopyPath, "copy_path", files::copy_path),
    (DeletePath, "delete_path", files::delete_path),
    (WriteBinary, "write_binary", files::write_binary),
    (PreviewMovePath, "preview_move_path", files::preview_move_path),
    (PreviewCopyPath, "preview_copy_path", files::preview_copy_path),
    (PreviewDeletePath, "preview_delete_path", files::preview_delete_path),
    (ProjectExists, "project_exists", projects::project_exists),
    (ListProjects, "list_projects", projects::list_projects),
    (CreateProject, "create_project", projects::create_project),
    (CreateProjectScaffold, "create_project_scaffold", projects::create_project_scaffold),
    (EnsureScopeScaffold, "ensure_scope_scaffold", projects::ensure_scope_scaffold),
    (ProjectContext, "project_context", projects::project_context),
    (ListTasks, "list_tasks", tasks::list_tasks),
    (CreateTask, "create_task", tasks::create_task),
    (UpdateTask, "update_task", tasks::update_task),
    (CompleteTask, "complete_task", tasks::complete_task),
    (ReopenTask, "reopen_task", tasks::reopen_task),
    (BootstrapUserLibrary, "bootstrap_user_library", onboarding::bootstrap_user_library),
    (GetOnboardingState, "get_onboarding_state", onboarding::get_onboarding_state),
    (StartTopicOnboarding, "start_topic_onboarding", onboarding::start_topic_onboarding),
    (SaveTopicOnboardingContext, "save_topic_onboarding_context", onboarding::save_topic_onboarding_context),
    (CompleteTopicOnboarding, "complete_topic_onboarding", onboarding::complete_topic_onboarding),
    (RebuildProfileContext, "rebuild_profile_context", onboarding::rebuild_profile_context),
    (DigestSnapshot, "digest_snapshot", digest::digest_snapshot),
    (ScoreDigestTasks, "score_digest_tasks", digest::score_digest_tasks),
    (RollupDigestPeriod, "rollup_digest_period", digest::rollup_digest_period),
    (IngestTranscript, "ingest_transcript", transcripts::ingest_transcript),
    (ReadActivityLog, "read_activity_log", activity::read_activity_log),
}

/// Dispatch a tool call against a tenant library root.
///
/// # Errors
///
/// `INVALID_ACTION` for unknown tool names; otherwise whatever the handler
/// returns.
pub fn dispatch(library_root: &Path, tool: &str, payload: &Value) -> ToolResult<Value> {
    let Some(tool) = ToolName::parse(tool) else {
        return Err(ToolError::new(ErrorCode::InvalidAction, "Unknown tool name.")
            .with_detail("tool", tool));
    };
    debug!(target: "bdl.tools", tool = tool.as_str(), "dispatching tool call");
    (tool.handler())(library_root, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn parse_roundtrips_every_tool() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::parse(tool.as_str()), Some(*tool));
        }
        assert_eq!(ToolName::ALL.len(), 41);
    }

    #[test]
    fn unknown_tool_is_invalid_action() {
        let dir = TempDir::new().unwrap();
        let err = dispatch(dir.path(), "destroy_everything", &json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAction);
    }

    #[test]
    fn dispatch_reaches_handlers() {
        let dir = TempDir::new().unwrap();
        let err = dispatch(dir.path(), "read_markdown", &json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingPath);
    }
}
