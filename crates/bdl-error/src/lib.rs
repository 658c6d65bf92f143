//! Unified error taxonomy with stable error codes for the library service.
//!
//! Every tool failure carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, and a small structured details map.
//! Handlers return [`ToolResult`] and the transport layer renders the uniform
//! `{ok, data | error}` envelope via [`ToolEnvelope`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Convenience alias used by every tool handler and core helper.
pub type ToolResult<T> = Result<T, ToolError>;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Payload shape / field validation errors.
    Schema,
    /// Path containment and file-format errors.
    Path,
    /// Missing or conflicting filesystem state.
    Existence,
    /// Operations refused without an explicit confirmation flag.
    Confirmation,
    /// Tenant identity errors.
    Identity,
    /// Commit store, journal, and other internal failures.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Schema => "schema",
            Self::Path => "path",
            Self::Existence => "existence",
            Self::Confirmation => "confirmation",
            Self::Identity => "identity",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is part of
/// the wire contract and must not change across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Schema / validation --
    /// A field has the wrong JSON type.
    InvalidType,
    /// The payload carries fields outside the tool's schema.
    UnknownField,
    /// Required `path` field is absent.
    MissingPath,
    /// Required `content` field is absent.
    MissingContent,
    /// Required `operation` field is absent.
    MissingOperation,
    /// An operation object lacks its `type` field.
    MissingOperationType,
    /// A section operation lacks its `target` heading.
    MissingTarget,
    /// Required `query` field is absent.
    MissingQuery,
    /// A required field combination is absent.
    MissingFields,
    /// Required `title` field is absent.
    MissingTitle,
    /// Required `id` field is absent.
    MissingId,
    /// Required `topic` field is absent.
    MissingTopic,
    /// Required `tasks` field is absent.
    MissingTasks,
    /// Required `period` field is absent.
    MissingPeriod,
    /// Required `changes` field is absent.
    MissingChanges,
    /// Operation type is not one the tool supports.
    InvalidOperation,
    /// Query string is empty.
    InvalidQuery,
    /// A date or date-time string failed to parse.
    InvalidDate,
    /// Bulk-change action is not create/write/edit/delete.
    InvalidAction,
    /// A name field is empty or malformed.
    InvalidName,
    /// A section target is not a markdown heading.
    InvalidTarget,
    /// Topic slug is not in the fixed topic list.
    InvalidTopic,
    /// Rollup period is not week/month/year.
    InvalidPeriod,
    /// Binary content failed base64 validation.
    InvalidContent,
    /// Configured template root does not exist.
    InvalidTemplatePath,
    /// The same file path appears twice in one request.
    DuplicateFiles,

    // -- Path / containment --
    /// Absolute paths are refused.
    AbsolutePath,
    /// `..` segments are refused.
    PathTraversal,
    /// A symlinked component was found along the path.
    PathSymlink,
    /// The path exists but has the wrong kind (file vs directory).
    InvalidPath,
    /// The target does not carry a markdown extension.
    NotMarkdown,
    /// File content is not valid UTF-8.
    InvalidEncoding,

    // -- Existence --
    /// The target path does not exist.
    FileNotFound,
    /// The target path already exists.
    PathExists,
    /// The project directory already exists.
    ProjectExists,
    /// A file in a batch create already exists.
    FileExists,
    /// The target heading is not present in the document.
    SectionNotFound,
    /// No task carries the requested id.
    TaskNotFound,

    // -- Confirmation --
    /// Deletion requires `confirm: true`.
    ConfirmRequired,
    /// Directory deletion requires `recursive: true`.
    RecursiveRequired,
    /// Onboarding writes require `approved: true`.
    ApprovalRequired,

    // -- Identity --
    /// The tenant identity header is missing.
    AuthRequired,
    /// The service token does not match.
    AuthForbidden,
    /// The tenant id fails normalisation.
    InvalidUserId,

    // -- Internal --
    /// Commit store initialisation or commit failed; mutation rolled back.
    GitError,
    /// Activity journal write failed; mutation rolled back.
    LogError,
    /// A filesystem write failed outside the journaled pipeline.
    WriteError,
    /// Tool catalogue schemas could not be produced.
    ToolSchemaError,
    /// The target file could not be read before mutation.
    FileReadFailed,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidType
            | Self::UnknownField
            | Self::MissingPath
            | Self::MissingContent
            | Self::MissingOperation
            | Self::MissingOperationType
            | Self::MissingTarget
            | Self::MissingQuery
            | Self::MissingFields
            | Self::MissingTitle
            | Self::MissingId
            | Self::MissingTopic
            | Self::MissingTasks
            | Self::MissingPeriod
            | Self::MissingChanges
            | Self::InvalidOperation
            | Self::InvalidQuery
            | Self::InvalidDate
            | Self::InvalidAction
            | Self::InvalidName
            | Self::InvalidTarget
            | Self::InvalidTopic
            | Self::InvalidPeriod
            | Self::InvalidContent
            | Self::InvalidTemplatePath
            | Self::DuplicateFiles => ErrorCategory::Schema,

            Self::AbsolutePath
            | Self::PathTraversal
            | Self::PathSymlink
            | Self::InvalidPath
            | Self::NotMarkdown
            | Self::InvalidEncoding => ErrorCategory::Path,

            Self::FileNotFound
            | Self::PathExists
            | Self::ProjectExists
            | Self::FileExists
            | Self::SectionNotFound
            | Self::TaskNotFound => ErrorCategory::Existence,

            Self::ConfirmRequired | Self::RecursiveRequired | Self::ApprovalRequired => {
                ErrorCategory::Confirmation
            }

            Self::AuthRequired | Self::AuthForbidden | Self::InvalidUserId => ErrorCategory::Identity,

            Self::GitError
            | Self::LogError
            | Self::WriteError
            | Self::ToolSchemaError
            | Self::FileReadFailed => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g. `"PATH_TRAVERSAL"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidType => "INVALID_TYPE",
            Self::UnknownField => "UNKNOWN_FIELD",
            Self::MissingPath => "MISSING_PATH",
            Self::MissingContent => "MISSING_CONTENT",
            Self::MissingOperation => "MISSING_OPERATION",
            Self::MissingOperationType => "MISSING_OPERATION_TYPE",
            Self::MissingTarget => "MISSING_TARGET",
            Self::MissingQuery => "MISSING_QUERY",
            Self::MissingFields => "MISSING_FIELDS",
            Self::MissingTitle => "MISSING_TITLE",
            Self::MissingId => "MISSING_ID",
            Self::MissingTopic => "MISSING_TOPIC",
            Self::MissingTasks => "MISSING_TASKS",
            Self::MissingPeriod => "MISSING_PERIOD",
            Self::MissingChanges => "MISSING_CHANGES",
            Self::InvalidOperation => "INVALID_OPERATION",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::InvalidDate => "INVALID_DATE",
            Self::InvalidAction => "INVALID_ACTION",
            Self::InvalidName => "INVALID_NAME",
            Self::InvalidTarget => "INVALID_TARGET",
            Self::InvalidTopic => "INVALID_TOPIC",
            Self::InvalidPeriod => "INVALID_PERIOD",
            Self::InvalidContent => "INVALID_CONTENT",
            Self::InvalidTemplatePath => "INVALID_TEMPLATE_PATH",
            Self::DuplicateFiles => "DUPLICATE_FILES",
            Self::AbsolutePath => "ABSOLUTE_PATH",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::PathSymlink => "PATH_SYMLINK",
            Self::InvalidPath => "INVALID_PATH",
            Self::NotMarkdown => "NOT_MARKDOWN",
            Self::InvalidEncoding => "INVALID_ENCODING",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::PathExists => "PATH_EXISTS",
            Self::ProjectExists => "PROJECT_EXISTS",
            Self::FileExists => "FILE_EXISTS",
            Self::SectionNotFound => "SECTION_NOT_FOUND",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::ConfirmRequired => "CONFIRM_REQUIRED",
            Self::RecursiveRequired => "RECURSIVE_REQUIRED",
            Self::ApprovalRequired => "APPROVAL_REQUIRED",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AuthForbidden => "AUTH_FORBIDDEN",
            Self::InvalidUserId => "INVALID_USER_ID",
            Self::GitError => "GIT_ERROR",
            Self::LogError => "LOG_ERROR",
            Self::WriteError => "WRITE_ERROR",
            Self::ToolSchemaError => "TOOL_SCHEMA_ERROR",
            Self::FileReadFailed => "FILE_READ_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Structured error returned by tool handlers.
///
/// # Builder usage
///
/// ```
/// use bdl_error::{ErrorCode, ToolError};
/// use serde_json::json;
///
/// let err = ToolError::new(ErrorCode::MissingPath, "Path is required.")
///     .with_detail("fields", json!(["path"]));
/// assert_eq!(err.code.as_str(), "MISSING_PATH");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ToolError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Small key-value map with diagnostic context.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ToolError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the details map.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.details.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(details) = serde_json::to_string(&self.details) {
                write!(f, " {details}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ToolError {}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Serialisable error payload carried inside the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl From<&ToolError> for ErrorBody {
    fn from(err: &ToolError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

/// Uniform response envelope shared by every tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Success payload (present iff `ok` is true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error payload (present iff `ok` is false).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ToolEnvelope {
    /// Wrap a successful payload.
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Wrap a failure.
    pub fn failure(err: &ToolError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody::from(err)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
