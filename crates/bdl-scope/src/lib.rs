//! Request-scoped tenant identity and library-root helpers.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bdl_error::{ErrorCode, ToolError, ToolResult};
use std::path::{Path, PathBuf};

/// Header carrying the tenant identity.
pub const USER_ID_HEADER: &str = "X-BrainDrive-User-Id";
/// Header carrying an optional upstream request id.
pub const REQUEST_ID_HEADER: &str = "X-BrainDrive-Request-Id";
/// Header carrying the shared service token.
pub const SERVICE_TOKEN_HEADER: &str = "X-BrainDrive-Service-Token";
/// Request paths exempt from identity enforcement.
pub const AUTH_EXEMPT_PATHS: [&str; 1] = ["/health"];

/// Normalize and validate a raw tenant id.
///
/// Dashes are stripped (UUID-style ids collapse to their hex form) and the
/// result must match `^[A-Za-z0-9_]{3,128}$`.
///
/// # Errors
///
/// `AUTH_REQUIRED` when the id is empty after normalisation,
/// `INVALID_USER_ID` when it contains other characters or has a bad length.
pub fn normalize_user_id(raw_user_id: &str) -> ToolResult<String> {
    let normalized: String = raw_user_id.trim().chars().filter(|c| *c != '-').collect();

    if normalized.is_empty() {
        return Err(ToolError::new(
            ErrorCode::AuthRequired,
            "Missing required user identity header.",
        )
        .with_detail("header", USER_ID_HEADER));
    }

    let valid_chars = normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_chars || normalized.len() < 3 || normalized.len() > 128 {
        return Err(ToolError::new(
            ErrorCode::InvalidUserId,
            "User id contains invalid characters.",
        )
        .with_detail("user_id", raw_user_id));
    }

    Ok(normalized)
}

/// Resolve the scoped library root for a tenant: `<base>/users/<normalized>`.
pub fn resolve_library_root(base_root: &Path, user_id: &str) -> ToolResult<PathBuf> {
    let normalized = normalize_user_id(user_id)?;
    Ok(base_root.join("users").join(normalized))
}

/// Resolve and lazily create the scoped library root.
pub fn ensure_library_root(base_root: &Path, user_id: &str) -> ToolResult<PathBuf> {
    let scoped = resolve_library_root(base_root, user_id)?;
    std::fs::create_dir_all(&scoped).map_err(|err| {
        ToolError::new(ErrorCode::WriteError, "Library root could not be created.")
            .with_detail("path", scoped.display().to_string())
            .with_detail("cause", err.to_string())
    })?;
    Ok(scoped)
}
