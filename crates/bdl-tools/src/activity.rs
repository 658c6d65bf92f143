//! Activity journal read handler.

use crate::common::parse_since_field;
use crate::payload::{as_object, optional_positive, reject_unknown_fields};
use bdl_error::ToolResult;
use serde_json::{Value, json};
use std::path::Path;

/// `read_activity_log` — journal tail, optionally filtered by `since`.
pub fn read_activity_log(library_root: &Path, payload: &Value) -> ToolResult<Value> {
    let payload = as_object(payload)?;
    reject_unknown_fields(payload, &["limit", "since"])?;

    let limit = optional_positive(payload, "limit", 50)? as usize;
    let since = parse_since_field(payload.get("since"), "since")?;

    let entries = bdl_journal::read_entries(library_root, since, limit);
    Ok(json!({"entries": entries}))
}
