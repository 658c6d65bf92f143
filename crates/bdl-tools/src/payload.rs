//! Payload validation helpers shared by every tool handler.
//!
//! Payload shape mistakes surface with the specific stable code each field
//! owns (`MISSING_PATH`, `INVALID_TYPE`, ...), so handlers extract fields
//! through these helpers rather than deserialising whole structs.

use bdl_error::{ErrorCode, ToolError, ToolResult};
use serde_json::{Map, Value};

/// JSON type name used in error details.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The payload must be a JSON object.
pub fn as_object(payload: &Value) -> ToolResult<&Map<String, Value>> {
    payload.as_object().ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidType, "Payload must be an object.")
            .with_detail("type", json_type_name(payload))
    })
}

/// Reject any field outside the allowed set.
pub fn reject_unknown_fields(object: &Map<String, Value>, allowed: &[&str]) -> ToolResult<()> {
    let mut unknown: Vec<&str> = object
        .keys()
        .map(String::as_str)
        .filter(|key| !allowed.contains(key))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    Err(
        ToolError::new(ErrorCode::UnknownField, "Unknown fields are not allowed.")
            .with_detail("fields", unknown),
    )
}

/// A required field, with the field-specific missing code and message.
pub fn require_field<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    code: ErrorCode,
    message: &str,
) -> ToolResult<&'a Value> {
    object
        .get(key)
        .ok_or_else(|| ToolError::new(code, message).with_detail("fields", [key]))
}

/// A required string field.
pub fn require_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    code: ErrorCode,
    message: &str,
) -> ToolResult<&'a str> {
    let value = require_field(object, key, code, message)?;
    value.as_str().ok_or_else(|| {
        ToolError::new(ErrorCode::InvalidType, format!("{key} must be a string."))
            .with_detail(key, value.to_string())
            .with_detail("type", json_type_name(value))
    })
}

/// An optional string field (absent and `null` both read as `None`).
pub fn optional_str<'a>(object: &'a Map<String, Value>, key: &str) -> ToolResult<Option<&'a str>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(
            ToolError::new(ErrorCode::InvalidType, format!("{key} must be a string."))
                .with_detail(key, other.to_string())
                .with_detail("type", json_type_name(other)),
        ),
    }
}

/// An optional boolean field with a default.
pub fn optional_bool(object: &Map<String, Value>, key: &str, default: bool) -> ToolResult<bool> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(value)) => Ok(*value),
        Some(other) => Err(
            ToolError::new(ErrorCode::InvalidType, format!("{key} must be a boolean."))
                .with_detail(key, other.to_string())
                .with_detail("type", json_type_name(other)),
        ),
    }
}

/// An optional positive integer with a default.
pub fn optional_positive(object: &Map<String, Value>, key: &str, default: u64) -> ToolResult<u64> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            let parsed = value.as_u64().filter(|v| *v > 0);
            parsed.ok_or_else(|| {
                ToolError::new(
                    ErrorCode::InvalidType,
                    format!("{key} must be a positive integer."),
                )
                .with_detail(key, value.to_string())
            })
        }
    }
}

/// An optional list of strings (non-strings are dropped, as the ledger
/// tolerates them).
pub fn optional_string_list(object: &Map<String, Value>, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn as_object_rejects_non_objects() {
        let err = as_object(&json!([1, 2])).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidType);
        assert_eq!(err.details["type"], json!("array"));
    }

    #[test]
    fn unknown_fields_are_sorted_in_details() {
        let payload = object(json!({"path": "a.md", "zz": 1, "aa": 2}));
        let err = reject_unknown_fields(&payload, &["path"]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownField);
        assert_eq!(err.details["fields"], json!(["aa", "zz"]));
    }

    #[test]
    fn require_str_reports_field_specific_code() {
        let payload = object(json!({}));
        let err =
            require_str(&payload, "path", ErrorCode::MissingPath, "Path is required.").unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingPath);
        assert_eq!(err.details["fields"], json!(["path"]));
    }

    #[test]
    fn require_str_rejects_wrong_type() {
        let payload = object(json!({"path": 42}));
        let err =
            require_str(&payload, "path", ErrorCode::MissingPath, "Path is required.").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidType);
        assert_eq!(err.details["type"], json!("number"));
    }

    #[test]
    fn optional_helpers_handle_null_and_defaults() {
        let payload = object(json!({"confirm": null}));
        assert_eq!(optional_bool(&payload, "confirm", false).unwrap(), false);
        assert_eq!(optional_str(&payload, "confirm").unwrap(), None);
        assert_eq!(optional_positive(&payload, "limit", 50).unwrap(), 50);
    }

    #[test]
    fn optional_positive_rejects_zero_and_negatives() {
        for value in [json!({"limit": 0}), json!({"limit": -3}), json!({"limit": "5"})] {
            let payload = object(value);
            let err = optional_positive(&payload, "limit", 50).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidType);
        }
    }

    #[test]
    fn string_list_drops_non_strings() {
        let payload = object(json!({"tags": ["a", 1, "b", null]}));
        assert_eq!(optional_string_list(&payload, "tags"), vec!["a", "b"]);
    }
}
