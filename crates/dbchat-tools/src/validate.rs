//! Lightweight JSON-schema argument validation: required properties
//! and primitive type checks, which is all tool schemas here use.

use dbchat_protocol::ToolError;
use serde_json::Value;

/// Validate `args` against an object schema. Schemas without a
/// top-level `object` type are accepted as-is.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Ok(());
    }
    let Some(args_map) = args.as_object() else {
        return Err(ToolError::InvalidArguments(
            "arguments must be an object".to_string(),
        ));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !args_map.contains_key(name) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required property: {name}"
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            let Some(value) = args_map.get(name) else {
                continue;
            };
            let Some(expected) = property.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(ToolError::InvalidArguments(format!(
                    "property {name} must be of type {expected}"
                )));
            }
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"},
            },
            "required": ["query"],
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        let args = json!({"query": "select 1", "limit": 10});
        assert!(validate_args(&query_schema(), &args).is_ok());
    }

    #[test]
    fn rejects_missing_required_property() {
        let err = validate_args(&query_schema(), &json!({"limit": 10})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(message) if message.contains("query")));
    }

    #[test]
    fn rejects_wrong_primitive_type() {
        let err = validate_args(&query_schema(), &json!({"query": 42})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn rejects_non_object_arguments() {
        let err = validate_args(&query_schema(), &json!("select 1")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn optional_properties_may_be_absent() {
        assert!(validate_args(&query_schema(), &json!({"query": "select 1"})).is_ok());
    }
}
