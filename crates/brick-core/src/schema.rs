//! Input/output schemas declared by bricks
//!
//! Supports the JSON Schema subset brick definitions use in practice:
//! `type`, `properties`, `required`, `additionalProperties: false`,
//! `items`, `enum`, `minimum` and `maximum`. Unknown keywords are ignored.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Value);

impl Default for Schema {
    fn default() -> Self {
        Self::any()
    }
}

/// A value that does not satisfy a schema, located by dotted path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl From<SchemaViolation> for PipelineError {
    fn from(violation: SchemaViolation) -> Self {
        PipelineError::validation(violation.path, violation.message)
    }
}

impl Schema {
    /// Accepts every value
    pub fn any() -> Self {
        Self(json!({}))
    }

    pub fn new(schema: Value) -> Self {
        Self(schema)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Top-level property names, in declaration order of the backing map
    pub fn property_names(&self) -> Vec<&str> {
        self.0
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        check(&self.0, value, "")
    }
}

fn check(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaViolation> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, value) {
            return Err(violation(
                path,
                format!("expected {}, got {}", describe(expected), type_name(value)),
            ));
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            return Err(violation(
                path,
                format!("must be one of {}", Value::Array(options.clone())),
            ));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
            if number < minimum {
                return Err(violation(path, format!("must be >= {}", minimum)));
            }
        }
        if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
            if number > maximum {
                return Err(violation(path, format!("must be <= {}", maximum)));
            }
        }
    }

    match value {
        Value::Object(map) => {
            if let Some(Value::Array(required)) = schema.get("required") {
                for name in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(name) {
                        return Err(violation(&join(path, name), "is required".to_string()));
                    }
                }
            }

            let properties = schema.get("properties").and_then(Value::as_object);
            if let Some(properties) = properties {
                for (name, property) in properties {
                    if let Some(child) = map.get(name) {
                        check(property, child, &join(path, name))?;
                    }
                }
            }

            if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                for name in map.keys() {
                    if !properties.is_some_and(|p| p.contains_key(name)) {
                        return Err(violation(&join(path, name), "is not allowed".to_string()));
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    check(item_schema, item, &join(path, &index.to_string()))?;
                }
            }
        }
        _ => {}
    }

    Ok(())
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|n| n.fract() == 0.0)
        }
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn violation(path: &str, message: String) -> SchemaViolation {
    SchemaViolation {
        path: path.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_schema() -> Schema {
        Schema::new(json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" },
                "count": { "type": "integer", "minimum": 0 },
                "items": { "type": "array", "items": { "type": "object", "required": ["name"] } },
            },
            "required": ["message"],
        }))
    }

    #[test]
    fn test_valid_args() {
        let schema = message_schema();
        assert!(schema
            .validate(&json!({ "message": "hi", "count": 2, "items": [{ "name": "a" }] }))
            .is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let error = message_schema().validate(&json!({})).unwrap_err();
        assert_eq!(error.path, "message");
        assert_eq!(error.message, "is required");
    }

    #[test]
    fn test_nested_violation_path() {
        let error = message_schema()
            .validate(&json!({ "message": "hi", "items": [{ "name": "a" }, {}] }))
            .unwrap_err();
        assert_eq!(error.path, "items.1.name");
    }

    #[test]
    fn test_type_and_bounds() {
        let schema = message_schema();
        assert_eq!(
            schema.validate(&json!({ "message": 42 })).unwrap_err().path,
            "message"
        );
        assert!(schema.validate(&json!({ "message": "x", "count": -1 })).is_err());
        assert!(schema.validate(&json!({ "message": "x", "count": 1.5 })).is_err());
        assert!(schema.validate(&json!("not an object")).is_err());
    }

    #[test]
    fn test_additional_properties_and_enum() {
        let schema = Schema::new(json!({
            "type": "object",
            "properties": { "mode": { "enum": ["a", "b"] } },
            "additionalProperties": false,
        }));
        assert!(schema.validate(&json!({ "mode": "a" })).is_ok());
        assert!(schema.validate(&json!({ "mode": "c" })).is_err());
        assert_eq!(
            schema.validate(&json!({ "other": 1 })).unwrap_err().path,
            "other"
        );
    }

    #[test]
    fn test_any_schema_accepts_everything() {
        assert!(Schema::any().validate(&json!(null)).is_ok());
        assert!(Schema::default().validate(&json!([1, "a"])).is_ok());
    }
}
