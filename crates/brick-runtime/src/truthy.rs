//! Truthiness of `if` conditions

use serde_json::Value;

const TRUE_STRINGS: &[&str] = &["true", "t", "yes", "y", "on", "1"];

/// Strings are matched case-insensitively against `true/t/yes/y/on/1`, so
/// `"false"` and `"0"` are falsy. Objects and arrays are falsy.
pub fn boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => TRUE_STRINGS.contains(&s.trim().to_lowercase().as_str()),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings() {
        for truthy in ["true", "TRUE", " yes ", "y", "on", "1", "t"] {
            assert!(boolean(&json!(truthy)), "{truthy}");
        }
        for falsy in ["false", "0", "", "no", "off", "maybe"] {
            assert!(!boolean(&json!(falsy)), "{falsy}");
        }
    }

    #[test]
    fn test_other_values() {
        assert!(boolean(&json!(true)));
        assert!(!boolean(&json!(false)));
        assert!(boolean(&json!(2)));
        assert!(boolean(&json!(-0.5)));
        assert!(!boolean(&json!(0)));
        assert!(!boolean(&Value::Null));
        assert!(!boolean(&json!({ "a": 1 })));
        assert!(!boolean(&json!([1])));
    }
}
