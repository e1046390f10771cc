//! Argument extraction helpers for tool inputs.

use crate::ToolError;
use serde_json::Value;

pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidInput(format!("missing '{key}' argument")))
}

pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Numbers may arrive as JSON numbers or as numeric strings.
pub fn required_f64(args: &Value, key: &str) -> Result<f64, ToolError> {
    optional_f64(args, key)?
        .ok_or_else(|| ToolError::InvalidInput(format!("missing '{key}' argument")))
}

pub fn optional_f64(args: &Value, key: &str) -> Result<Option<f64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ToolError::InvalidInput(format!("'{key}' must be a number, got '{s}'"))),
        Some(other) => Err(ToolError::InvalidInput(format!(
            "'{key}' must be a number, got {other}"
        ))),
    }
}

pub fn optional_u64(args: &Value, key: &str) -> Result<Option<u64>, ToolError> {
    match optional_f64(args, key)? {
        None => Ok(None),
        Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(Some(v as u64)),
        Some(v) => Err(ToolError::InvalidInput(format!(
            "'{key}' must be a non-negative integer, got {v}"
        ))),
    }
}

pub fn optional_bool(args: &Value, key: &str) -> Option<bool> {
    match args.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_accept_strings() {
        let args = json!({"a": 1.5, "b": "2.25", "c": "x"});
        assert_eq!(required_f64(&args, "a").unwrap(), 1.5);
        assert_eq!(required_f64(&args, "b").unwrap(), 2.25);
        assert!(matches!(required_f64(&args, "c"), Err(ToolError::InvalidInput(_))));
        assert!(matches!(required_f64(&args, "d"), Err(ToolError::InvalidInput(_))));
    }

    #[test]
    fn integers_reject_fractions() {
        let args = json!({"n": 12, "m": 1.5, "k": -1});
        assert_eq!(optional_u64(&args, "n").unwrap(), Some(12));
        assert!(optional_u64(&args, "m").is_err());
        assert!(optional_u64(&args, "k").is_err());
        assert_eq!(optional_u64(&args, "missing").unwrap(), None);
    }

    #[test]
    fn bools_accept_words() {
        let args = json!({"a": true, "b": "no"});
        assert_eq!(optional_bool(&args, "a"), Some(true));
        assert_eq!(optional_bool(&args, "b"), Some(false));
        assert_eq!(optional_bool(&args, "c"), None);
    }
}
