//! Boolean-ish flag normalization.
//!
//! Strategy rows carry `is_reverse` as a JSON boolean, an integer (`0`/`1`)
//! or a string (`"0"`/`"1"`, `"true"`/`"false"`). Every ingestion path
//! collapses it here so downstream code only ever sees `bool`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Interpret a loosely typed flag.
///
/// Truthy: `true`, any number equal to `1`, and the strings `"1"`, `"true"`,
/// `"yes"`, `"on"` (case-insensitive, trimmed). Everything else, including
/// `null` and unknown strings, is `false`.
pub fn parse_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v == 1.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        _ => false,
    }
}

/// Serde adapter for fields that arrive in any of the flag representations.
pub fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_truthy(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy_representations() {
        assert!(parse_truthy(&json!(true)));
        assert!(parse_truthy(&json!(1)));
        assert!(parse_truthy(&json!(1.0)));
        assert!(parse_truthy(&json!("1")));
        assert!(parse_truthy(&json!(" TRUE ")));
    }

    #[test]
    fn test_falsy_representations() {
        assert!(!parse_truthy(&json!(false)));
        assert!(!parse_truthy(&json!(0)));
        assert!(!parse_truthy(&json!(2)));
        assert!(!parse_truthy(&json!("0")));
        assert!(!parse_truthy(&json!("reverse")));
        assert!(!parse_truthy(&Value::Null));
    }

    #[derive(Deserialize)]
    struct Row {
        #[serde(deserialize_with = "deserialize_truthy")]
        is_reverse: bool,
    }

    #[test]
    fn test_deserialize_adapter() {
        let row: Row = serde_json::from_str(r#"{"is_reverse": "1"}"#).unwrap();
        assert!(row.is_reverse);
        let row: Row = serde_json::from_str(r#"{"is_reverse": 0}"#).unwrap();
        assert!(!row.is_reverse);
    }
}
