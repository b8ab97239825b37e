// File: src/parsing.rs
//
// Permissive but explicit extraction of typed values from payload JSON

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use event_gateway_core::error::{GatewayError, GatewayResult};

/// Required string field; present and non-null or a parse error.
pub fn require_str(payload: &Value, field: &str) -> GatewayResult<String> {
    optional_str(payload, field)
        .ok_or_else(|| GatewayError::parse(format!("missing required field '{}'", field)))
}

pub fn optional_str(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// ISO-8601 instant from a string field.
pub fn optional_instant(payload: &Value, field: &str) -> GatewayResult<Option<DateTime<Utc>>> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| GatewayError::parse(format!("field '{}' is not an ISO-8601 instant: {}", field, e))),
        Some(other) => Err(GatewayError::parse(format!(
            "field '{}' is not a timestamp string: {}",
            field, other
        ))),
    }
}

/// Decimal parsed from the string representation of a number-or-string
/// field, so floating-point noise never reaches the column.
pub fn optional_decimal(payload: &Value, field: &str) -> GatewayResult<Option<Decimal>> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .to_string()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|e| GatewayError::parse(format!("field '{}' is not a decimal: {}", field, e))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|e| GatewayError::parse(format!("field '{}' is not a decimal: {}", field, e))),
        Some(other) => Err(GatewayError::parse(format!(
            "field '{}' is not numeric: {}",
            field, other
        ))),
    }
}

/// Integer from a number or a numeric string.
pub fn optional_i32(payload: &Value, field: &str) -> GatewayResult<Option<i32>> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| GatewayError::parse(format!("field '{}' is out of integer range", field))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i32>()
            .map(Some)
            .map_err(|e| GatewayError::parse(format!("field '{}' is not an integer: {}", field, e))),
        Some(other) => Err(GatewayError::parse(format!(
            "field '{}' is not an integer: {}",
            field, other
        ))),
    }
}

/// Boolean from a boolean or a case-insensitive string.
pub fn optional_bool(payload: &Value, field: &str) -> GatewayResult<Option<bool>> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(other) => Err(GatewayError::parse(format!(
            "field '{}' is not a boolean: {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_accept_numbers() {
        let payload = json!({"unit_number": 42, "name": "abc", "empty": ""});
        assert_eq!(optional_str(&payload, "unit_number").unwrap(), "42");
        assert_eq!(optional_str(&payload, "name").unwrap(), "abc");
        assert!(optional_str(&payload, "empty").is_none());
        assert!(optional_str(&payload, "missing").is_none());
        assert!(require_str(&payload, "missing").is_err());
    }

    #[test]
    fn instants_are_iso8601() {
        let payload = json!({"at": "2026-07-30T12:00:01.123Z", "bad": "yesterday"});
        let parsed = optional_instant(&payload, "at").unwrap().unwrap();
        assert_eq!(parsed.timestamp_millis(), 1785412801123);
        assert!(optional_instant(&payload, "bad").is_err());
        assert!(optional_instant(&payload, "missing").unwrap().is_none());
    }

    #[test]
    fn decimals_parse_from_number_and_string() {
        let payload = json!({"n": 12.375, "s": "  -0.5 ", "blank": "", "bad": "x"});
        assert_eq!(optional_decimal(&payload, "n").unwrap().unwrap().to_string(), "12.375");
        assert_eq!(optional_decimal(&payload, "s").unwrap().unwrap().to_string(), "-0.5");
        assert!(optional_decimal(&payload, "blank").unwrap().is_none());
        assert!(optional_decimal(&payload, "bad").is_err());
    }

    #[test]
    fn integers_parse_from_number_and_string() {
        let payload = json!({"n": 88, "s": "90", "frac": 1.5});
        assert_eq!(optional_i32(&payload, "n").unwrap(), Some(88));
        assert_eq!(optional_i32(&payload, "s").unwrap(), Some(90));
        assert!(optional_i32(&payload, "frac").is_err());
    }

    #[test]
    fn booleans_accept_case_insensitive_strings() {
        let payload = json!({"b": true, "s1": "TRUE", "s2": "False", "bad": "ja"});
        assert_eq!(optional_bool(&payload, "b").unwrap(), Some(true));
        assert_eq!(optional_bool(&payload, "s1").unwrap(), Some(true));
        assert_eq!(optional_bool(&payload, "s2").unwrap(), Some(false));
        assert!(optional_bool(&payload, "bad").is_err());
    }
}
