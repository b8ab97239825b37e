//! Environment variable loading with type conversion and validation.
//!
//! Every loader reports failures as `Configuration` errors carrying the
//! variable name, so startup logs point straight at the offending key.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// Load a required variable, parsed into `T`.
pub fn required<T>(key: &str) -> GatewayResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = env::var(key)
        .map_err(|_| GatewayError::configuration(format!("required variable {} is not set", key)))?;
    parse(key, &value)
}

/// Load an optional variable, falling back to `default`.
pub fn or_default<T>(key: &str, default: T) -> GatewayResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => parse(key, &value),
        Err(_) => Ok(default),
    }
}

/// Load an optional variable.
pub fn optional<T>(key: &str) -> GatewayResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => parse(key, &value).map(Some),
        Err(_) => Ok(None),
    }
}

/// Load a boolean accepting the usual string variations.
pub fn bool_or(key: &str, default: bool) -> bool {
    match env::var(key).as_deref() {
        Ok("true" | "True" | "TRUE" | "1" | "yes" | "Yes" | "YES" | "on" | "On" | "ON") => true,
        Ok("false" | "False" | "FALSE" | "0" | "no" | "No" | "NO" | "off" | "Off" | "OFF") => false,
        _ => default,
    }
}

/// Load a comma-separated list; unset or blank yields an empty list.
pub fn list(key: &str) -> GatewayResult<Vec<String>> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// Load a comma-separated `key=value` map, e.g. `ADDR_X=stream-x,ADDR_Y=stream-y`.
pub fn pair_map(key: &str) -> GatewayResult<HashMap<String, String>> {
    let mut map = HashMap::new();
    for entry in list(key)? {
        let (k, v) = entry.split_once('=').ok_or_else(|| {
            GatewayError::configuration(format!(
                "{}: entry '{}' is not of the form key=value",
                key, entry
            ))
        })?;
        map.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(map)
}

/// Load a duration expressed in milliseconds.
pub fn duration_ms_or(key: &str, default_ms: u64) -> GatewayResult<Duration> {
    Ok(Duration::from_millis(or_default(key, default_ms)?))
}

fn parse<T>(key: &str, value: &str) -> GatewayResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| GatewayError::configuration(format!("{}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_map_parses_and_trims() {
        env::set_var("TEST_PAIR_MAP", "ADDR_X = stream-x , ADDR_Y=stream-y");
        let map = pair_map("TEST_PAIR_MAP").unwrap();
        assert_eq!(map.get("ADDR_X").unwrap(), "stream-x");
        assert_eq!(map.get("ADDR_Y").unwrap(), "stream-y");
        env::remove_var("TEST_PAIR_MAP");
    }

    #[test]
    fn pair_map_rejects_bare_entries() {
        env::set_var("TEST_PAIR_BAD", "no-equals-sign");
        assert!(pair_map("TEST_PAIR_BAD").is_err());
        env::remove_var("TEST_PAIR_BAD");
    }

    #[test]
    fn missing_required_names_the_key() {
        let err = required::<String>("TEST_DEFINITELY_UNSET").unwrap_err();
        assert!(err.to_string().contains("TEST_DEFINITELY_UNSET"));
    }
}
