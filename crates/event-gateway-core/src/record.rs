// File: src/record.rs
//
// Stream-record wire shape and the quote-wrapping codec used on the bus

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Field names of a stream record on the bus.
pub const FIELD_MESSAGE_ID: &str = "message_id";
pub const FIELD_EVENT_TYPE: &str = "event_type";
pub const FIELD_PAYLOAD: &str = "payload";
pub const FIELD_METADATA: &str = "metadata";

/// The four-field record written to and read from a named stream.
///
/// All fields are string-typed on the wire and quote-wrapped by
/// [`wire_encode`]; [`wire_decode`] reverses exactly one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub message_id: String,
    pub event_type: String,
    pub payload: String,
    pub metadata: String,
}

impl StreamRecord {
    pub fn new(
        message_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            event_type: event_type.into(),
            payload: payload.into(),
            metadata: metadata.into(),
        }
    }

    /// Encode all four fields for an XADD, in wire order.
    pub fn to_wire_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (FIELD_MESSAGE_ID, wire_encode(&self.message_id)),
            (FIELD_EVENT_TYPE, wire_encode(&self.event_type)),
            (FIELD_PAYLOAD, wire_encode(&self.payload)),
            (FIELD_METADATA, wire_encode(&self.metadata)),
        ]
    }

    /// Rebuild a record from the raw field map of a stream entry,
    /// stripping the wire-level quote wrapping. Missing fields decode
    /// to empty strings; the processor template decides what is fatal.
    pub fn from_wire_fields(fields: &HashMap<String, String>) -> Self {
        let get = |name: &str| {
            fields
                .get(name)
                .map(|raw| wire_decode(raw))
                .unwrap_or_default()
        };
        Self {
            message_id: get(FIELD_MESSAGE_ID),
            event_type: get(FIELD_EVENT_TYPE),
            payload: get(FIELD_PAYLOAD),
            metadata: get(FIELD_METADATA),
        }
    }

    /// True when the metadata marks this record as a resend: the JSON
    /// boolean `true` or the case-insensitive string `"true"`.
    pub fn is_resend(&self) -> GatewayResult<bool> {
        if self.metadata.trim().is_empty() {
            return Ok(false);
        }
        let value: serde_json::Value = serde_json::from_str(&self.metadata)
            .map_err(|e| GatewayError::parse(format!("metadata is not valid JSON: {}", e)))?;
        Ok(match value.get("resend") {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })
    }
}

/// Wrap a string value for the wire.
///
/// Values that are themselves JSON objects or arrays are wrapped in
/// quotes verbatim; anything else has the standard escapes applied
/// first. The asymmetry mirrors the decode rule so that either kind of
/// payload round-trips byte-identically.
pub fn wire_encode(value: &str) -> String {
    if looks_like_json_container(value) {
        format!("\"{}\"", value)
    } else {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for c in value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                other => out.push(other),
            }
        }
        out.push('"');
        out
    }
}

/// Strip one layer of wrapping quotes and undo the standard escapes,
/// unless the unwrapped value is itself a JSON object or array.
pub fn wire_decode(raw: &str) -> String {
    let inner = match raw.as_bytes() {
        [b'"', .., b'"'] if raw.len() >= 2 => &raw[1..raw.len() - 1],
        _ => raw,
    };
    if looks_like_json_container(inner) {
        return inner.to_string();
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => {
                // Unknown escape: keep it verbatim
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn looks_like_json_container(value: &str) -> bool {
    matches!(value.trim_start().as_bytes().first(), Some(b'{') | Some(b'['))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &str) {
        assert_eq!(wire_decode(&wire_encode(value)), value, "round-trip failed for {:?}", value);
    }

    #[test]
    fn plain_strings_roundtrip() {
        roundtrip("hello");
        roundtrip("");
        roundtrip("with \"quotes\" and \\backslash\\");
        roundtrip("line\nbreaks\tand\rreturns");
    }

    #[test]
    fn json_payloads_roundtrip() {
        roundtrip(r#"{"a":1}"#);
        roundtrip(r#"{"unit_number":"U","nested":{"x":"\"y\""}}"#);
        roundtrip(r#"[1,2,3]"#);
    }

    #[test]
    fn record_roundtrips_through_field_map() {
        let record = StreamRecord::new("k1", "T", r#"{"unit_number":"U"}"#, "{}");
        let fields: HashMap<String, String> = record
            .to_wire_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(StreamRecord::from_wire_fields(&fields), record);
    }

    #[test]
    fn plain_string_payload_roundtrips_through_field_map() {
        let record = StreamRecord::new("k2", "T", "not json at all\nsecond line", "{}");
        let fields: HashMap<String, String> = record
            .to_wire_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(StreamRecord::from_wire_fields(&fields), record);
    }

    #[test]
    fn resend_flag_variants() {
        let mk = |meta: &str| StreamRecord::new("id", "T", "{}", meta);
        assert!(mk(r#"{"resend":true}"#).is_resend().unwrap());
        assert!(mk(r#"{"resend":"true"}"#).is_resend().unwrap());
        assert!(mk(r#"{"resend":"TRUE"}"#).is_resend().unwrap());
        assert!(!mk(r#"{"resend":false}"#).is_resend().unwrap());
        assert!(!mk(r#"{"resend":"no"}"#).is_resend().unwrap());
        assert!(!mk("{}").is_resend().unwrap());
        assert!(!mk("").is_resend().unwrap());
        assert!(mk("not json").is_resend().is_err());
    }
}
