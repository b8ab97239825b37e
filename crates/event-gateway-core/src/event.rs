// File: src/event.rs
//
// The in-flight representation of a broker message inside the gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw event as it travels through the gateway pipeline: identity,
/// type (the broker address it arrived on), arrival time, and the
/// unparsed text payload.
///
/// This is the value handed to [`crate::handler::EventHandler`]s and
/// persisted by the raw event store. The payload stays opaque here;
/// typed extraction happens in the handlers and downstream processors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub message_id: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub payload: String,
}

impl GatewayEvent {
    pub fn new(
        message_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            event_type: event_type.into(),
            event_time: Utc::now(),
            payload: payload.into(),
        }
    }

    /// Lowercase hex MD5 of the payload bytes, 32 chars. Stored alongside
    /// the raw row so integrity checks never need to parse the blob.
    pub fn payload_checksum(&self) -> String {
        format!("{:x}", md5::compute(self.payload.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_lowercase_hex_md5() {
        let event = GatewayEvent::new("m1", "ADDR_X", r#"{"a":1}"#);
        let checksum = event.payload_checksum();
        assert_eq!(checksum.len(), 32);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Stable for equal payloads
        let again = GatewayEvent::new("m2", "ADDR_Y", r#"{"a":1}"#);
        assert_eq!(checksum, again.payload_checksum());
    }
}
