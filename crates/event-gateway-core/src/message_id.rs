// File: src/message_id.rs
//
// Deterministic message identity: broker fallback ids and replay ids

use sha2::{Digest, Sha256};

/// Prefix of ids synthesized when the broker supplies no message id.
pub const SYNTHESIZED_PREFIX: &str = "SHA256:";

/// Prefix of fresh ids minted for forced re-ingestion.
pub const RESEND_PREFIX: &str = "RESEND:";

/// Synthesize a message id from the address and payload bytes.
///
/// `"SHA256:" + lowercase_hex(sha256(utf8(address) || utf8(payload)))`.
/// Deterministic so that broker redelivery of the same text on the same
/// address collides on the same id and dedups in the raw store.
pub fn synthesize(address: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update(payload.as_bytes());
    format!("{}{:x}", SYNTHESIZED_PREFIX, hasher.finalize())
}

/// Mint a fresh id for a replayed event so downstream dedup treats the
/// entry as new: deterministic prefix, then timestamp and nonce.
pub fn resend_id(now_millis: i64) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}:{}", RESEND_PREFIX, now_millis, &nonce[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_id_is_stable_across_runs() {
        let a = synthesize("ADDR_X", r#"{"a":1}"#);
        let b = synthesize("ADDR_X", r#"{"a":1}"#);
        assert_eq!(a, b);
        assert!(a.starts_with(SYNTHESIZED_PREFIX));
        assert_eq!(a.len(), SYNTHESIZED_PREFIX.len() + 64);
    }

    #[test]
    fn synthesized_id_depends_on_address_and_payload() {
        let base = synthesize("ADDR_X", "p");
        assert_ne!(base, synthesize("ADDR_Y", "p"));
        assert_ne!(base, synthesize("ADDR_X", "q"));
    }

    #[test]
    fn resend_ids_are_unique_and_prefixed() {
        let a = resend_id(1_700_000_000_000);
        let b = resend_id(1_700_000_000_000);
        assert!(a.starts_with("RESEND:1700000000000:"));
        assert_ne!(a, b);
    }
}
