//! Payment webhook authentication and parsing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{Result, SubscriptionError};

type HmacSha256 = Hmac<Sha256>;

/// Headers a signature may arrive in, in lookup order.
pub const SIGNATURE_HEADERS: [&str; 3] = ["verif-hash", "x-flutterwave-signature", "x-flw-signature"];

/// Check a webhook signature against the shared secret.
///
/// Accepts either the secret itself (Flutterwave's `verif-hash`) or a hex
/// HMAC-SHA256 of the raw body keyed with the secret.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }

    if constant_time_compare(signature, secret) {
        return true;
    }

    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 of `body`, as a sender would compute it.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookData {
    pub tx_ref: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| SubscriptionError::InvalidInput(format!("webhook payload: {e}")))
    }

    /// The transaction reference of a successful charge, if this is one.
    pub fn completed_tx_ref(&self) -> Option<&str> {
        if self.event == "charge.completed" && self.data.status == "successful" {
            self.data.tx_ref.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec-test-0123456789";

    #[test]
    fn test_verif_hash_match() {
        assert!(verify_signature(SECRET, b"{}", SECRET));
        assert!(!verify_signature(SECRET, b"{}", "whsec-test-012345678X"));
    }

    #[test]
    fn test_hmac_signature() {
        let body = br#"{"event":"charge.completed"}"#;
        let sig = sign(SECRET, body);
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(SECRET, body, &sig));
        assert!(!verify_signature(SECRET, b"tampered", &sig));
        assert!(!verify_signature("other-secret", body, &sig));
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(!verify_signature("", b"{}", ""));
        assert!(!verify_signature(SECRET, b"{}", ""));
        assert!(!verify_signature(SECRET, b"{}", "not-hex"));
    }

    #[test]
    fn test_parse_completed_charge() {
        let event = WebhookEvent::parse(
            br#"{"event":"charge.completed","data":{"tx_ref":"TUG-1-u1","status":"successful","amount":25000}}"#,
        )
        .unwrap();
        assert_eq!(event.completed_tx_ref(), Some("TUG-1-u1"));

        let failed = WebhookEvent::parse(
            br#"{"event":"charge.completed","data":{"tx_ref":"TUG-1-u1","status":"failed"}}"#,
        )
        .unwrap();
        assert_eq!(failed.completed_tx_ref(), None);

        assert!(WebhookEvent::parse(b"not json").is_err());
    }
}
