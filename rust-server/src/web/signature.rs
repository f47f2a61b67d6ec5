//! Webhook signature verification.
//!
//! Callers sign the raw request body with HMAC-SHA256 using a shared secret
//! and send the hex digest out-of-band (the `X-Signature` header).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a webhook body signature.
///
/// Computes HMAC-SHA256 over `body` with `secret` and compares the
/// hex-encoded digest against `signature` in constant time. The comparison
/// is case-sensitive; a malformed or truncated supplied value is simply a
/// mismatch, never an error.
///
/// Pass/fail is the only effect. Logging and counters belong to the caller.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);

    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_compare(&expected, signature)
}

/// Constant-time string comparison to prevent timing attacks.
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
