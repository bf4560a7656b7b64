//! Webhook signature verification: HMAC-SHA256 over the raw request body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// True when `provided_hex` is the hex HMAC-SHA256 digest of `raw_body` under
/// `secret`. The comparison is constant-time (`Mac::verify_slice`).
pub fn verify(raw_body: &[u8], provided_hex: &str, secret: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };
    // HMAC accepts keys of any length, so this cannot fail in practice.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&provided).is_ok()
}

/// Hex HMAC-SHA256 digest of `body` under `secret` — what the platform puts
/// in the `X-Max-Signature` header.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
