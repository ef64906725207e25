use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-line-signature";

/// Base64-encoded HMAC-SHA256 of the raw webhook body, keyed by the channel
/// secret. Computed over the exact bytes received, before any JSON parsing.
pub fn webhook_signature(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes())
        .expect("HMAC accepts channel secret key of any size");
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

pub fn verify_webhook_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    constant_time_eq(&webhook_signature(channel_secret, body), signature)
}

fn constant_time_eq(left: &str, right: &str) -> bool {
    if left.len() != right.len() {
        return false;
    }

    let mut diff = 0_u8;
    for (lhs, rhs) in left.as_bytes().iter().zip(right.as_bytes().iter()) {
        diff |= lhs ^ rhs;
    }

    diff == 0
}
