use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Requests older (or newer) than this are rejected as replays.
pub const MAX_REQUEST_AGE_SECS: i64 = 5 * 60;

/// Verify a Slack request signature.
///
/// Slack sends `X-Slack-Request-Timestamp` and `X-Slack-Signature: v0=<hex>`, where the
/// hex digest is HMAC-SHA256 over `v0:{timestamp}:{body}` keyed by the signing secret.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature_header: &str,
    now: i64,
) -> Result<()> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| AppError::ChatVerification(format!("Invalid timestamp: {timestamp}")))?;

    if (now - ts).abs() > MAX_REQUEST_AGE_SECS {
        return Err(AppError::ChatVerification(
            "Request timestamp outside replay window".to_string(),
        ));
    }

    let signature_hex = signature_header
        .strip_prefix("v0=")
        .ok_or_else(|| AppError::ChatVerification("Missing v0= prefix".to_string()))?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| AppError::ChatVerification(format!("Invalid hex in signature: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::ChatVerification(format!("Invalid HMAC key: {e}")))?;

    mac.update(b"v0:");
    mac.update(timestamp.trim().as_bytes());
    mac.update(b":");
    mac.update(body);

    mac.verify_slice(&signature_bytes)
        .map_err(|_| AppError::ChatVerification("Signature mismatch".to_string()))
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}
