use hmac::{Hmac, Mac};
use sha2::Sha512;

use super::WebhookError;

type HmacSha512 = Hmac<Sha512>;

/// Checks a hex-encoded HMAC-SHA512 of `body` under `secret`.
///
/// The comparison is constant time. Input that is not valid hex is treated the
/// same as a wrong signature.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> Result<(), WebhookError> {
    let provided = hex::decode(signature.trim()).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::SecretNotConfigured)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Hex signature the processor would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::SecretNotConfigured)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
