//! Webhook signature verification.
//!
//! Two schemes are supported:
//! - Svix-style signatures (Resend and Polar): HMAC-SHA256 over
//!   `{id}.{timestamp}.{body}`, base64 encoded, sent as space-separated
//!   `version,signature` pairs.
//! - Vercel signatures: HMAC-SHA1 over the raw body, hex encoded.
//!
//! Reference: https://docs.svix.com/receiving/verifying-payloads/how-manual

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Prefix marking a base64-encoded signing secret.
pub const SECRET_PREFIX: &str = "whsec_";

/// Resolve a signing secret to raw key bytes.
///
/// Secrets starting with `whsec_` carry base64 key material after the prefix;
/// anything else is used as UTF-8 text. Returns `None` if the base64 part
/// does not decode.
pub fn decode_signing_secret(secret: &str) -> Option<Vec<u8>> {
    match secret.strip_prefix(SECRET_PREFIX) {
        Some(encoded) => STANDARD.decode(encoded).ok(),
        None => Some(secret.as_bytes().to_vec()),
    }
}

fn svix_mac(secret: &str, id: &str, timestamp: &str, body: &str) -> Option<HmacSha256> {
    let key = decode_signing_secret(secret)?;
    let mut mac = HmacSha256::new_from_slice(&key).ok()?;
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Some(mac)
}

/// Compute the base64 Svix signature for a payload.
///
/// Returns `None` if the secret cannot be decoded.
pub fn sign_svix_payload(secret: &str, id: &str, timestamp: &str, body: &str) -> Option<String> {
    let mac = svix_mac(secret, id, timestamp, body)?;
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a Svix-style webhook signature.
///
/// # Arguments
///
/// * `body` - The raw request body, exactly as received
/// * `id` - The message id header
/// * `timestamp` - The timestamp header
/// * `signature_header` - Space-separated `v1,<base64>` pairs
/// * `secret` - The signing secret
///
/// # Returns
///
/// `true` if any of the listed signatures matches. Malformed input of any
/// kind yields `false`.
pub fn verify_svix_signature(
    body: &str,
    id: &str,
    timestamp: &str,
    signature_header: &str,
    secret: &str,
) -> bool {
    if id.is_empty() || timestamp.is_empty() || signature_header.trim().is_empty() {
        warn!(
            has_id = !id.is_empty(),
            has_timestamp = !timestamp.is_empty(),
            has_signature = !signature_header.trim().is_empty(),
            "svix_signature_missing_fields"
        );
        return false;
    }

    let mac = match svix_mac(secret, id, timestamp, body) {
        Some(m) => m,
        None => {
            warn!("svix_signature_invalid_secret");
            return false;
        }
    };

    // Several pairs are sent while a key is being rotated.
    let valid = signature_header
        .split_whitespace()
        .filter_map(|pair| pair.split_once(','))
        .filter_map(|(_version, signature)| STANDARD.decode(signature).ok())
        .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

    if !valid {
        warn!(
            message_id = %id,
            candidates = signature_header.split_whitespace().count(),
            "svix_signature_mismatch"
        );
    } else {
        debug!(message_id = %id, "svix_signature_valid");
    }

    valid
}

/// Verify a Vercel webhook signature (`x-vercel-signature`).
///
/// Vercel sends the lowercase hex HMAC-SHA1 of the raw body keyed with the
/// integration secret.
pub fn verify_vercel_signature(body: &str, signature_header: &str, secret: &str) -> bool {
    if secret.is_empty() || signature_header.is_empty() {
        warn!(
            has_secret = !secret.is_empty(),
            has_signature = !signature_header.is_empty(),
            "vercel_signature_missing_fields"
        );
        return false;
    }

    let provided = match hex::decode(signature_header.trim()) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!("vercel_signature_invalid_hex");
            return false;
        }
    };

    let mut mac = match HmacSha1::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("vercel_signature_invalid_key");
            return false;
        }
    };
    mac.update(body.as_bytes());

    let valid = mac.verify_slice(&provided).is_ok();
    if !valid {
        warn!(actual_length = provided.len(), "vercel_signature_mismatch");
    }

    valid
}

/// Check whether a secret is present and non-blank.
pub fn is_secret_configured(secret: &Option<String>) -> bool {
    secret
        .as_ref()
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false)
}
