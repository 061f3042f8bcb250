//! Webhook sender identification.
//!
//! Inspects the request headers to decide which vendor sent a webhook, then
//! verifies it with that vendor's scheme. Header sets are checked in a fixed
//! priority order: Svix headers (Resend), `x-vercel-signature` (Vercel),
//! Standard Webhooks headers (Polar).

use axum::http::HeaderMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::WebhookSecrets;
use crate::payload::WebhookSource;
use crate::web::signature::{
    is_secret_configured, verify_svix_signature, verify_vercel_signature,
};

pub const SVIX_ID_HEADER: &str = "svix-id";
pub const SVIX_TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SVIX_SIGNATURE_HEADER: &str = "svix-signature";
pub const VERCEL_SIGNATURE_HEADER: &str = "x-vercel-signature";
pub const WEBHOOK_ID_HEADER: &str = "webhook-id";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "webhook-timestamp";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "webhook-signature";

/// Why a webhook could not be verified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// The sender was recognized but its secret is not set.
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("{0} webhook signature verification failed")]
    SignatureMismatch(&'static str),

    #[error("no recognized webhook signature headers")]
    UnrecognizedSource,
}

/// Outcome of identifying and verifying one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEnvelope {
    pub source: WebhookSource,
    pub verified: bool,
    pub error: Option<VerificationError>,
}

impl WebhookEnvelope {
    fn verified(source: WebhookSource) -> Self {
        Self {
            source,
            verified: true,
            error: None,
        }
    }

    fn rejected(source: WebhookSource, error: VerificationError) -> Self {
        Self {
            source,
            verified: false,
            error: Some(error),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Identifies webhook senders and verifies their signatures.
#[derive(Debug, Clone, Default)]
pub struct WebhookIdentifier {
    secrets: WebhookSecrets,
}

impl WebhookIdentifier {
    pub fn new(secrets: WebhookSecrets) -> Self {
        Self { secrets }
    }

    /// Identify the sender of a webhook and verify its signature.
    ///
    /// `body` must be the raw request body; re-serialized JSON will not
    /// verify. This never fails: problems are reported on the envelope.
    pub fn identify_and_verify(&self, body: &str, headers: &HeaderMap) -> WebhookEnvelope {
        let envelope = if let Some((id, timestamp, signature)) = header_triple(
            headers,
            SVIX_ID_HEADER,
            SVIX_TIMESTAMP_HEADER,
            SVIX_SIGNATURE_HEADER,
        ) {
            self.verify_svix(
                WebhookSource::Resend,
                &self.secrets.resend,
                "RESEND_WEBHOOK_SECRET",
                body,
                (id, timestamp, signature),
            )
        } else if let Some(signature) = header_str(headers, VERCEL_SIGNATURE_HEADER) {
            match self.secrets.vercel.as_deref() {
                Some(secret) if is_secret_configured(&self.secrets.vercel) => {
                    if verify_vercel_signature(body, signature, secret) {
                        WebhookEnvelope::verified(WebhookSource::Vercel)
                    } else {
                        WebhookEnvelope::rejected(
                            WebhookSource::Vercel,
                            VerificationError::SignatureMismatch("Vercel"),
                        )
                    }
                }
                _ => WebhookEnvelope::rejected(
                    WebhookSource::Vercel,
                    VerificationError::NotConfigured("VERCEL_WEBHOOK_SECRET"),
                ),
            }
        } else if let Some((id, timestamp, signature)) = header_triple(
            headers,
            WEBHOOK_ID_HEADER,
            WEBHOOK_TIMESTAMP_HEADER,
            WEBHOOK_SIGNATURE_HEADER,
        ) {
            self.verify_svix(
                WebhookSource::Polar,
                &self.secrets.polar,
                "POLAR_WEBHOOK_SECRET",
                body,
                (id, timestamp, signature),
            )
        } else {
            WebhookEnvelope::rejected(WebhookSource::Custom, VerificationError::UnrecognizedSource)
        };

        match &envelope.error {
            None => info!(source = %envelope.source, "webhook_verified"),
            Some(error) => warn!(
                source = %envelope.source,
                error = %error,
                "webhook_verification_failed"
            ),
        }

        envelope
    }

    fn verify_svix(
        &self,
        source: WebhookSource,
        secret: &Option<String>,
        secret_name: &'static str,
        body: &str,
        (id, timestamp, signature): (&str, &str, &str),
    ) -> WebhookEnvelope {
        let secret = match secret.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => {
                return WebhookEnvelope::rejected(
                    source,
                    VerificationError::NotConfigured(secret_name),
                )
            }
        };

        if verify_svix_signature(body, id, timestamp, signature, secret) {
            WebhookEnvelope::verified(source)
        } else {
            WebhookEnvelope::rejected(source, VerificationError::SignatureMismatch(source.label()))
        }
    }
}

/// Read a header as a string, ignoring non-ASCII values.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_triple<'a>(
    headers: &'a HeaderMap,
    id: &str,
    timestamp: &str,
    signature: &str,
) -> Option<(&'a str, &'a str, &'a str)> {
    Some((
        header_str(headers, id)?,
        header_str(headers, timestamp)?,
        header_str(headers, signature)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::signature::sign_svix_payload;
    use axum::http::HeaderValue;
    use hmac::{Hmac, Mac};
    use sha1::Sha1;

    const RESEND_SECRET: &str = "whsec_dGVzdA==";
    const POLAR_SECRET: &str = "polar-secret";
    const VERCEL_SECRET: &str = "vercel-secret";

    fn secrets() -> WebhookSecrets {
        WebhookSecrets {
            resend: Some(RESEND_SECRET.to_string()),
            vercel: Some(VERCEL_SECRET.to_string()),
            polar: Some(POLAR_SECRET.to_string()),
        }
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn svix_headers(
        names: (&'static str, &'static str, &'static str),
        secret: &str,
        body: &str,
    ) -> HeaderMap {
        let signature = sign_svix_payload(secret, "msg_1", "1000", body).unwrap();
        let signature_header = format!("v1,{signature}");
        headers(&[
            (names.0, "msg_1"),
            (names.1, "1000"),
            (names.2, signature_header.as_str()),
        ])
    }

    #[test]
    fn test_resend_verified() {
        let body = r#"{"type":"email.opened"}"#;
        let map = svix_headers(
            (SVIX_ID_HEADER, SVIX_TIMESTAMP_HEADER, SVIX_SIGNATURE_HEADER),
            RESEND_SECRET,
            body,
        );

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify(body, &map);

        assert_eq!(envelope.source, WebhookSource::Resend);
        assert!(envelope.verified);
        assert_eq!(envelope.error, None);
    }

    #[test]
    fn test_resend_not_configured() {
        let body = "{}";
        let map = svix_headers(
            (SVIX_ID_HEADER, SVIX_TIMESTAMP_HEADER, SVIX_SIGNATURE_HEADER),
            RESEND_SECRET,
            body,
        );
        let identifier = WebhookIdentifier::new(WebhookSecrets {
            resend: None,
            ..secrets()
        });

        let envelope = identifier.identify_and_verify(body, &map);

        assert_eq!(envelope.source, WebhookSource::Resend);
        assert!(!envelope.verified);
        assert_eq!(
            envelope.error_message().as_deref(),
            Some("RESEND_WEBHOOK_SECRET not configured")
        );
    }

    #[test]
    fn test_resend_signature_mismatch() {
        let map = svix_headers(
            (SVIX_ID_HEADER, SVIX_TIMESTAMP_HEADER, SVIX_SIGNATURE_HEADER),
            "whsec_b3RoZXI=",
            "{}",
        );

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify("{}", &map);

        assert_eq!(envelope.source, WebhookSource::Resend);
        assert!(!envelope.verified);
        assert_eq!(
            envelope.error,
            Some(VerificationError::SignatureMismatch("Resend"))
        );
    }

    #[test]
    fn test_vercel_verified() {
        let body = r#"{"id":"evt_1","type":"deployment.created","createdAt":1700000000000}"#;
        let mut mac = Hmac::<Sha1>::new_from_slice(VERCEL_SECRET.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        let map = headers(&[(VERCEL_SIGNATURE_HEADER, signature.as_str())]);

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify(body, &map);

        assert_eq!(envelope.source, WebhookSource::Vercel);
        assert!(envelope.verified);
    }

    #[test]
    fn test_vercel_not_configured() {
        let map = headers(&[(VERCEL_SIGNATURE_HEADER, "abcdef")]);
        let identifier = WebhookIdentifier::new(WebhookSecrets {
            vercel: Some("  ".to_string()),
            ..secrets()
        });

        let envelope = identifier.identify_and_verify("{}", &map);

        assert_eq!(envelope.source, WebhookSource::Vercel);
        assert_eq!(
            envelope.error_message().as_deref(),
            Some("VERCEL_WEBHOOK_SECRET not configured")
        );
    }

    #[test]
    fn test_polar_verified() {
        let body = r#"{"type":"order.created"}"#;
        let map = svix_headers(
            (WEBHOOK_ID_HEADER, WEBHOOK_TIMESTAMP_HEADER, WEBHOOK_SIGNATURE_HEADER),
            POLAR_SECRET,
            body,
        );

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify(body, &map);

        assert_eq!(envelope.source, WebhookSource::Polar);
        assert!(envelope.verified);
    }

    #[test]
    fn test_polar_mismatch_message() {
        let map = svix_headers(
            (WEBHOOK_ID_HEADER, WEBHOOK_TIMESTAMP_HEADER, WEBHOOK_SIGNATURE_HEADER),
            "wrong",
            "{}",
        );

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify("{}", &map);

        assert_eq!(
            envelope.error_message().as_deref(),
            Some("Polar webhook signature verification failed")
        );
    }

    #[test]
    fn test_svix_headers_take_priority() {
        let body = "{}";
        let mut map = svix_headers(
            (SVIX_ID_HEADER, SVIX_TIMESTAMP_HEADER, SVIX_SIGNATURE_HEADER),
            RESEND_SECRET,
            body,
        );
        map.insert(VERCEL_SIGNATURE_HEADER, HeaderValue::from_static("abc"));

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify(body, &map);

        assert_eq!(envelope.source, WebhookSource::Resend);
        assert!(envelope.verified);
    }

    #[test]
    fn test_vercel_takes_priority_over_polar() {
        let body = r#"{"id":"evt_1","type":"deployment.created"}"#;
        let mut mac = Hmac::<Sha1>::new_from_slice(VERCEL_SECRET.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        let mut map = svix_headers(
            (WEBHOOK_ID_HEADER, WEBHOOK_TIMESTAMP_HEADER, WEBHOOK_SIGNATURE_HEADER),
            POLAR_SECRET,
            body,
        );
        map.insert(
            VERCEL_SIGNATURE_HEADER,
            HeaderValue::from_str(&signature).unwrap(),
        );

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify(body, &map);

        assert_eq!(envelope.source, WebhookSource::Vercel);
        assert!(envelope.verified);
    }

    #[test]
    fn test_partial_triple_is_not_recognized() {
        let map = headers(&[(SVIX_ID_HEADER, "msg_1"), (SVIX_TIMESTAMP_HEADER, "1000")]);

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify("{}", &map);

        assert_eq!(envelope.source, WebhookSource::Custom);
    }

    #[test]
    fn test_unknown_headers() {
        let map = headers(&[("content-type", "application/json"), ("x-custom", "1")]);

        let envelope = WebhookIdentifier::new(secrets()).identify_and_verify("{}", &map);

        assert_eq!(envelope.source, WebhookSource::Custom);
        assert!(!envelope.verified);
        assert_eq!(
            envelope.error_message().as_deref(),
            Some("no recognized webhook signature headers")
        );
    }
}
