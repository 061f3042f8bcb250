//! Vendor payload types.
//!
//! Each recognized sender gets its own payload struct, validated with serde
//! when the request arrives. Unknown senders keep the raw JSON value.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::engagement::ActivityType;

/// Which vendor sent a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookSource {
    Resend,
    Vercel,
    Polar,
    Custom,
}

impl WebhookSource {
    /// Human-readable vendor name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            WebhookSource::Resend => "Resend",
            WebhookSource::Vercel => "Vercel",
            WebhookSource::Polar => "Polar",
            WebhookSource::Custom => "Custom",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookSource::Resend => "resend",
            WebhookSource::Vercel => "vercel",
            WebhookSource::Polar => "polar",
            WebhookSource::Custom => "custom",
        }
    }
}

impl fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized fields used downstream for deduplication and routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub created_at: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Resend email event (`email.sent`, `email.opened`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ResendEvent {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl ResendEvent {
    /// First recipient address of the email the event refers to.
    pub fn recipient(&self) -> Option<&str> {
        match self.data.get("to")? {
            Value::String(to) => Some(to.as_str()),
            Value::Array(list) => list.first()?.as_str(),
            _ => None,
        }
    }

    /// Engagement activity implied by this event, if any.
    pub fn activity(&self) -> Option<ActivityType> {
        self.event_type.as_deref().and_then(resend_activity)
    }
}

/// Map a Resend event type to the engagement activity it represents.
pub fn resend_activity(event_type: &str) -> Option<ActivityType> {
    match event_type {
        "email.opened" => Some(ActivityType::EmailOpen),
        "email.clicked" => Some(ActivityType::EmailClick),
        "email.bounced" => Some(ActivityType::EmailBounce),
        "email.complained" => Some(ActivityType::EmailComplaint),
        _ => None,
    }
}

/// Vercel integration event. `createdAt` is epoch milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct VercelEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<i64>,
}

/// Polar event (Standard Webhooks envelope).
#[derive(Debug, Clone, Deserialize)]
pub struct PolarEvent {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// A webhook body parsed according to its sender.
#[derive(Debug, Clone)]
pub enum ParsedPayload {
    Resend(ResendEvent),
    Vercel(VercelEvent),
    Polar(PolarEvent),
    Custom(Value),
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid {source_name} webhook payload: {error}")]
    InvalidJson {
        source_name: &'static str,
        #[source]
        error: serde_json::Error,
    },
}

impl ParsedPayload {
    /// Parse a raw body into the payload type of `source`.
    pub fn parse(source: WebhookSource, body: &str) -> Result<Self, PayloadError> {
        let invalid = |error| PayloadError::InvalidJson {
            source_name: source.as_str(),
            error,
        };

        let payload = match source {
            WebhookSource::Resend => {
                ParsedPayload::Resend(serde_json::from_str(body).map_err(invalid)?)
            }
            WebhookSource::Vercel => {
                ParsedPayload::Vercel(serde_json::from_str(body).map_err(invalid)?)
            }
            WebhookSource::Polar => {
                ParsedPayload::Polar(serde_json::from_str(body).map_err(invalid)?)
            }
            WebhookSource::Custom => {
                ParsedPayload::Custom(serde_json::from_str(body).map_err(invalid)?)
            }
        };

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serialization() {
        assert_eq!(serde_json::to_string(&WebhookSource::Resend).unwrap(), "\"resend\"");
        let parsed: WebhookSource = serde_json::from_str("\"polar\"").unwrap();
        assert_eq!(parsed, WebhookSource::Polar);
        assert_eq!(WebhookSource::Vercel.to_string(), "vercel");
    }

    #[test]
    fn test_parse_resend_event() {
        let body = r#"{
            "type": "email.clicked",
            "created_at": "2024-02-22T23:41:12.126Z",
            "data": {"email_id": "abc", "to": ["reader@example.com"]}
        }"#;

        let payload = ParsedPayload::parse(WebhookSource::Resend, body).unwrap();
        let ParsedPayload::Resend(event) = payload else {
            panic!("Expected Resend payload");
        };

        assert_eq!(event.recipient(), Some("reader@example.com"));
        assert_eq!(event.activity(), Some(ActivityType::EmailClick));
    }

    #[test]
    fn test_resend_recipient_as_string() {
        let event: ResendEvent =
            serde_json::from_str(r#"{"type":"email.sent","data":{"to":"a@example.com"}}"#).unwrap();

        assert_eq!(event.recipient(), Some("a@example.com"));
        assert_eq!(event.activity(), None);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let result = ParsedPayload::parse(WebhookSource::Vercel, r#"{"createdAt":"yesterday"}"#);
        assert!(result.is_err());

        let result = ParsedPayload::parse(WebhookSource::Custom, "not json");
        let message = result.unwrap_err().to_string();
        assert!(message.starts_with("invalid custom webhook payload"));
    }

    #[test]
    fn test_resend_activity_mapping() {
        assert_eq!(resend_activity("email.opened"), Some(ActivityType::EmailOpen));
        assert_eq!(resend_activity("email.bounced"), Some(ActivityType::EmailBounce));
        assert_eq!(resend_activity("email.complained"), Some(ActivityType::EmailComplaint));
        assert_eq!(resend_activity("email.delivered"), None);
    }
}
