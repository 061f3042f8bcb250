//! Queue message types.
//!
//! The web server publishes two kinds of messages to the `webhook_events`
//! queue: verified vendor webhooks and first-party engagement activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engagement::ActivityType;
use crate::payload::{ExtractedFields, WebhookSource};

/// Queue name for verified events waiting to be processed.
pub const EVENTS_QUEUE: &str = "webhook_events";

/// A message in the `webhook_events` queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum QueueMessage {
    /// Verified vendor webhook
    #[serde(rename = "webhook")]
    Webhook(VerifiedWebhook),
    /// Engagement activity reported by the site
    #[serde(rename = "activity")]
    Activity(ActivityEvent),
}

impl QueueMessage {
    /// AMQP message id. Webhooks reuse their idempotency key so duplicate
    /// deliveries carry the same id.
    pub fn message_id(&self) -> String {
        match self {
            QueueMessage::Webhook(w) => match &w.fields.idempotency_key {
                Some(key) => format!("{}-{}", w.source, key),
                None => format!("{}-{}", w.source, w.received_at.timestamp_millis()),
            },
            QueueMessage::Activity(a) => format!(
                "activity-{}-{}-{}",
                a.activity,
                a.email,
                a.occurred_at.timestamp_millis()
            ),
        }
    }
}

/// A webhook whose signature has been verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedWebhook {
    pub source: WebhookSource,
    #[serde(flatten)]
    pub fields: ExtractedFields,
    pub received_at: DateTime<Utc>,
    /// The vendor payload as received
    pub payload: Value,
}

/// A subscriber action reported directly by the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub email: String,
    pub activity: ActivityType,
    pub occurred_at: DateTime<Utc>,
}
