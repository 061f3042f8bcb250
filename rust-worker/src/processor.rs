//! Event processing - turns queued events into engagement score updates.
//!
//! Resend open/click/bounce/complaint webhooks and first-party activity
//! events update the recipient's score. Everything else is logged and
//! acknowledged.
//!
//! Vendors redeliver a webhook whenever they miss our 200, so webhooks that
//! carry an idempotency key are deduplicated on their queue message id
//! before any score is touched.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::engagement::{apply_activity, ActivityType, EngagementUpdate, SegmentIds};
use crate::payload::{ResendEvent, WebhookSource};
use crate::queue::{QueueMessage, VerifiedWebhook};
use crate::resend::{ContactsApi, ResendClient, RetryPolicy};
use crate::Config;

/// Number of recently processed webhook ids remembered for deduplication.
pub const RECENT_DELIVERIES_CAPACITY: usize = 10_000;

/// What happened to one queued event.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The contact's score (and maybe segment) was updated.
    Applied(EngagementUpdate),
    /// The event carries no engagement signal, was already processed, or
    /// scoring is disabled.
    Skipped(&'static str),
    /// The Resend calls failed; details are in the logs.
    Failed,
}

/// Bounded set of recently claimed delivery ids. The oldest id is forgotten
/// once the capacity is reached.
struct RecentDeliveries {
    capacity: usize,
    inner: Mutex<RecentInner>,
}

#[derive(Default)]
struct RecentInner {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentDeliveries {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(RecentInner::default()),
        }
    }

    /// Claim `id` for processing. Returns `false` if it was already claimed.
    fn claim(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.seen.contains(id) {
            return false;
        }

        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }

        inner.seen.insert(id.to_string());
        inner.order.push_back(id.to_string());
        true
    }

    /// Forget a claim so a later redelivery is processed again.
    fn release(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.seen.remove(id) {
            inner.order.retain(|claimed| claimed != id);
        }
    }
}

/// Shared state for processing events.
pub struct Processor {
    contacts: Option<Arc<dyn ContactsApi>>,
    segments: Option<SegmentIds>,
    policy: RetryPolicy,
    recent: RecentDeliveries,
}

impl Processor {
    pub fn new(
        contacts: Option<Arc<dyn ContactsApi>>,
        segments: Option<SegmentIds>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            contacts,
            segments,
            policy,
            recent: RecentDeliveries::new(RECENT_DELIVERIES_CAPACITY),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let contacts: Option<Arc<dyn ContactsApi>> = match &config.resend_api_key {
            Some(key) => {
                let client = ResendClient::new(
                    key.clone(),
                    &config.resend_api_url,
                    config.request_timeout(),
                )
                .context("Failed to create Resend client")?;
                Some(Arc::new(client))
            }
            None => None,
        };

        Ok(Self::new(
            contacts,
            config.segments.clone(),
            config.retry_policy(),
        ))
    }

    /// Process one queued event. Failures are logged, never returned, so the
    /// delivery is always acknowledged.
    pub async fn process(&self, message: &QueueMessage) -> ProcessOutcome {
        let (email, activity) = match engagement_signal(message) {
            Ok(signal) => signal,
            Err(reason) => {
                info!(reason = reason, "engagement_event_skipped");
                return ProcessOutcome::Skipped(reason);
            }
        };

        let Some(contacts) = &self.contacts else {
            info!(
                email = %email,
                activity = %activity,
                reason = "resend_api_key_missing",
                "engagement_event_skipped"
            );
            return ProcessOutcome::Skipped("resend_api_key_missing");
        };

        let delivery_id = dedup_id(message);
        if let Some(id) = &delivery_id {
            if !self.recent.claim(id) {
                info!(
                    message_id = %id,
                    email = %email,
                    activity = %activity,
                    reason = "duplicate_delivery",
                    "engagement_event_skipped"
                );
                return ProcessOutcome::Skipped("duplicate_delivery");
            }
        }

        match apply_activity(
            contacts.as_ref(),
            self.segments.as_ref(),
            &self.policy,
            &email,
            activity,
        )
        .await
        {
            Ok(update) => {
                info!(
                    email = %email,
                    contact_id = %update.contact_id,
                    activity = %activity,
                    new_score = update.new_score,
                    tier = ?update.segment.as_ref().map(|s| s.tier),
                    "engagement_event_processed"
                );
                ProcessOutcome::Applied(update)
            }
            Err(e) => {
                if let Some(id) = &delivery_id {
                    self.recent.release(id);
                }
                error!(
                    function = "apply_activity",
                    action = e.action(),
                    email = %email,
                    activity = %activity,
                    error = %e,
                    "engagement_sync_failed"
                );
                ProcessOutcome::Failed
            }
        }
    }
}

/// Id used to drop redelivered webhooks. Only webhooks with an idempotency
/// key have a stable one.
fn dedup_id(message: &QueueMessage) -> Option<String> {
    match message {
        QueueMessage::Webhook(webhook) if webhook.fields.idempotency_key.is_some() => {
            Some(message.message_id())
        }
        _ => None,
    }
}

/// Recipient and activity carried by a queued event, or why there is none.
fn engagement_signal(message: &QueueMessage) -> Result<(String, ActivityType), &'static str> {
    match message {
        QueueMessage::Activity(event) => Ok((event.email.clone(), event.activity)),
        QueueMessage::Webhook(webhook) => resend_signal(webhook),
    }
}

fn resend_signal(webhook: &VerifiedWebhook) -> Result<(String, ActivityType), &'static str> {
    if webhook.source != WebhookSource::Resend {
        return Err("not_a_resend_event");
    }

    let event: ResendEvent =
        serde_json::from_value(webhook.payload.clone()).map_err(|_| "resend_payload_unreadable")?;
    let activity = event.activity().ok_or("event_type_not_scored")?;
    let email = event.recipient().ok_or("recipient_missing")?;

    Ok((email.trim().to_lowercase(), activity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::testing::InMemoryContacts;
    use crate::payload::ExtractedFields;
    use crate::queue::ActivityEvent;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    fn webhook(source: WebhookSource, payload: serde_json::Value) -> QueueMessage {
        QueueMessage::Webhook(VerifiedWebhook {
            source,
            fields: ExtractedFields::default(),
            received_at: Utc::now(),
            payload,
        })
    }

    fn resend_click(svix_id: Option<&str>) -> QueueMessage {
        QueueMessage::Webhook(VerifiedWebhook {
            source: WebhookSource::Resend,
            fields: ExtractedFields {
                event_type: Some("email.clicked".to_string()),
                created_at: None,
                idempotency_key: svix_id.map(str::to_string),
            },
            received_at: Utc::now(),
            payload: json!({"type": "email.clicked", "data": {"to": ["reader@example.com"]}}),
        })
    }

    fn processor_with(api: &Arc<InMemoryContacts>) -> Processor {
        let contacts: Arc<dyn ContactsApi> = api.clone();
        Processor::new(Some(contacts), None, RetryPolicy::new(1, Duration::ZERO))
    }

    #[test]
    fn test_resend_open_is_scored() {
        let message = webhook(
            WebhookSource::Resend,
            json!({
                "type": "email.opened",
                "created_at": "2024-01-01T00:00:00.000Z",
                "data": {"to": ["Reader@Example.com"]}
            }),
        );

        let (email, activity) = engagement_signal(&message).unwrap();
        assert_eq!(email, "reader@example.com");
        assert_eq!(activity, ActivityType::EmailOpen);
    }

    #[test]
    fn test_resend_delivered_is_not_scored() {
        let message = webhook(
            WebhookSource::Resend,
            json!({"type": "email.delivered", "data": {"to": ["a@example.com"]}}),
        );

        assert_eq!(engagement_signal(&message).unwrap_err(), "event_type_not_scored");
    }

    #[test]
    fn test_resend_event_without_recipient() {
        let message = webhook(
            WebhookSource::Resend,
            json!({"type": "email.clicked", "data": {}}),
        );

        assert_eq!(engagement_signal(&message).unwrap_err(), "recipient_missing");
    }

    #[test]
    fn test_other_sources_are_not_scored() {
        let message = webhook(WebhookSource::Vercel, json!({"type": "deployment.created"}));

        assert_eq!(engagement_signal(&message).unwrap_err(), "not_a_resend_event");
    }

    #[test]
    fn test_activity_event_is_scored() {
        let message = QueueMessage::Activity(ActivityEvent {
            email: "reader@example.com".to_string(),
            activity: ActivityType::ContentCopy,
            occurred_at: Utc::now(),
        });

        let (email, activity) = engagement_signal(&message).unwrap();
        assert_eq!(email, "reader@example.com");
        assert_eq!(activity, ActivityType::ContentCopy);
    }

    #[tokio::test]
    async fn test_missing_api_key_skips() {
        let message = QueueMessage::Activity(ActivityEvent {
            email: "reader@example.com".to_string(),
            activity: ActivityType::PageVisit,
            occurred_at: Utc::now(),
        });

        let processor = Processor::new(None, None, RetryPolicy::default());
        let outcome = processor.process(&message).await;
        assert!(matches!(outcome, ProcessOutcome::Skipped("resend_api_key_missing")));
    }

    #[tokio::test]
    async fn test_redelivered_webhook_scores_once() {
        let api = Arc::new(
            InMemoryContacts::new().with_contact("reader@example.com", "c_1", Some(55)),
        );
        let processor = processor_with(&api);
        let message = resend_click(Some("msg_1"));

        let first = processor.process(&message).await;
        let second = processor.process(&message).await;

        assert!(matches!(first, ProcessOutcome::Applied(ref u) if u.new_score == 65));
        assert!(matches!(second, ProcessOutcome::Skipped("duplicate_delivery")));
        assert_eq!(api.score_of("reader@example.com"), Some(65));
    }

    #[tokio::test]
    async fn test_failed_webhook_can_be_retried() {
        let api = Arc::new(
            InMemoryContacts::new()
                .with_contact("reader@example.com", "c_1", Some(55))
                .fail_next_calls(1, 400),
        );
        let processor = processor_with(&api);
        let message = resend_click(Some("msg_1"));

        assert!(matches!(processor.process(&message).await, ProcessOutcome::Failed));
        assert!(matches!(
            processor.process(&message).await,
            ProcessOutcome::Applied(ref u) if u.new_score == 65
        ));
    }

    #[tokio::test]
    async fn test_events_without_key_are_not_deduplicated() {
        let api = Arc::new(
            InMemoryContacts::new().with_contact("reader@example.com", "c_1", Some(55)),
        );
        let processor = processor_with(&api);
        let message = resend_click(None);

        processor.process(&message).await;
        processor.process(&message).await;

        assert_eq!(api.score_of("reader@example.com"), Some(75));
    }

    #[test]
    fn test_recent_deliveries_forget_oldest() {
        let recent = RecentDeliveries::new(2);

        assert!(recent.claim("a"));
        assert!(recent.claim("b"));
        assert!(!recent.claim("a"));

        assert!(recent.claim("c"));
        assert!(recent.claim("a"));
        assert!(!recent.claim("c"));
    }

    #[test]
    fn test_released_delivery_can_be_claimed_again() {
        let recent = RecentDeliveries::new(4);

        assert!(recent.claim("a"));
        recent.release("a");
        assert!(recent.claim("a"));
    }
}
