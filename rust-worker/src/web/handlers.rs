//! Webhook and activity endpoint handlers.
//!
//! These handlers stay fast - they only:
//! 1. Identify and verify the sender
//! 2. Extract the normalized fields
//! 3. Enqueue the event to RabbitMQ
//!
//! Engagement scoring happens in the background worker.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::engagement::ActivityType;
use crate::payload::{extract_fields, ParsedPayload, WebhookSource};
use crate::queue::{ActivityEvent, Publisher, QueueMessage, VerifiedWebhook};
use crate::web::identify::{header_str, VerificationError, WebhookIdentifier};
use crate::web::response::{error_response, preflight_response, success_response};
use crate::Config;

/// Header carrying the shared token for first-party activity events.
pub const ACTIVITY_TOKEN_HEADER: &str = "x-activity-token";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identifier: Arc<WebhookIdentifier>,
    pub publisher: Publisher,
}

impl AppState {
    pub fn new(config: Config, publisher: Publisher) -> Self {
        let identifier = WebhookIdentifier::new(config.webhook_secrets.clone());
        Self {
            config: Arc::new(config),
            identifier: Arc::new(identifier),
            publisher,
        }
    }
}

// =============================================================================
// Health Check / Preflight
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Response {
    success_response(&HealthResponse { status: "ok" })
}

pub async fn preflight() -> Response {
    preflight_response()
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not found")
}

// =============================================================================
// Inbound Webhooks
// =============================================================================

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub source: WebhookSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub message_id: String,
}

/// Webhook endpoint shared by every vendor.
///
/// The sender is identified from the headers; the raw body is verified
/// before it is parsed.
pub async fn inbound_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match std::str::from_utf8(&body) {
        Ok(b) => b,
        Err(_) => {
            warn!(body_length = body.len(), "webhook_body_not_utf8");
            return error_response(StatusCode::BAD_REQUEST, "request body is not valid UTF-8");
        }
    };

    info!(body_length = body.len(), "webhook_received");

    let envelope = state.identifier.identify_and_verify(body, &headers);
    if let Some(err) = &envelope.error {
        let status = match err {
            VerificationError::UnrecognizedSource => StatusCode::BAD_REQUEST,
            VerificationError::NotConfigured(_) | VerificationError::SignatureMismatch(_) => {
                StatusCode::UNAUTHORIZED
            }
        };
        return error_response(status, &err.to_string());
    }

    let payload = match ParsedPayload::parse(envelope.source, body) {
        Ok(p) => p,
        Err(e) => {
            warn!(source = %envelope.source, error = %e, "webhook_payload_invalid");
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    let fields = extract_fields(&payload, &headers);
    info!(
        source = %envelope.source,
        event_type = ?fields.event_type,
        created_at = ?fields.created_at,
        idempotency_key = ?fields.idempotency_key,
        "webhook_fields_extracted"
    );

    let idempotency_key = fields.idempotency_key.clone();
    let message = QueueMessage::Webhook(VerifiedWebhook {
        source: envelope.source,
        fields,
        received_at: Utc::now(),
        // Parsed successfully above.
        payload: serde_json::from_str(body).unwrap_or_default(),
    });

    let message_id = match state.publisher.publish(&message).await {
        Ok(id) => id,
        Err(e) => {
            error!(source = %envelope.source, error = %e, "webhook_publish_failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to enqueue webhook");
        }
    };

    info!(source = %envelope.source, message_id = %message_id, "webhook_enqueued");

    success_response(&WebhookResponse {
        status: "enqueued",
        source: envelope.source,
        idempotency_key,
        message_id,
    })
}

// =============================================================================
// First-party Activity
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    pub email: String,
    pub activity: ActivityType,
}

#[derive(Serialize)]
pub struct ActivityResponse {
    pub status: &'static str,
    pub message_id: String,
}

/// Activity endpoint used by the site for copy and page-visit events.
pub async fn record_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provided = header_str(&headers, ACTIVITY_TOKEN_HEADER);
    let expected = state.config.activity_api_token.as_deref();

    match (provided, expected) {
        (Some(provided), Some(expected)) if provided == expected => {}
        (None, Some(_)) => {
            warn!("activity_auth_missing");
            return error_response(StatusCode::UNAUTHORIZED, "missing activity token");
        }
        (Some(_), Some(_)) => {
            warn!("activity_auth_invalid");
            return error_response(StatusCode::UNAUTHORIZED, "invalid activity token");
        }
        (_, None) => {
            // No token configured, allow through
        }
    }

    let request: ActivityRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "activity_payload_invalid");
            let message = format!("invalid activity payload: {e}");
            return error_response(StatusCode::BAD_REQUEST, &message);
        }
    };

    let email = match normalize_email(&request.email) {
        Some(email) => email,
        None => {
            warn!(email = %request.email, "activity_email_invalid");
            return error_response(StatusCode::BAD_REQUEST, "invalid email address");
        }
    };

    let message = QueueMessage::Activity(ActivityEvent {
        email,
        activity: request.activity,
        occurred_at: Utc::now(),
    });

    match state.publisher.publish(&message).await {
        Ok(message_id) => {
            info!(activity = %request.activity, message_id = %message_id, "activity_enqueued");
            success_response(&ActivityResponse {
                status: "enqueued",
                message_id,
            })
        }
        Err(e) => {
            error!(error = %e, "activity_publish_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to enqueue activity")
        }
    }
}

/// Trim and lowercase an address, rejecting anything without a local part
/// and a domain.
fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || email.contains(' ') {
        return None;
    }
    Some(email)
}
