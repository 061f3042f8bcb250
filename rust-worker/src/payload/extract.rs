//! Normalized field extraction.
//!
//! Every sender puts its event type, creation time and a deduplication id in
//! a different place. This module maps each payload to one shape.

use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::types::{ExtractedFields, ParsedPayload};
use crate::web::identify::{header_str, SVIX_ID_HEADER, WEBHOOK_ID_HEADER};

/// Extract `{type, created_at, idempotency_key}` from a parsed payload.
///
/// Missing fields come back as `None`.
pub fn extract_fields(payload: &ParsedPayload, headers: &HeaderMap) -> ExtractedFields {
    match payload {
        ParsedPayload::Resend(event) => ExtractedFields {
            event_type: event.event_type.clone(),
            created_at: event.created_at.clone(),
            idempotency_key: header_str(headers, SVIX_ID_HEADER).map(str::to_string),
        },
        ParsedPayload::Vercel(event) => ExtractedFields {
            event_type: event.event_type.clone(),
            created_at: event.created_at.and_then(millis_to_iso),
            idempotency_key: event.id.clone(),
        },
        ParsedPayload::Polar(event) => ExtractedFields {
            event_type: event.event_type.clone(),
            created_at: event
                .timestamp
                .clone()
                .or_else(|| event.data.get("created_at").and_then(coerce_string)),
            idempotency_key: header_str(headers, WEBHOOK_ID_HEADER).map(str::to_string),
        },
        ParsedPayload::Custom(value) => ExtractedFields {
            event_type: first_string(value, &["type", "event"]),
            created_at: first_string(value, &["created_at", "timestamp"]),
            idempotency_key: first_string(value, &["id"]),
        },
    }
}

/// Convert epoch milliseconds to an ISO-8601 UTC string (`...T00:00:00.000Z`).
pub fn millis_to_iso(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(coerce_string))
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
