//! Web server module for handling inbound webhooks.
//!
//! This module provides a thin, fast web server that:
//! - Identifies the sender of each webhook from its headers
//! - Verifies the signature over the raw body
//! - Enqueues the normalized event to RabbitMQ
//!
//! Engagement scoring happens in the background worker.

pub mod handlers;
pub mod identify;
pub mod response;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, inbound_webhook, record_activity, ActivityRequest, AppState, HealthResponse,
    WebhookResponse,
};
pub use identify::{VerificationError, WebhookEnvelope, WebhookIdentifier};
pub use signature::{verify_svix_signature, verify_vercel_signature};

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/webhooks",
            post(inbound_webhook).options(handlers::preflight),
        )
        .route(
            "/engagement/activity",
            post(record_activity).options(handlers::preflight),
        )
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
