//! HeyHook - webhook ingestion and subscriber engagement scoring.
//!
//! This library provides shared modules for the two HeyHook binaries:
//! - `heyhook-web`: Thin web server that verifies and enqueues webhooks
//! - `heyhook-worker`: Consumer that scores engagement against Resend contacts
//!
//! ## Architecture
//!
//! ```text
//! Resend / Vercel / Polar → Web Server → webhook_events → Worker → Resend API
//! ```

pub mod config;
pub mod engagement;
pub mod payload;
pub mod processor;
pub mod queue;
pub mod resend;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use engagement::{apply_activity, ActivityType, EngagementUpdate, SegmentIds};
pub use payload::{extract_fields, ExtractedFields, ParsedPayload, WebhookSource};
pub use processor::{ProcessOutcome, Processor};
pub use queue::{ActivityEvent, Publisher, QueueMessage, VerifiedWebhook, EVENTS_QUEUE};
pub use resend::{ContactsApi, ResendClient, RetryPolicy};
pub use web::{build_router, AppState};
