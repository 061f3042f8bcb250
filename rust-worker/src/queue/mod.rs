//! Queue module for RabbitMQ operations.
//!
//! ## Architecture
//!
//! ```text
//! Web Server → webhook_events queue → Worker → Resend contacts API
//! ```

pub mod publisher;
pub mod types;

pub use publisher::Publisher;
pub use types::{ActivityEvent, QueueMessage, VerifiedWebhook, EVENTS_QUEUE};
