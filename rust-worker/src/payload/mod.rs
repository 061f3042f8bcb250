//! Webhook payload parsing and field extraction.
//!
//! ```text
//! raw body → ParsedPayload::parse() → extract_fields() → ExtractedFields
//! ```

pub mod extract;
pub mod types;

pub use extract::{extract_fields, millis_to_iso};
pub use types::{
    resend_activity, ExtractedFields, ParsedPayload, PayloadError, PolarEvent, ResendEvent,
    VercelEvent, WebhookSource,
};
