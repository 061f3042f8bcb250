//! Outbound calls to the Resend API.
//!
//! Every call site wraps its requests in [`run_with_retry`] with a
//! [`RetryPolicy`] from configuration.

pub mod client;
pub mod retry;

pub use client::{Contact, ContactsApi, ResendClient, ResendError, ENGAGEMENT_SCORE_PROPERTY};
pub use retry::{run_with_retry, RetryPolicy};
