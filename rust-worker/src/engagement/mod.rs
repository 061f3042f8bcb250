//! Newsletter engagement scoring.
//!
//! ```text
//! activity → calculate_engagement_change() → contact update → segment sync
//! ```
//!
//! Errors are returned as [`EngagementSyncError`]; callers decide whether to
//! log, retry or ignore them.

pub mod score;
pub mod segment;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;
use tracing::info;

use crate::resend::{run_with_retry, ContactsApi, ResendError, RetryPolicy};

pub use score::{
    calculate_engagement_change, ActivityType, DEFAULT_ENGAGEMENT_SCORE, MAX_ENGAGEMENT_SCORE,
    MIN_ENGAGEMENT_SCORE,
};
pub use segment::{sync_contact_segment, EngagementTier, SegmentIds, SegmentSyncOutcome};

#[derive(Debug, Error)]
pub enum EngagementSyncError {
    #[error("contact {0} not found")]
    ContactNotFound(String),

    #[error("failed to fetch contact {email}: {source}")]
    ContactLookup {
        email: String,
        #[source]
        source: ResendError,
    },

    #[error("failed to update engagement score of contact {contact_id}: {source}")]
    ContactUpdate {
        contact_id: String,
        #[source]
        source: ResendError,
    },

    #[error("failed to list segments of contact {contact_id}: {source}")]
    SegmentList {
        contact_id: String,
        #[source]
        source: ResendError,
    },

    #[error("failed to add contact {contact_id} to segment {segment_id}: {source}")]
    SegmentAdd {
        contact_id: String,
        segment_id: String,
        #[source]
        source: ResendError,
    },

    #[error("failed to remove contact {contact_id} from segment {segment_id}: {source}")]
    SegmentRemove {
        contact_id: String,
        segment_id: String,
        #[source]
        source: ResendError,
    },
}

impl EngagementSyncError {
    /// Short name of the step that failed, for structured logs.
    pub fn action(&self) -> &'static str {
        match self {
            EngagementSyncError::ContactNotFound(_) | EngagementSyncError::ContactLookup { .. } => {
                "get_contact"
            }
            EngagementSyncError::ContactUpdate { .. } => "update_contact",
            EngagementSyncError::SegmentList { .. } => "list_segments",
            EngagementSyncError::SegmentAdd { .. } => "add_segment",
            EngagementSyncError::SegmentRemove { .. } => "remove_segment",
        }
    }
}

/// Result of applying one activity to a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementUpdate {
    pub contact_id: String,
    pub activity: ActivityType,
    pub previous_score: i32,
    pub new_score: i32,
    /// `None` when no tier segments are configured.
    pub segment: Option<SegmentSyncOutcome>,
}

/// Apply an activity to the contact with `email`.
///
/// Reads the current score, writes the new one when it changed and then
/// moves the contact into the matching tier segment. The read-modify-write
/// is not atomic: two activities for the same contact processed at the same
/// time can lose one of the updates.
pub async fn apply_activity(
    api: &dyn ContactsApi,
    segments: Option<&SegmentIds>,
    policy: &RetryPolicy,
    email: &str,
    activity: ActivityType,
) -> Result<EngagementUpdate, EngagementSyncError> {
    let contact = run_with_retry(policy, "get_contact", move || api.get_contact(email))
        .await
        .map_err(|source| EngagementSyncError::ContactLookup {
            email: email.to_string(),
            source,
        })?
        .ok_or_else(|| EngagementSyncError::ContactNotFound(email.to_string()))?;

    let previous_score = contact.engagement_score.unwrap_or(DEFAULT_ENGAGEMENT_SCORE);
    let new_score = calculate_engagement_change(previous_score, activity);
    let contact_id = contact.id.as_str();

    if contact.engagement_score != Some(new_score) {
        run_with_retry(policy, "update_contact_engagement", move || {
            api.update_contact_engagement(contact_id, new_score)
        })
        .await
        .map_err(|source| EngagementSyncError::ContactUpdate {
            contact_id: contact.id.clone(),
            source,
        })?;
    }

    info!(
        contact_id = %contact_id,
        activity = %activity,
        previous_score = previous_score,
        new_score = new_score,
        "engagement_score_updated"
    );

    let segment = match segments {
        Some(ids) => Some(sync_contact_segment(api, ids, policy, contact_id, new_score).await?),
        None => None,
    };

    Ok(EngagementUpdate {
        contact_id: contact.id.clone(),
        activity,
        previous_score,
        new_score,
        segment,
    })
}
