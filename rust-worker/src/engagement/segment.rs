//! Engagement tier segments.
//!
//! A contact belongs to exactly one of the high/medium/low engagement
//! segments. Syncing lists the contact's memberships, drops every managed
//! tier that is not the target and adds the target if it is missing.
//! Segments outside the three tiers are left alone.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::EngagementSyncError;
use crate::resend::{run_with_retry, ContactsApi, RetryPolicy};

pub const HIGH_ENGAGEMENT_THRESHOLD: i32 = 70;
pub const MEDIUM_ENGAGEMENT_THRESHOLD: i32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementTier {
    High,
    Medium,
    Low,
}

impl EngagementTier {
    pub fn from_score(score: i32) -> Self {
        if score >= HIGH_ENGAGEMENT_THRESHOLD {
            EngagementTier::High
        } else if score >= MEDIUM_ENGAGEMENT_THRESHOLD {
            EngagementTier::Medium
        } else {
            EngagementTier::Low
        }
    }
}

impl fmt::Display for EngagementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngagementTier::High => "high",
            EngagementTier::Medium => "medium",
            EngagementTier::Low => "low",
        })
    }
}

/// Resend segment ids for the three engagement tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentIds {
    pub high: String,
    pub medium: String,
    pub low: String,
}

impl SegmentIds {
    pub fn id_for(&self, tier: EngagementTier) -> &str {
        match tier {
            EngagementTier::High => &self.high,
            EngagementTier::Medium => &self.medium,
            EngagementTier::Low => &self.low,
        }
    }

    /// Segment id a contact with `score` should be in.
    pub fn determine_segment_by_engagement(&self, score: i32) -> &str {
        self.id_for(EngagementTier::from_score(score))
    }

    fn managed(&self) -> [&str; 3] {
        [&self.high, &self.medium, &self.low]
    }
}

/// What a sync changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSyncOutcome {
    pub tier: EngagementTier,
    pub segment_id: String,
    pub added: bool,
    pub removed: Vec<String>,
}

impl SegmentSyncOutcome {
    pub fn is_noop(&self) -> bool {
        !self.added && self.removed.is_empty()
    }
}

/// Move a contact into the tier segment matching `score`.
///
/// Every remote call goes through `run_with_retry` with `policy`. The first
/// call that still fails after retries aborts the sync.
pub async fn sync_contact_segment(
    api: &dyn ContactsApi,
    segments: &SegmentIds,
    policy: &RetryPolicy,
    contact_id: &str,
    score: i32,
) -> Result<SegmentSyncOutcome, EngagementSyncError> {
    let tier = EngagementTier::from_score(score);
    let target = segments.determine_segment_by_engagement(score);

    let current = run_with_retry(policy, "list_contact_segments", move || {
        api.list_contact_segments(contact_id)
    })
    .await
    .map_err(|source| EngagementSyncError::SegmentList {
        contact_id: contact_id.to_string(),
        source,
    })?;

    let mut removed = Vec::new();
    for segment_id in segments.managed() {
        if segment_id == target || !current.iter().any(|s| s == segment_id) {
            continue;
        }

        run_with_retry(policy, "remove_contact_from_segment", move || {
            api.remove_contact_from_segment(contact_id, segment_id)
        })
        .await
        .map_err(|source| EngagementSyncError::SegmentRemove {
            contact_id: contact_id.to_string(),
            segment_id: segment_id.to_string(),
            source,
        })?;

        removed.push(segment_id.to_string());
    }

    let added = !current.iter().any(|s| s == target);
    if added {
        run_with_retry(policy, "add_contact_to_segment", move || {
            api.add_contact_to_segment(contact_id, target)
        })
        .await
        .map_err(|source| EngagementSyncError::SegmentAdd {
            contact_id: contact_id.to_string(),
            segment_id: target.to_string(),
            source,
        })?;
    }

    let outcome = SegmentSyncOutcome {
        tier,
        segment_id: target.to_string(),
        added,
        removed,
    };

    info!(
        contact_id = %contact_id,
        score = score,
        tier = %tier,
        added = outcome.added,
        removed = outcome.removed.len(),
        "engagement_segment_synced"
    );

    Ok(outcome)
}
