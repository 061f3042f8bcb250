//! Engagement score arithmetic.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIN_ENGAGEMENT_SCORE: i32 = 0;
pub const MAX_ENGAGEMENT_SCORE: i32 = 100;

/// Score assumed for contacts that have never been scored.
pub const DEFAULT_ENGAGEMENT_SCORE: i32 = 50;

/// Something a subscriber did that moves their engagement score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    EmailOpen,
    EmailClick,
    ContentCopy,
    PageVisit,
    EmailBounce,
    EmailComplaint,
}

impl ActivityType {
    pub const ALL: [ActivityType; 6] = [
        ActivityType::EmailOpen,
        ActivityType::EmailClick,
        ActivityType::ContentCopy,
        ActivityType::PageVisit,
        ActivityType::EmailBounce,
        ActivityType::EmailComplaint,
    ];

    /// Additive score change, or `None` for activities that reset the score.
    pub fn delta(&self) -> Option<i32> {
        match self {
            ActivityType::EmailOpen => Some(5),
            ActivityType::EmailClick => Some(10),
            ActivityType::ContentCopy => Some(8),
            ActivityType::PageVisit => Some(2),
            ActivityType::EmailBounce => Some(-20),
            ActivityType::EmailComplaint => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::EmailOpen => "email_open",
            ActivityType::EmailClick => "email_click",
            ActivityType::ContentCopy => "content_copy",
            ActivityType::PageVisit => "page_visit",
            ActivityType::EmailBounce => "email_bounce",
            ActivityType::EmailComplaint => "email_complaint",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply an activity to a score.
///
/// The result is always within `[0, 100]`. A complaint resets the score to
/// zero regardless of its current value.
pub fn calculate_engagement_change(current_score: i32, activity: ActivityType) -> i32 {
    match activity.delta() {
        None => MIN_ENGAGEMENT_SCORE,
        Some(delta) => current_score
            .clamp(MIN_ENGAGEMENT_SCORE, MAX_ENGAGEMENT_SCORE)
            .saturating_add(delta)
            .clamp(MIN_ENGAGEMENT_SCORE, MAX_ENGAGEMENT_SCORE),
    }
}
