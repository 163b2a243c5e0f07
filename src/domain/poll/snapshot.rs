//! Materialized poll state carried by events and baseline reads.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{OptionId, PollId, Timestamp, UserId};

/// One option of a poll together with its current tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOptionSnapshot {
    pub id: OptionId,
    pub text: String,
    pub position: i32,
    #[serde(default)]
    pub vote_count: u64,
}

/// Post-mutation snapshot of a poll as the store would return it.
///
/// Viewer-specific fields (has this viewer voted / liked) are deliberately
/// absent: a broadcast snapshot is the same for every recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub id: PollId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub creator_id: UserId,
    pub creator_username: String,
    pub created_at: Timestamp,
    pub is_active: bool,
    pub options: Vec<PollOptionSnapshot>,
    #[serde(default)]
    pub total_votes: u64,
    #[serde(default)]
    pub total_likes: u64,
}

impl PollSnapshot {
    /// Options ordered by their display position.
    pub fn sorted_options(&self) -> Vec<&PollOptionSnapshot> {
        let mut options: Vec<_> = self.options.iter().collect();
        options.sort_by_key(|o| o.position);
        options
    }
}

/// New vote tally after a vote was cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub total_votes: u64,
    pub options: Vec<PollOptionSnapshot>,
    /// The voter whose action produced this tally.
    pub user_id: UserId,
    pub user_vote_option_id: OptionId,
}

/// New like count after a like was toggled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeTally {
    pub total_likes: u64,
    /// The user who toggled.
    pub user_id: UserId,
    /// Whether that user now likes the poll.
    pub is_liked: bool,
}

/// Payload of a `metric_changed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum MetricDelta {
    Votes(VoteTally),
    Likes(LikeTally),
}

impl MetricDelta {
    /// The user whose action produced the delta.
    pub fn actor(&self) -> UserId {
        match self {
            MetricDelta::Votes(t) => t.user_id,
            MetricDelta::Likes(t) => t.user_id,
        }
    }
}
