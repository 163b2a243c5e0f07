use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::PollId;

/// Key of a subscriber set.
///
/// `Feed` is the well-known pseudo-resource for clients watching the
/// unfiltered list; it lives in the same index as per-poll sets so the
/// router has a single lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Feed,
    Poll(PollId),
}

impl Topic {
    /// Maps an optional wire `resource_id` to a topic: absent means the feed.
    pub fn from_resource(resource_id: Option<PollId>) -> Self {
        resource_id.map(Topic::Poll).unwrap_or(Topic::Feed)
    }

    /// Inverse of [`Topic::from_resource`].
    pub fn resource_id(&self) -> Option<PollId> {
        match self {
            Topic::Feed => None,
            Topic::Poll(id) => Some(*id),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Feed => write!(f, "feed"),
            Topic::Poll(id) => write!(f, "poll:{}", id),
        }
    }
}
