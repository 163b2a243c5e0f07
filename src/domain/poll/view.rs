//! Client-side view types: which polls a viewer wants listed, and the
//! per-viewer fields that never travel in broadcast snapshots.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{OptionId, UserId};

use super::PollSnapshot;

/// Listing filter, mirroring the query parameters of the poll list endpoint.
///
/// With neither field set the listing shows active polls only; filtering by
/// creator ("my polls") shows both active and inactive ones unless
/// `is_active` is given explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<UserId>,
}

impl ViewFilter {
    /// The public feed: active polls from everyone.
    pub fn public() -> Self {
        Self::default()
    }

    /// Every poll created by `user`, active or not.
    pub fn owned_by(user: UserId) -> Self {
        Self {
            is_active: None,
            creator_id: Some(user),
        }
    }

    pub fn effective_is_active(&self) -> Option<bool> {
        match (self.is_active, self.creator_id) {
            (None, None) => Some(true),
            (active, _) => active,
        }
    }

    /// Whether a poll in this state belongs in the listing.
    pub fn matches(&self, snapshot: &PollSnapshot) -> bool {
        let active_ok = self
            .effective_is_active()
            .map_or(true, |wanted| snapshot.is_active == wanted);
        let creator_ok = self
            .creator_id
            .map_or(true, |creator| snapshot.creator_id == creator);
        active_ok && creator_ok
    }

    /// Query pairs for the list endpoint.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(active) = self.is_active {
            pairs.push(("is_active", active.to_string()));
        }
        if let Some(creator) = self.creator_id {
            pairs.push(("creator_id", creator.to_string()));
        }
        pairs
    }
}

/// What this viewer has done to a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewerState {
    #[serde(default)]
    pub user_vote_option_id: Option<OptionId>,
    #[serde(default)]
    pub user_liked: bool,
}

impl ViewerState {
    pub fn user_voted(&self) -> bool {
        self.user_vote_option_id.is_some()
    }
}

/// A poll as one viewer sees it: the shared snapshot plus viewer fields.
///
/// Deserializes from the flat shape returned by the poll read endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollView {
    #[serde(flatten)]
    pub snapshot: PollSnapshot,
    #[serde(flatten)]
    pub viewer: ViewerState,
}

impl PollView {
    pub fn new(snapshot: PollSnapshot) -> Self {
        Self {
            snapshot,
            viewer: ViewerState::default(),
        }
    }
}
