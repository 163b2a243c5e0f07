//! In-memory poll store and reader.
//!
//! Stands in for the mutation collaborator in tests and local runs: every
//! mutation commits to memory and returns the materialized [`PollEvent`]
//! the caller hands to an [`EventPublisher`](crate::ports::EventPublisher).
//! [`InMemoryPollReader`] answers baseline reads from the same state, with
//! the viewer fields filled in for one viewer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::foundation::{
    DomainError, ErrorCode, OptionId, PollId, Timestamp, UserId, ValidationError, Viewer,
};
use crate::domain::poll::{
    LikeTally, MetricDelta, PollEvent, PollOptionSnapshot, PollSnapshot, PollView, ViewFilter,
    ViewerState, VoteTally,
};
use crate::ports::PollReader;

const TITLE_MIN: usize = 3;
const TITLE_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 1000;
const OPTION_TEXT_MAX: usize = 200;
const OPTIONS_MIN: usize = 2;
const OPTIONS_MAX: usize = 10;

/// A new poll as submitted by its creator.
#[derive(Debug, Clone)]
pub struct NewPoll {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
}

impl NewPoll {
    pub fn new(title: impl Into<String>, options: &[&str]) -> Self {
        Self {
            title: title.into(),
            description: None,
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_description(self.description.as_deref())?;

        if self.options.len() < OPTIONS_MIN || self.options.len() > OPTIONS_MAX {
            return Err(ValidationError::out_of_range(
                "options",
                OPTIONS_MIN as i32,
                OPTIONS_MAX as i32,
                self.options.len() as i32,
            ));
        }
        let mut seen = HashSet::new();
        for text in &self.options {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::empty_field("options.text"));
            }
            if trimmed.chars().count() > OPTION_TEXT_MAX {
                return Err(ValidationError::invalid_format("options.text", "too long"));
            }
            if !seen.insert(trimmed.to_lowercase()) {
                return Err(ValidationError::invalid_format(
                    "options",
                    "poll options must be unique",
                ));
            }
        }
        Ok(())
    }
}

/// Partial update applied by the poll's creator.
#[derive(Debug, Clone, Default)]
pub struct PollUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    let len = title.trim().chars().count();
    if len < TITLE_MIN || len > TITLE_MAX {
        return Err(ValidationError::out_of_range(
            "title",
            TITLE_MIN as i32,
            TITLE_MAX as i32,
            len as i32,
        ));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
    match description {
        Some(text) if text.chars().count() > DESCRIPTION_MAX => Err(
            ValidationError::invalid_format("description", "too long"),
        ),
        _ => Ok(()),
    }
}

#[derive(Debug)]
struct StoredPoll {
    snapshot: PollSnapshot,
    votes: HashMap<UserId, OptionId>,
    likes: HashSet<UserId>,
}

impl StoredPoll {
    fn view_for(&self, viewer: Viewer) -> PollView {
        let viewer = match viewer.user_id() {
            Some(user) => ViewerState {
                user_vote_option_id: self.votes.get(&user).copied(),
                user_liked: self.likes.contains(&user),
            },
            None => ViewerState::default(),
        };
        PollView {
            snapshot: self.snapshot.clone(),
            viewer,
        }
    }

    fn recount_votes(&mut self) {
        for option in &mut self.snapshot.options {
            option.vote_count = self.votes.values().filter(|v| **v == option.id).count() as u64;
        }
        self.snapshot.total_votes = self.votes.len() as u64;
    }
}

#[derive(Debug, Default)]
struct StoreState {
    polls: BTreeMap<PollId, StoredPoll>,
    last_poll_id: i64,
    last_option_id: i64,
}

/// Polls, votes and likes held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPollStore {
    state: RwLock<StoreState>,
}

impl InMemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_poll(
        &self,
        creator: UserId,
        creator_username: &str,
        poll: NewPoll,
    ) -> Result<PollEvent, DomainError> {
        poll.validate()?;

        let mut state = self.write();
        state.last_poll_id += 1;
        let id = PollId::from(state.last_poll_id);

        let mut options = Vec::with_capacity(poll.options.len());
        for (position, text) in poll.options.iter().enumerate() {
            state.last_option_id += 1;
            options.push(PollOptionSnapshot {
                id: OptionId::from(state.last_option_id),
                text: text.trim().to_string(),
                position: position as i32,
                vote_count: 0,
            });
        }

        let snapshot = PollSnapshot {
            id,
            title: poll.title.trim().to_string(),
            description: poll.description,
            creator_id: creator,
            creator_username: creator_username.to_string(),
            created_at: Timestamp::now(),
            is_active: true,
            options,
            total_votes: 0,
            total_likes: 0,
        };

        state.polls.insert(
            id,
            StoredPoll {
                snapshot: snapshot.clone(),
                votes: HashMap::new(),
                likes: HashSet::new(),
            },
        );

        tracing::debug!(poll_id = %id, creator_id = %creator, "Poll created");
        Ok(PollEvent::Created(snapshot))
    }

    /// Apply `update`. Only the creator may change a poll.
    pub fn update_poll(
        &self,
        id: PollId,
        actor: UserId,
        update: PollUpdate,
    ) -> Result<PollEvent, DomainError> {
        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        validate_description(update.description.as_deref())?;

        let mut state = self.write();
        let stored = owned_poll(&mut state, id, actor)?;

        if let Some(title) = update.title {
            stored.snapshot.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            stored.snapshot.description = Some(description);
        }
        if let Some(active) = update.is_active {
            stored.snapshot.is_active = active;
        }

        Ok(PollEvent::Updated(stored.snapshot.clone()))
    }

    /// Remove a poll with its votes and likes. Only the creator may delete.
    pub fn delete_poll(&self, id: PollId, actor: UserId) -> Result<PollEvent, DomainError> {
        let mut state = self.write();
        owned_poll(&mut state, id, actor)?;
        state.polls.remove(&id);

        tracing::debug!(poll_id = %id, "Poll deleted");
        Ok(PollEvent::Deleted(id))
    }

    /// Cast or move `user`'s vote. The poll must be active and own `option`.
    pub fn vote(
        &self,
        id: PollId,
        user: UserId,
        option: OptionId,
    ) -> Result<PollEvent, DomainError> {
        let mut state = self.write();
        let stored = state.polls.get_mut(&id).ok_or_else(|| not_found(id))?;

        if !stored.snapshot.is_active {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Poll is not accepting votes",
            )
            .with_detail("poll_id", id.to_string()));
        }
        if !stored.snapshot.options.iter().any(|o| o.id == option) {
            return Err(DomainError::validation(
                "option_id",
                format!("option {} does not belong to poll {}", option, id),
            ));
        }

        stored.votes.insert(user, option);
        stored.recount_votes();

        Ok(PollEvent::MetricChanged {
            poll_id: id,
            delta: MetricDelta::Votes(VoteTally {
                total_votes: stored.snapshot.total_votes,
                options: stored
                    .snapshot
                    .sorted_options()
                    .into_iter()
                    .cloned()
                    .collect(),
                user_id: user,
                user_vote_option_id: option,
            }),
        })
    }

    /// Like the poll, or take the like back if `user` already liked it.
    pub fn toggle_like(&self, id: PollId, user: UserId) -> Result<PollEvent, DomainError> {
        let mut state = self.write();
        let stored = state.polls.get_mut(&id).ok_or_else(|| not_found(id))?;

        let is_liked = if stored.likes.remove(&user) {
            false
        } else {
            stored.likes.insert(user);
            true
        };
        stored.snapshot.total_likes = stored.likes.len() as u64;

        Ok(PollEvent::MetricChanged {
            poll_id: id,
            delta: MetricDelta::Likes(LikeTally {
                total_likes: stored.snapshot.total_likes,
                user_id: user,
                is_liked,
            }),
        })
    }

    /// Polls matching `filter` as `viewer` sees them, newest first.
    pub fn list(&self, filter: &ViewFilter, viewer: Viewer) -> Vec<PollView> {
        self.read()
            .polls
            .values()
            .rev()
            .filter(|p| filter.matches(&p.snapshot))
            .map(|p| p.view_for(viewer))
            .collect()
    }

    pub fn get(&self, id: PollId, viewer: Viewer) -> Option<PollView> {
        self.read().polls.get(&id).map(|p| p.view_for(viewer))
    }

    pub fn len(&self) -> usize {
        self.read().polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(id: PollId) -> DomainError {
    DomainError::new(ErrorCode::PollNotFound, "Poll not found")
        .with_detail("poll_id", id.to_string())
}

fn owned_poll(
    state: &mut StoreState,
    id: PollId,
    actor: UserId,
) -> Result<&mut StoredPoll, DomainError> {
    let stored = state.polls.get_mut(&id).ok_or_else(|| not_found(id))?;
    if stored.snapshot.creator_id != actor {
        return Err(DomainError::new(ErrorCode::Unauthorized, "Not the creator of this poll")
            .with_detail("poll_id", id.to_string()));
    }
    Ok(stored)
}

/// [`PollReader`] over an [`InMemoryPollStore`], as one viewer.
#[derive(Debug, Clone)]
pub struct InMemoryPollReader {
    store: Arc<InMemoryPollStore>,
    viewer: Viewer,
}

impl InMemoryPollReader {
    pub fn new(store: Arc<InMemoryPollStore>, viewer: Viewer) -> Self {
        Self { store, viewer }
    }
}

#[async_trait]
impl PollReader for InMemoryPollReader {
    async fn list_polls(&self, filter: &ViewFilter) -> Result<Vec<PollView>, DomainError> {
        Ok(self.store.list(filter, self.viewer))
    }

    async fn get_poll(&self, id: PollId) -> Result<Option<PollView>, DomainError> {
        Ok(self.store.get(id, self.viewer))
    }
}
