//! Client-side merge of delivered events into local view state.
//!
//! The view holds the polls shown in a filtered listing (newest first) plus
//! any polls the client watches individually ("pinned"). Pinned polls stay
//! in the map even when they drop out of the listing.
//!
//! There is no replay across a disconnect: after a gap the whole view is
//! marked stale and replaced by a baseline read.

use std::collections::{HashMap, HashSet};

use crate::domain::foundation::{PollId, Viewer};
use crate::domain::poll::{MetricDelta, PollEvent, PollSnapshot, PollView, ViewFilter};

/// Effect of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    Inserted,
    Updated,
    Removed,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct LocalView {
    filter: ViewFilter,
    viewer: Viewer,
    polls: HashMap<PollId, PollView>,
    listing: Vec<PollId>,
    pinned: HashSet<PollId>,
    stale: bool,
}

impl LocalView {
    /// An empty view. It starts stale: nothing has been fetched yet.
    pub fn new(filter: ViewFilter, viewer: Viewer) -> Self {
        Self {
            filter,
            viewer,
            polls: HashMap::new(),
            listing: Vec::new(),
            pinned: HashSet::new(),
            stale: true,
        }
    }

    pub fn filter(&self) -> ViewFilter {
        self.filter
    }

    /// Change the listing filter. The view is stale until the next baseline.
    pub fn set_filter(&mut self, filter: ViewFilter) {
        if self.filter != filter {
            self.filter = filter;
            self.stale = true;
        }
    }

    pub fn viewer(&self) -> Viewer {
        self.viewer
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn get(&self, id: PollId) -> Option<&PollView> {
        self.polls.get(&id)
    }

    /// Polls in the listing, in display order.
    pub fn listing(&self) -> Vec<&PollView> {
        self.listing.iter().filter_map(|id| self.polls.get(id)).collect()
    }

    pub fn listing_ids(&self) -> &[PollId] {
        &self.listing
    }

    pub fn pin(&mut self, id: PollId) {
        self.pinned.insert(id);
    }

    /// Stop watching `id` individually; it stays only if the listing shows it.
    pub fn unpin(&mut self, id: PollId) {
        self.pinned.remove(&id);
        if !self.listing.contains(&id) {
            self.polls.remove(&id);
        }
    }

    /// Replace everything with freshly read state.
    ///
    /// `listing` is the filtered list in display order; `pinned` are
    /// individually read polls (already-listed ones may be omitted).
    pub fn replace_baseline(&mut self, listing: Vec<PollView>, pinned: Vec<PollView>) {
        self.polls.clear();
        self.listing.clear();

        for view in listing {
            let id = view.snapshot.id;
            if self.polls.insert(id, view).is_none() {
                self.listing.push(id);
            }
        }
        for view in pinned {
            if self.pinned.contains(&view.snapshot.id) {
                self.polls.entry(view.snapshot.id).or_insert(view);
            }
        }
        self.stale = false;
    }

    /// Replace one poll with a fresh read, viewer fields included. `None`
    /// means the poll no longer exists.
    pub fn refresh(&mut self, id: PollId, fresh: Option<PollView>) -> ViewChange {
        let Some(view) = fresh else {
            return self.apply(&PollEvent::Deleted(id));
        };

        let listed = self.filter.matches(&view.snapshot);
        let was_listed = self.listing.contains(&id);
        if !listed && !self.pinned.contains(&id) {
            self.listing.retain(|listed| *listed != id);
            return match self.polls.remove(&id) {
                Some(_) => ViewChange::Removed,
                None => ViewChange::Ignored,
            };
        }

        let change = match self.polls.insert(id, view) {
            Some(_) => ViewChange::Updated,
            None => ViewChange::Inserted,
        };
        if listed && !was_listed {
            self.listing.insert(0, id);
        } else if !listed && was_listed {
            self.listing.retain(|listed| *listed != id);
        }
        change
    }

    /// Every poll the client shows: the listing plus pinned polls.
    pub fn watched(&self) -> HashSet<PollId> {
        self.listing
            .iter()
            .chain(self.pinned.iter())
            .copied()
            .collect()
    }

    /// Merge one delivered event.
    pub fn apply(&mut self, event: &PollEvent) -> ViewChange {
        match event {
            PollEvent::Created(snapshot) => self.apply_created(snapshot),
            PollEvent::Updated(snapshot) => self.apply_updated(snapshot),
            PollEvent::Deleted(id) => {
                self.listing.retain(|listed| listed != id);
                match self.polls.remove(id) {
                    Some(_) => ViewChange::Removed,
                    None => ViewChange::Ignored,
                }
            }
            PollEvent::MetricChanged { poll_id, delta } => self.apply_metric(*poll_id, delta),
        }
    }

    fn apply_created(&mut self, snapshot: &PollSnapshot) -> ViewChange {
        let id = snapshot.id;
        if self.polls.contains_key(&id) {
            return ViewChange::Ignored;
        }
        let listed = self.filter.matches(snapshot);
        if !listed && !self.pinned.contains(&id) {
            return ViewChange::Ignored;
        }

        self.polls.insert(id, PollView::new(snapshot.clone()));
        if listed {
            self.listing.insert(0, id);
        }
        ViewChange::Inserted
    }

    fn apply_updated(&mut self, snapshot: &PollSnapshot) -> ViewChange {
        let id = snapshot.id;
        let listed = self.filter.matches(snapshot);
        let was_listed = self.listing.contains(&id);
        let keep = listed || self.pinned.contains(&id);

        if !self.polls.contains_key(&id) {
            if !keep {
                return ViewChange::Ignored;
            }
            self.polls.insert(id, PollView::new(snapshot.clone()));
            if listed {
                self.listing.insert(0, id);
            }
            return ViewChange::Inserted;
        }

        if !keep {
            self.polls.remove(&id);
            self.listing.retain(|listed| *listed != id);
            return ViewChange::Removed;
        }

        if let Some(view) = self.polls.get_mut(&id) {
            view.snapshot = snapshot.clone();
        }
        if listed && !was_listed {
            self.listing.insert(0, id);
        } else if !listed && was_listed {
            self.listing.retain(|listed| *listed != id);
        }
        ViewChange::Updated
    }

    fn apply_metric(&mut self, id: PollId, delta: &MetricDelta) -> ViewChange {
        let Some(view) = self.polls.get_mut(&id) else {
            return ViewChange::Ignored;
        };
        let mine = self.viewer.user_id() == Some(delta.actor());

        match delta {
            MetricDelta::Votes(tally) => {
                view.snapshot.total_votes = tally.total_votes;
                view.snapshot.options = tally.options.clone();
                if mine {
                    view.viewer.user_vote_option_id = Some(tally.user_vote_option_id);
                }
            }
            MetricDelta::Likes(tally) => {
                view.snapshot.total_likes = tally.total_likes;
                if mine {
                    view.viewer.user_liked = tally.is_liked;
                }
            }
        }
        ViewChange::Updated
    }
}
