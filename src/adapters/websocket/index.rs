//! Topic → connection-set index.
//!
//! Each topic's subscriber set lives in its own `DashMap` entry, so churn on
//! one poll never contends with routing for another. Topics with no
//! subscribers are removed rather than kept as empty sets.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::domain::foundation::ConnectionId;
use crate::domain::poll::Topic;

#[derive(Default)]
pub struct SubscriptionIndex {
    topics: DashMap<Topic, HashSet<ConnectionId>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to `topic`. Returns `false` if it was already there.
    pub fn subscribe(&self, topic: Topic, connection: ConnectionId) -> bool {
        self.topics.entry(topic).or_default().insert(connection)
    }

    /// Remove `connection` from `topic`. Returns `false` if it was not there.
    pub fn unsubscribe(&self, topic: Topic, connection: &ConnectionId) -> bool {
        let removed = match self.topics.get_mut(&topic) {
            Some(mut set) => set.remove(connection),
            None => return false,
        };
        self.topics.remove_if(&topic, |_, set| set.is_empty());
        removed
    }

    /// Point-in-time copy of the subscribers of `topic`.
    pub fn subscribers_of(&self, topic: Topic) -> HashSet<ConnectionId> {
        self.topics
            .get(&topic)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map(|set| set.len()).unwrap_or(0)
    }

    pub fn contains(&self, topic: Topic) -> bool {
        self.topics.contains_key(&topic)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::PollId;

    fn poll(id: i64) -> Topic {
        Topic::Poll(PollId::from(id))
    }

    #[test]
    fn subscribe_is_idempotent() {
        let index = SubscriptionIndex::new();
        let conn = ConnectionId::new();

        assert!(index.subscribe(poll(1), conn));
        assert!(!index.subscribe(poll(1), conn));
        assert_eq!(index.subscriber_count(poll(1)), 1);
    }

    #[test]
    fn last_unsubscribe_removes_topic() {
        let index = SubscriptionIndex::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        index.subscribe(poll(1), a);
        index.subscribe(poll(1), b);

        assert!(index.unsubscribe(poll(1), &a));
        assert!(index.contains(poll(1)));
        assert!(index.unsubscribe(poll(1), &b));
        assert!(!index.contains(poll(1)));
        assert_eq!(index.topic_count(), 0);
    }

    #[test]
    fn unsubscribe_unknown_is_noop() {
        let index = SubscriptionIndex::new();
        assert!(!index.unsubscribe(poll(9), &ConnectionId::new()));
        assert!(!index.contains(poll(9)));
    }

    #[test]
    fn snapshot_does_not_observe_later_changes() {
        let index = SubscriptionIndex::new();
        let a = ConnectionId::new();
        index.subscribe(Topic::Feed, a);

        let snapshot = index.subscribers_of(Topic::Feed);
        index.subscribe(Topic::Feed, ConnectionId::new());
        index.unsubscribe(Topic::Feed, &a);

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&a));
    }

    #[test]
    fn topics_are_isolated() {
        let index = SubscriptionIndex::new();
        let a = ConnectionId::new();
        index.subscribe(poll(1), a);

        assert!(index.subscribers_of(poll(2)).is_empty());
        assert!(index.subscribers_of(Topic::Feed).is_empty());
    }
}
