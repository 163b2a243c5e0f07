//! Connection registry: owner of every live connection and the only writer
//! of the subscription index.
//!
//! # Teardown
//!
//! `unregister` closes the connection's queue and marks it `Closed` while
//! holding the connection's topic lock, then removes each of its topics from
//! the index. A concurrent `subscribe` takes the same lock and re-checks the
//! state, so no subscription can be added after teardown has begun. A
//! router holding a subscriber snapshot taken just before teardown finds the
//! queue closed and skips the connection.

use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::foundation::{ConnectionId, Viewer};
use crate::domain::poll::Topic;

use super::connection::{Connection, ConnectionState};
use super::index::SubscriptionIndex;

/// Outcome of a subscription change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    Added,
    Removed,
    /// Already in the requested state.
    Unchanged,
    /// The connection is unknown or no longer active.
    Inactive,
}

pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    index: SubscriptionIndex,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            index: SubscriptionIndex::new(),
            queue_capacity,
        }
    }

    /// Register a new active connection for `viewer`.
    pub fn register(&self, viewer: Viewer) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(viewer, self.queue_capacity));
        self.connections.insert(connection.id(), connection.clone());

        tracing::debug!(
            connection_id = %connection.id(),
            authenticated = viewer.is_authenticated(),
            "Connection registered"
        );
        connection
    }

    /// Tear down a connection. Unknown or already removed ids are a no-op.
    ///
    /// Returns `true` only for the call that performed the teardown.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let Some((_, connection)) = self.connections.remove(id) else {
            return false;
        };

        let topics: Vec<Topic> = {
            let mut topics = connection.lock_topics();
            connection.queue().close();
            connection.transition(ConnectionState::Closed);
            topics.drain().collect()
        };

        for topic in &topics {
            self.index.unsubscribe(*topic, id);
        }

        tracing::debug!(
            connection_id = %id,
            subscriptions = topics.len(),
            "Connection unregistered"
        );
        true
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn subscribe(&self, id: &ConnectionId, topic: Topic) -> SubscriptionChange {
        let Some(connection) = self.get(id) else {
            return SubscriptionChange::Inactive;
        };

        let mut topics = connection.lock_topics();
        if !connection.is_active() {
            return SubscriptionChange::Inactive;
        }
        if !topics.insert(topic) {
            return SubscriptionChange::Unchanged;
        }
        self.index.subscribe(topic, *id);

        tracing::trace!(connection_id = %id, topic = %topic, "Subscribed");
        SubscriptionChange::Added
    }

    pub fn unsubscribe(&self, id: &ConnectionId, topic: Topic) -> SubscriptionChange {
        let Some(connection) = self.get(id) else {
            return SubscriptionChange::Inactive;
        };

        let mut topics = connection.lock_topics();
        if !connection.is_active() {
            return SubscriptionChange::Inactive;
        }
        if !topics.remove(&topic) {
            return SubscriptionChange::Unchanged;
        }
        self.index.unsubscribe(topic, id);

        tracing::trace!(connection_id = %id, topic = %topic, "Unsubscribed");
        SubscriptionChange::Removed
    }

    /// Point-in-time subscriber set of `topic`.
    pub fn subscribers_of(&self, topic: Topic) -> std::collections::HashSet<ConnectionId> {
        self.index.subscribers_of(topic)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn topic_count(&self) -> usize {
        self.index.topic_count()
    }

    /// Close every connection. Used on server shutdown.
    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.unregister(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PollId, UserId};

    fn poll(id: i64) -> Topic {
        Topic::Poll(PollId::from(id))
    }

    #[test]
    fn register_and_get() {
        let registry = ConnectionRegistry::new(8);
        let conn = registry.register(Viewer::User(UserId::from(3)));

        let found = registry.get(&conn.id()).unwrap();
        assert!(Arc::ptr_eq(&found, &conn));
        assert_eq!(found.viewer().user_id(), Some(UserId::from(3)));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn subscribe_twice_is_unchanged() {
        let registry = ConnectionRegistry::new(8);
        let conn = registry.register(Viewer::Anonymous);

        assert_eq!(registry.subscribe(&conn.id(), poll(1)), SubscriptionChange::Added);
        assert_eq!(registry.subscribe(&conn.id(), poll(1)), SubscriptionChange::Unchanged);
        assert_eq!(registry.subscribers_of(poll(1)).len(), 1);
    }

    #[test]
    fn unsubscribe_removes_from_index() {
        let registry = ConnectionRegistry::new(8);
        let conn = registry.register(Viewer::Anonymous);
        registry.subscribe(&conn.id(), poll(1));

        assert_eq!(registry.unsubscribe(&conn.id(), poll(1)), SubscriptionChange::Removed);
        assert_eq!(registry.unsubscribe(&conn.id(), poll(1)), SubscriptionChange::Unchanged);
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn unregister_removes_every_subscription() {
        let registry = ConnectionRegistry::new(8);
        let conn = registry.register(Viewer::Anonymous);
        let other = registry.register(Viewer::Anonymous);
        for id in 1..=3 {
            registry.subscribe(&conn.id(), poll(id));
        }
        registry.subscribe(&conn.id(), Topic::Feed);
        registry.subscribe(&other.id(), poll(2));

        assert!(registry.unregister(&conn.id()));

        assert!(registry.get(&conn.id()).is_none());
        assert!(registry.subscribers_of(poll(1)).is_empty());
        assert!(registry.subscribers_of(Topic::Feed).is_empty());
        assert_eq!(
            registry.subscribers_of(poll(2)).into_iter().collect::<Vec<_>>(),
            vec![other.id()]
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.queue().is_closed());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new(8);
        let conn = registry.register(Viewer::Anonymous);

        assert!(registry.unregister(&conn.id()));
        assert!(!registry.unregister(&conn.id()));
        assert!(!registry.unregister(&ConnectionId::new()));
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn subscribe_after_teardown_is_rejected() {
        let registry = ConnectionRegistry::new(8);
        let conn = registry.register(Viewer::Anonymous);
        registry.unregister(&conn.id());

        assert_eq!(registry.subscribe(&conn.id(), poll(1)), SubscriptionChange::Inactive);
        assert!(!registry.subscribers_of(poll(1)).contains(&conn.id()));
    }

    #[test]
    fn close_all_empties_registry() {
        let registry = ConnectionRegistry::new(8);
        for _ in 0..3 {
            let conn = registry.register(Viewer::Anonymous);
            registry.subscribe(&conn.id(), Topic::Feed);
        }

        registry.close_all();
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.topic_count(), 0);
    }
}
