//! Server-side state of one client connection.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{ConnectionId, StateMachine, Timestamp, Viewer};
use crate::domain::poll::Topic;
use crate::domain::protocol::ServerMessage;

use super::queue::{OutboundQueue, PushOutcome};

/// Lifecycle of a connection: `Active → Draining → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Accepting inbound frames and draining the outbound queue.
    Active,
    /// Transport failed or timed out; teardown in progress.
    Draining,
    /// Removed from the registry.
    Closed,
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Active, Draining) | (Active, Closed) | (Draining, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Active => vec![Draining, Closed],
            Draining => vec![Closed],
            Closed => vec![],
        }
    }
}

/// One registered connection. Owned by the `ConnectionRegistry`; handed out
/// as `Arc` so the transport loop and the router can hold it concurrently.
pub struct Connection {
    id: ConnectionId,
    viewer: Viewer,
    queue: OutboundQueue,
    state: Mutex<ConnectionState>,
    topics: Mutex<HashSet<Topic>>,
    connected_at: Timestamp,
}

impl Connection {
    pub(crate) fn new(viewer: Viewer, queue_capacity: usize) -> Self {
        Self {
            id: ConnectionId::new(),
            viewer,
            queue: OutboundQueue::new(queue_capacity),
            state: Mutex::new(ConnectionState::Active),
            topics: Mutex::new(HashSet::new()),
            connected_at: Timestamp::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn viewer(&self) -> Viewer {
        self.viewer
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Move to `target` if the transition is valid. Returns whether it moved.
    pub(crate) fn transition(&self, target: ConnectionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.transition_to(target) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(_) => false,
        }
    }

    /// Enqueue an outbound message without blocking.
    pub fn enqueue(&self, message: Arc<ServerMessage>) -> PushOutcome {
        self.queue.push(message)
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Topics this connection is subscribed to.
    pub fn topics(&self) -> HashSet<Topic> {
        self.lock_topics().clone()
    }

    pub(crate) fn lock_topics(&self) -> MutexGuard<'_, HashSet<Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("viewer", &self.viewer)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        assert!(ConnectionState::Active.can_transition_to(&ConnectionState::Draining));
        assert!(ConnectionState::Draining.can_transition_to(&ConnectionState::Closed));
        assert!(!ConnectionState::Closed.can_transition_to(&ConnectionState::Active));
        assert!(!ConnectionState::Draining.can_transition_to(&ConnectionState::Active));
        assert!(ConnectionState::Closed.is_terminal());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let conn = Connection::new(Viewer::Anonymous, 4);
        assert!(conn.transition(ConnectionState::Closed));
        assert!(!conn.transition(ConnectionState::Draining));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn new_connection_is_active_and_unsubscribed() {
        let conn = Connection::new(Viewer::Anonymous, 4);
        assert!(conn.is_active());
        assert!(conn.topics().is_empty());
        assert_eq!(conn.queue().capacity(), 4);
    }
}
