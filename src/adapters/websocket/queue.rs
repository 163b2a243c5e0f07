//! Bounded per-connection outbound queue.
//!
//! Many router invocations enqueue; only the owning connection's transport
//! loop dequeues. When the queue is full the oldest entry is discarded so
//! the router never blocks and the newest event is always kept.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::domain::protocol::ServerMessage;

/// Outcome of a [`OutboundQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued, after discarding the oldest pending message.
    DroppedOldest,
    /// The queue was closed; nothing was queued.
    Closed,
}

struct Inner {
    items: VecDeque<Arc<ServerMessage>>,
    closed: bool,
}

/// Drop-oldest FIFO queue with an async receive side.
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without blocking.
    pub fn push(&self, message: Arc<ServerMessage>) -> PushOutcome {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return PushOutcome::Closed;
            }
            let outcome = if inner.items.len() >= self.capacity {
                inner.items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            inner.items.push_back(message);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Next message in FIFO order.
    ///
    /// Returns `None` once the queue has been closed, even if messages were
    /// still pending. Cancel-safe.
    pub async fn recv(&self) -> Option<Arc<ServerMessage>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(message) = inner.items.pop_front() {
                    return Some(message);
                }
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&self) -> Option<Arc<ServerMessage>> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        inner.items.pop_front()
    }

    /// Close the queue, discarding pending messages and waking the receiver.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut inner = self.lock();
            let was_open = !inner.closed;
            inner.closed = true;
            inner.items.clear();
            was_open
        };
        self.notify.notify_waiters();
        self.notify.notify_one();
        newly_closed
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages discarded by drop-oldest since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::PollId;
    use proptest::prelude::*;
    use std::time::Duration;

    fn deleted(id: i64) -> Arc<ServerMessage> {
        Arc::new(ServerMessage::ResourceDeleted {
            resource_id: PollId::from(id),
        })
    }

    fn drain(queue: &OutboundQueue) -> Vec<Arc<ServerMessage>> {
        std::iter::from_fn(|| queue.try_recv()).collect()
    }

    #[test]
    fn preserves_fifo_order() {
        let queue = OutboundQueue::new(8);
        for id in 1..=3 {
            assert_eq!(queue.push(deleted(id)), PushOutcome::Queued);
        }

        let received = drain(&queue);
        assert_eq!(received, vec![deleted(1), deleted(2), deleted(3)]);
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = OutboundQueue::new(2);
        queue.push(deleted(1));
        queue.push(deleted(2));

        assert_eq!(queue.push(deleted(3)), PushOutcome::DroppedOldest);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(drain(&queue), vec![deleted(2), deleted(3)]);
    }

    #[test]
    fn push_after_close_is_rejected() {
        let queue = OutboundQueue::new(2);
        queue.push(deleted(1));

        assert!(queue.close());
        assert!(!queue.close());
        assert_eq!(queue.push(deleted(2)), PushOutcome::Closed);
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue = OutboundQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[tokio::test]
    async fn recv_waits_for_push() {
        let queue = Arc::new(OutboundQueue::new(4));
        let producer = queue.clone();

        let handle = tokio::spawn(async move { queue.recv().await });
        tokio::task::yield_now().await;
        producer.push(deleted(5));

        let received = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Some(deleted(5)));
    }

    #[tokio::test]
    async fn close_unblocks_waiting_receiver() {
        let queue = Arc::new(OutboundQueue::new(4));
        let closer = queue.clone();

        let handle = tokio::spawn(async move { queue.recv().await });
        tokio::task::yield_now().await;
        closer.close();

        let received = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, None);
    }

    proptest! {
        #[test]
        fn overload_keeps_most_recent(capacity in 1usize..64, extra in 0usize..16) {
            let queue = OutboundQueue::new(capacity);
            let total = capacity + extra;
            for id in 1..=total as i64 {
                queue.push(deleted(id));
            }

            let received = drain(&queue);
            prop_assert!(received.len() <= capacity);
            prop_assert_eq!(received.last(), Some(&deleted(total as i64)));
            prop_assert_eq!(queue.dropped_count(), extra as u64);

            let expected: Vec<_> = ((total - received.len() + 1)..=total)
                .map(|id| deleted(id as i64))
                .collect();
            prop_assert_eq!(received, expected);
        }
    }
}
