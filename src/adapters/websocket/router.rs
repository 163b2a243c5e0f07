//! Event router: fans committed poll events out to subscriber queues.
//!
//! # Routing
//!
//! | event              | recipients                                   |
//! |--------------------|----------------------------------------------|
//! | resource_created   | poll subscribers ∪ feed                      |
//! | resource_updated   | poll subscribers (∪ feed with `feed_lifecycle`) |
//! | resource_deleted   | poll subscribers (∪ feed with `feed_lifecycle`) |
//! | metric_changed     | poll subscribers                             |
//!
//! Each recipient gets one copy even when it sits in both sets. Routing for
//! a single poll is serialized on a striped lock, so two events for the same
//! poll reach every queue in emission order.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{ConnectionId, DomainError, PollId};
use crate::domain::poll::{PollEvent, PollEventKind, Topic};
use crate::domain::protocol::ServerMessage;
use crate::ports::EventPublisher;

use super::queue::PushOutcome;
use super::registry::ConnectionRegistry;

const ORDERING_STRIPES: usize = 64;

/// Operational counters for the broadcast path.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    events_routed: AtomicU64,
    deliveries_enqueued: AtomicU64,
    deliveries_dropped_overflow: AtomicU64,
    deliveries_skipped_closed: AtomicU64,
    malformed_frames: AtomicU64,
}

/// Point-in-time copy of [`RouterMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RouterMetricsSnapshot {
    pub events_routed: u64,
    pub deliveries_enqueued: u64,
    pub deliveries_dropped_overflow: u64,
    pub deliveries_skipped_closed: u64,
    pub malformed_frames: u64,
}

impl RouterMetrics {
    pub fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            events_routed: self.events_routed.load(Ordering::Relaxed),
            deliveries_enqueued: self.deliveries_enqueued.load(Ordering::Relaxed),
            deliveries_dropped_overflow: self.deliveries_dropped_overflow.load(Ordering::Relaxed),
            deliveries_skipped_closed: self.deliveries_skipped_closed.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }
}

/// Result of routing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteReport {
    /// Connections the event was enqueued for.
    pub delivered: usize,
    /// Of those, how many had to discard their oldest pending message.
    pub overflowed: usize,
    /// Recipients skipped because they had already closed.
    pub skipped: usize,
}

pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<RouterMetrics>,
    feed_lifecycle: bool,
    stripes: Vec<Mutex<()>>,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            metrics: Arc::new(RouterMetrics::default()),
            feed_lifecycle: false,
            stripes: (0..ORDERING_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Also send updates and deletes to feed subscribers.
    pub fn with_feed_lifecycle(mut self, enabled: bool) -> Self {
        self.feed_lifecycle = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    /// Enqueue `event` for every recipient. Never blocks on a slow consumer.
    pub fn route(&self, event: PollEvent) -> RouteReport {
        let poll_id = event.resource_id();
        let kind = event.kind();
        let message = Arc::new(ServerMessage::from(event));

        let _order = self.stripe(poll_id).lock().unwrap_or_else(PoisonError::into_inner);
        let targets = self.recipients(kind, poll_id);

        let mut report = RouteReport::default();
        for id in &targets {
            let outcome = match self.registry.get(id) {
                Some(connection) => connection.enqueue(message.clone()),
                None => PushOutcome::Closed,
            };
            match outcome {
                PushOutcome::Queued => report.delivered += 1,
                PushOutcome::DroppedOldest => {
                    report.delivered += 1;
                    report.overflowed += 1;
                    tracing::warn!(
                        connection_id = %id,
                        poll_id = %poll_id,
                        "Outbound queue full, dropped oldest message"
                    );
                }
                PushOutcome::Closed => report.skipped += 1,
            }
        }

        self.metrics.events_routed.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .deliveries_enqueued
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.metrics
            .deliveries_dropped_overflow
            .fetch_add(report.overflowed as u64, Ordering::Relaxed);
        self.metrics
            .deliveries_skipped_closed
            .fetch_add(report.skipped as u64, Ordering::Relaxed);

        tracing::debug!(
            event = %kind,
            poll_id = %poll_id,
            delivered = report.delivered,
            skipped = report.skipped,
            "Event routed"
        );
        report
    }

    fn recipients(&self, kind: PollEventKind, poll_id: PollId) -> HashSet<ConnectionId> {
        let mut targets = self.registry.subscribers_of(Topic::Poll(poll_id));
        let include_feed = match kind {
            PollEventKind::ResourceCreated => true,
            PollEventKind::ResourceUpdated | PollEventKind::ResourceDeleted => self.feed_lifecycle,
            PollEventKind::MetricChanged => false,
        };
        if include_feed {
            targets.extend(self.registry.subscribers_of(Topic::Feed));
        }
        targets
    }

    fn stripe(&self, poll_id: PollId) -> &Mutex<()> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        poll_id.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % self.stripes.len()]
    }
}

#[async_trait]
impl EventPublisher for EventRouter {
    async fn publish(&self, event: PollEvent) -> Result<(), DomainError> {
        self.route(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::connection::Connection;
    use crate::domain::foundation::{UserId, Viewer};
    use crate::domain::poll::snapshot::fixtures;
    use crate::domain::poll::{LikeTally, MetricDelta};

    fn setup(capacity: usize) -> (Arc<ConnectionRegistry>, EventRouter) {
        let registry = Arc::new(ConnectionRegistry::new(capacity));
        let router = EventRouter::new(registry.clone());
        (registry, router)
    }

    fn drain(connection: &Connection) -> Vec<ServerMessage> {
        std::iter::from_fn(|| connection.queue().try_recv())
            .map(|m| (*m).clone())
            .collect()
    }

    fn like(poll: i64) -> PollEvent {
        PollEvent::MetricChanged {
            poll_id: PollId::from(poll),
            delta: MetricDelta::Likes(LikeTally {
                total_likes: 1,
                user_id: UserId::from(2),
                is_liked: true,
            }),
        }
    }

    #[test]
    fn metric_goes_to_poll_subscribers_only() {
        let (registry, router) = setup(8);
        let watcher = registry.register(Viewer::Anonymous);
        let feed = registry.register(Viewer::Anonymous);
        registry.subscribe(&watcher.id(), Topic::Poll(PollId::from(4)));
        registry.subscribe(&feed.id(), Topic::Feed);

        let report = router.route(like(4));

        assert_eq!(report.delivered, 1);
        assert_eq!(drain(&watcher).len(), 1);
        assert!(drain(&feed).is_empty());
    }

    #[test]
    fn created_reaches_feed_once_even_if_also_subscribed() {
        let (registry, router) = setup(8);
        let conn = registry.register(Viewer::Anonymous);
        registry.subscribe(&conn.id(), Topic::Feed);
        registry.subscribe(&conn.id(), Topic::Poll(PollId::from(5)));

        router.route(PollEvent::Created(fixtures::poll(5, 1, true)));

        let received = drain(&conn);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].type_name(), "resource_created");
    }

    #[test]
    fn updates_skip_feed_unless_lifecycle_enabled() {
        let (registry, router) = setup(8);
        let feed = registry.register(Viewer::Anonymous);
        registry.subscribe(&feed.id(), Topic::Feed);

        router.route(PollEvent::Updated(fixtures::poll(6, 1, false)));
        assert!(drain(&feed).is_empty());

        let router = EventRouter::new(registry.clone()).with_feed_lifecycle(true);
        router.route(PollEvent::Updated(fixtures::poll(6, 1, false)));
        router.route(PollEvent::Deleted(PollId::from(6)));
        assert_eq!(drain(&feed).len(), 2);
    }

    #[test]
    fn closed_connection_is_skipped_and_counted() {
        let (registry, router) = setup(8);
        let conn = registry.register(Viewer::Anonymous);
        registry.subscribe(&conn.id(), Topic::Poll(PollId::from(1)));
        conn.queue().close();

        let report = router.route(like(1));

        assert_eq!(report.skipped, 1);
        assert_eq!(router.metrics().snapshot().deliveries_skipped_closed, 1);
    }

    #[test]
    fn overflow_is_counted() {
        let (registry, router) = setup(2);
        let conn = registry.register(Viewer::Anonymous);
        registry.subscribe(&conn.id(), Topic::Poll(PollId::from(1)));

        for _ in 0..5 {
            router.route(like(1));
        }

        let metrics = router.metrics().snapshot();
        assert_eq!(metrics.events_routed, 5);
        assert_eq!(metrics.deliveries_enqueued, 5);
        assert_eq!(metrics.deliveries_dropped_overflow, 3);
        assert_eq!(conn.queue().len(), 2);
    }

    #[tokio::test]
    async fn publishes_through_port() {
        let (registry, router) = setup(8);
        let conn = registry.register(Viewer::Anonymous);
        registry.subscribe(&conn.id(), Topic::Poll(PollId::from(2)));

        let publisher: &dyn EventPublisher = &router;
        publisher.publish(PollEvent::Deleted(PollId::from(2))).await.unwrap();

        assert_eq!(
            drain(&conn),
            vec![ServerMessage::ResourceDeleted {
                resource_id: PollId::from(2)
            }]
        );
    }
}
