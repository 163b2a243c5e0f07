//! Client session: keeps one connection alive and a [`LocalView`] in sync.
//!
//! On every (re)connect the session re-issues `subscribe` for each interest
//! (the server keeps nothing across connections), reads a fresh baseline
//! and replaces the view. While connected it pings on an interval and
//! treats a silent server as dead after `pong_timeout`. Failures go through
//! the [`ReconnectMachine`]; when it gives up, [`ClientSession::run`]
//! returns [`TransportError::RetriesExhausted`] and
//! [`ClientSession::resume`] re-arms it.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::domain::foundation::{PollId, Viewer};
use crate::domain::poll::{PollView, Topic, ViewFilter};
use crate::domain::protocol::{ClientMessage, ServerMessage};
use crate::ports::{ClientTransport, Connector, PollReader, TransportError};

use super::clock::Clock;
use super::reconciler::{LocalView, ViewChange};
use super::reconnect::{NextStep, ReconnectMachine, ReconnectPolicy, ReconnectState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub policy: ReconnectPolicy,
    pub ping_interval: Duration,
    /// Give up on a connection when nothing arrives for this long.
    pub pong_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            ping_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

/// Observable progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: ReconnectState,
    /// Bumped whenever the local view changes.
    pub revision: u64,
    /// Completed baseline reads.
    pub baselines: u64,
}

#[derive(Debug)]
enum Command {
    Subscribe(Topic),
    Unsubscribe(Topic),
    Shutdown,
}

/// Cloneable control surface for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: Arc<RwLock<LocalView>>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Start watching `topic`. Takes effect immediately when connected and
    /// survives reconnects.
    pub fn subscribe(&self, topic: Topic) {
        let _ = self.commands.send(Command::Subscribe(topic));
    }

    pub fn unsubscribe(&self, topic: Topic) {
        let _ = self.commands.send(Command::Unsubscribe(topic));
    }

    /// Close the connection and make `run` return `Ok(())`.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Copy of the current local view.
    pub fn view(&self) -> LocalView {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn poll(&self, id: PollId) -> Option<PollView> {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Wait until `predicate` holds for the session status.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> SessionStatus {
        let mut status = self.status.clone();
        if let Ok(current) = status.wait_for(|s| predicate(s)).await {
            return *current;
        }
        // Session gone: report where it stopped.
        *self.status.borrow()
    }
}

/// What woke the connected loop.
enum Wake {
    Inbound(Option<Result<ServerMessage, TransportError>>),
    PingDue,
    Silent,
    Command(Option<Command>),
}

pub struct ClientSession<C: Clock> {
    connector: Arc<dyn Connector>,
    reader: Arc<dyn PollReader>,
    clock: Arc<C>,
    machine: ReconnectMachine<C>,
    settings: SessionSettings,
    interests: HashSet<Topic>,
    /// Topics subscribed on the current connection.
    subscribed: HashSet<Topic>,
    /// Polls to read again once their subscription is acknowledged.
    refreshing: HashSet<PollId>,
    view: Arc<RwLock<LocalView>>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SessionStatus>,
    shutting_down: bool,
}

impl<C: Clock + 'static> ClientSession<C> {
    /// A session listing polls matching `filter` and watching the feed.
    pub fn new(
        connector: Arc<dyn Connector>,
        reader: Arc<dyn PollReader>,
        clock: Arc<C>,
        settings: SessionSettings,
        filter: ViewFilter,
        viewer: Viewer,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SessionStatus {
            state: ReconnectState::Disconnected,
            revision: 0,
            baselines: 0,
        });

        Self {
            connector,
            reader,
            machine: ReconnectMachine::new(settings.policy, clock.clone()),
            clock,
            settings,
            interests: HashSet::from([Topic::Feed]),
            subscribed: HashSet::new(),
            refreshing: HashSet::new(),
            view: Arc::new(RwLock::new(LocalView::new(filter, viewer))),
            commands_tx,
            commands_rx,
            status,
            shutting_down: false,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands_tx.clone(),
            view: self.view.clone(),
            status: self.status.subscribe(),
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.machine.state()
    }

    /// Re-arm automatic reconnection after exhaustion.
    pub fn resume(&mut self) {
        self.machine.resume();
        self.shutting_down = false;
        self.publish_status(false);
    }

    /// Drive the session until shutdown or until reconnection gives up.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        loop {
            if self.shutting_down {
                return Ok(());
            }

            if self.machine.begin_attempt().is_err() {
                return Err(TransportError::RetriesExhausted {
                    attempts: self.machine.attempts(),
                });
            }
            self.publish_status(false);

            let failure = match self.connector.connect().await {
                Ok(transport) => match self.machine.on_connected() {
                    Ok(reconnected) => {
                        tracing::info!(reconnected, "Realtime connection established");
                        self.publish_status(false);
                        match self.connected(transport).await {
                            Ok(()) => return Ok(()),
                            Err(e) => e,
                        }
                    }
                    Err(e) => TransportError::Connect(e.to_string()),
                },
                Err(e) => e,
            };

            tracing::warn!(error = %failure, "Realtime connection lost");
            self.view_mut().mark_stale();

            match self.machine.on_disconnected() {
                NextStep::RetryIn(delay) => {
                    self.publish_status(true);
                    tracing::debug!(
                        delay_ms = delay.as_millis() as u64,
                        attempt = self.machine.attempts(),
                        "Reconnecting after backoff"
                    );
                    self.back_off(delay).await;
                }
                NextStep::GiveUp { attempts } => {
                    self.publish_status(true);
                    tracing::error!(attempts, "Giving up on realtime connection");
                    return Err(TransportError::RetriesExhausted { attempts });
                }
            }
        }
    }

    /// Wait out `delay`, still accepting interest changes.
    async fn back_off(&mut self, delay: Duration) {
        let clock = self.clock.clone();
        let sleep = clock.sleep(delay);
        tokio::pin!(sleep);

        loop {
            let command = tokio::select! {
                _ = &mut sleep => return,
                command = self.commands_rx.recv() => command,
            };
            match command {
                Some(Command::Subscribe(topic)) => self.add_interest(topic),
                Some(Command::Unsubscribe(topic)) => self.remove_interest(topic),
                Some(Command::Shutdown) | None => {
                    self.shutting_down = true;
                    return;
                }
            }
        }
    }

    /// Serve one connection. `Ok` means shutdown was requested.
    async fn connected(
        &mut self,
        mut transport: Box<dyn ClientTransport>,
    ) -> Result<(), TransportError> {
        let result = self.serve(transport.as_mut()).await;
        transport.close().await;
        result
    }

    async fn serve(&mut self, transport: &mut dyn ClientTransport) -> Result<(), TransportError> {
        self.subscribed.clear();
        self.refreshing.clear();

        // The baseline may only be read once the server routes to us.
        let pending = self.sync_subscriptions(transport, false).await?;
        let early = self.await_acks(transport, pending).await?;
        self.resync().await?;
        for message in early {
            self.on_message(transport, message).await?;
        }
        self.sync_subscriptions(transport, true).await?;

        let mut ping = tokio::time::interval_at(
            Instant::now() + self.settings.ping_interval,
            self.settings.ping_interval,
        );
        let mut last_heard = Instant::now();

        loop {
            let silence_deadline = last_heard + self.settings.pong_timeout;
            let wake = tokio::select! {
                inbound = transport.recv() => Wake::Inbound(inbound),
                _ = ping.tick() => Wake::PingDue,
                _ = tokio::time::sleep_until(silence_deadline) => Wake::Silent,
                command = self.commands_rx.recv() => Wake::Command(command),
            };

            match wake {
                Wake::Inbound(None) => return Err(TransportError::Closed),
                Wake::Inbound(Some(Err(e))) => return Err(e),
                Wake::Inbound(Some(Ok(message))) => {
                    last_heard = Instant::now();
                    self.on_message(transport, message).await?;
                }
                Wake::PingDue => transport.send(ClientMessage::Ping).await?,
                Wake::Silent => return Err(TransportError::Timeout(self.settings.pong_timeout)),
                Wake::Command(Some(Command::Subscribe(topic))) => {
                    self.add_interest(topic);
                    self.sync_subscriptions(transport, true).await?;
                }
                Wake::Command(Some(Command::Unsubscribe(topic))) => {
                    self.remove_interest(topic);
                    self.sync_subscriptions(transport, true).await?;
                }
                Wake::Command(Some(Command::Shutdown)) | Wake::Command(None) => {
                    self.shutting_down = true;
                    return Ok(());
                }
            }
        }
    }

    /// Bring server-side subscriptions in line with the interests plus every
    /// poll the view shows. Returns the topics newly subscribed.
    ///
    /// With `refresh`, each newly watched poll is read again once its
    /// `subscribed` ack arrives, covering changes made before the server
    /// started routing it to us.
    async fn sync_subscriptions(
        &mut self,
        transport: &mut dyn ClientTransport,
        refresh: bool,
    ) -> Result<HashSet<Topic>, TransportError> {
        let mut wanted = self.interests.clone();
        let watched = self
            .view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .watched();
        wanted.extend(watched.into_iter().map(Topic::Poll));

        let mut added: Vec<Topic> = wanted.difference(&self.subscribed).copied().collect();
        added.sort_by_key(|t| t.resource_id().map(|id| id.value()));
        for topic in &added {
            transport.send(ClientMessage::subscribe(*topic)).await?;
            self.subscribed.insert(*topic);
            if let (true, Topic::Poll(id)) = (refresh, topic) {
                self.refreshing.insert(*id);
            }
        }

        let dropped: Vec<Topic> = self.subscribed.difference(&wanted).copied().collect();
        for topic in dropped {
            transport.send(ClientMessage::unsubscribe(topic)).await?;
            self.subscribed.remove(&topic);
            if let Topic::Poll(id) = topic {
                self.refreshing.remove(&id);
            }
        }

        Ok(added.into_iter().collect())
    }

    /// Read until every topic in `pending` is acknowledged. Anything else
    /// that arrives meanwhile is returned in order.
    async fn await_acks(
        &mut self,
        transport: &mut dyn ClientTransport,
        mut pending: HashSet<Topic>,
    ) -> Result<Vec<ServerMessage>, TransportError> {
        let deadline = Instant::now() + self.settings.pong_timeout;
        let mut early = Vec::new();

        while !pending.is_empty() {
            let inbound = tokio::select! {
                inbound = transport.recv() => inbound,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(TransportError::Timeout(self.settings.pong_timeout));
                }
            };
            match inbound {
                None => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(e),
                Some(Ok(ServerMessage::Subscribed { resource_id })) => {
                    pending.remove(&Topic::from_resource(resource_id));
                }
                Some(Ok(message)) => early.push(message),
            }
        }
        Ok(early)
    }

    /// Replace the local view with a fresh read.
    async fn resync(&mut self) -> Result<(), TransportError> {
        let filter = self.view.read().unwrap_or_else(PoisonError::into_inner).filter();
        let listing = self
            .reader
            .list_polls(&filter)
            .await
            .map_err(|e| TransportError::Baseline(e.to_string()))?;

        let listed: HashSet<PollId> = listing.iter().map(|p| p.snapshot.id).collect();
        let mut pinned = Vec::new();
        for topic in &self.interests {
            let Topic::Poll(id) = topic else { continue };
            if listed.contains(id) {
                continue;
            }
            if let Some(poll) = self
                .reader
                .get_poll(*id)
                .await
                .map_err(|e| TransportError::Baseline(e.to_string()))?
            {
                pinned.push(poll);
            }
        }

        self.view_mut().replace_baseline(listing, pinned);
        self.status.send_modify(|s| s.baselines += 1);
        self.publish_status(true);
        tracing::debug!(polls = listed.len(), "Local view resynchronized");
        Ok(())
    }

    async fn refresh_poll(&mut self, id: PollId) -> Result<(), TransportError> {
        let fresh = self
            .reader
            .get_poll(id)
            .await
            .map_err(|e| TransportError::Baseline(e.to_string()))?;
        if self.view_mut().refresh(id, fresh) != ViewChange::Ignored {
            self.publish_status(true);
        }
        Ok(())
    }

    async fn on_message(
        &mut self,
        transport: &mut dyn ClientTransport,
        message: ServerMessage,
    ) -> Result<(), TransportError> {
        if let ServerMessage::Subscribed {
            resource_id: Some(id),
        } = &message
        {
            if self.refreshing.remove(id) {
                self.refresh_poll(*id).await?;
                self.sync_subscriptions(transport, true).await?;
            }
            return Ok(());
        }

        match message.into_event() {
            Some(event) => {
                let change = self.view_mut().apply(&event);
                if change != ViewChange::Ignored {
                    self.publish_status(true);
                    self.sync_subscriptions(transport, true).await?;
                }
            }
            None => tracing::trace!("Control message received"),
        }
        Ok(())
    }

    fn add_interest(&mut self, topic: Topic) {
        self.interests.insert(topic);
        if let Topic::Poll(id) = topic {
            self.view_mut().pin(id);
        }
    }

    fn remove_interest(&mut self, topic: Topic) {
        self.interests.remove(&topic);
        if let Topic::Poll(id) = topic {
            self.view_mut().unpin(id);
        }
        self.publish_status(true);
    }

    fn view_mut(&self) -> RwLockWriteGuard<'_, LocalView> {
        self.view.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_status(&self, view_changed: bool) {
        let state = self.machine.state();
        self.status.send_modify(|s| {
            s.state = state;
            if view_changed {
                s.revision += 1;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::adapters::client::{
        InMemoryPollReader, InMemoryPollStore, LoopbackConnector, NewPoll, PollUpdate,
    };
    use crate::adapters::websocket::{ConnectionRegistry, EventRouter};
    use crate::client::clock::ManualClock;
    use crate::domain::foundation::{DomainError, UserId};

    type Mutation = Box<dyn FnOnce() + Send>;

    /// Reader that commits a mutation right after serving a read, the way a
    /// concurrent writer would between the read and the next event.
    struct RacingReader {
        inner: InMemoryPollReader,
        after_list: Mutex<Option<Mutation>>,
        after_get: Mutex<Option<Mutation>>,
    }

    impl RacingReader {
        fn new(inner: InMemoryPollReader) -> Self {
            Self {
                inner,
                after_list: Mutex::new(None),
                after_get: Mutex::new(None),
            }
        }

        fn after_list(self, mutation: impl FnOnce() + Send + 'static) -> Self {
            *self.after_list.lock().unwrap() = Some(Box::new(mutation));
            self
        }

        fn after_get(self, mutation: impl FnOnce() + Send + 'static) -> Self {
            *self.after_get.lock().unwrap() = Some(Box::new(mutation));
            self
        }
    }

    #[async_trait]
    impl PollReader for RacingReader {
        async fn list_polls(&self, filter: &ViewFilter) -> Result<Vec<PollView>, DomainError> {
            let polls = self.inner.list_polls(filter).await;
            if let Some(mutation) = self.after_list.lock().unwrap().take() {
                mutation();
            }
            polls
        }

        async fn get_poll(&self, id: PollId) -> Result<Option<PollView>, DomainError> {
            let poll = self.inner.get_poll(id).await;
            if let Some(mutation) = self.after_get.lock().unwrap().take() {
                mutation();
            }
            poll
        }
    }

    struct Harness {
        router: Arc<EventRouter>,
        store: Arc<InMemoryPollStore>,
        connector: Arc<LoopbackConnector>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            let router = Arc::new(EventRouter::new(Arc::new(ConnectionRegistry::new(64))));
            Self {
                connector: Arc::new(LoopbackConnector::new(router.clone(), Viewer::Anonymous)),
                router,
                store: Arc::new(InMemoryPollStore::new()),
                clock: Arc::new(ManualClock::new()),
            }
        }

        fn reader(&self) -> InMemoryPollReader {
            InMemoryPollReader::new(self.store.clone(), Viewer::Anonymous)
        }

        fn session(&self) -> ClientSession<ManualClock> {
            self.session_reading(Arc::new(self.reader()))
        }

        fn session_reading(&self, reader: Arc<dyn PollReader>) -> ClientSession<ManualClock> {
            ClientSession::new(
                self.connector.clone(),
                reader,
                self.clock.clone(),
                SessionSettings::default(),
                ViewFilter::public(),
                Viewer::Anonymous,
            )
        }

        fn create(&self, title: &str) -> PollId {
            create_and_route(&self.store, &self.router, title)
        }

        async fn until_subscribed(&self, topic: Topic) {
            for _ in 0..1000 {
                if !self.router.registry().subscribers_of(topic).is_empty() {
                    return;
                }
                tokio::task::yield_now().await;
            }
            panic!("{} never got a subscriber", topic);
        }
    }

    fn create_and_route(store: &InMemoryPollStore, router: &EventRouter, title: &str) -> PollId {
        let event = store
            .create_poll(UserId::from(1), "ann", NewPoll::new(title, &["Yes", "No"]))
            .unwrap();
        let id = event.resource_id();
        router.route(event);
        id
    }

    async fn until(what: &str, mut condition: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never held: {}", what);
    }

    #[tokio::test]
    async fn baseline_then_live_feed() {
        let harness = Harness::new();
        let existing = harness.create("Existing poll");

        let mut session = harness.session();
        let handle = session.handle();
        let task = tokio::spawn(async move { session.run().await });

        let status = handle.wait_for(|s| s.baselines >= 1).await;
        assert_eq!(status.state, ReconnectState::Connected);
        assert!(!handle.view().is_stale());
        assert_eq!(handle.view().listing_ids(), &[existing]);

        harness.until_subscribed(Topic::Feed).await;
        let revision = handle.status().revision;
        let fresh = harness.create("Fresh poll");
        handle.wait_for(|s| s.revision > revision).await;

        assert_eq!(handle.view().listing_ids(), &[fresh, existing]);

        handle.shutdown();
        assert_eq!(task.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn subscribe_pins_poll_outside_listing() {
        let harness = Harness::new();
        let id = harness.create("Closed soon");
        harness
            .store
            .update_poll(
                id,
                UserId::from(1),
                crate::adapters::client::PollUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut session = harness.session();
        let handle = session.handle();
        let task = tokio::spawn(async move { session.run().await });
        handle.wait_for(|s| s.baselines >= 1).await;
        assert!(handle.poll(id).is_none());

        let revision = handle.status().revision;
        handle.subscribe(Topic::Poll(id));
        handle.wait_for(|s| s.revision > revision).await;

        let view = handle.poll(id).unwrap();
        assert!(!view.snapshot.is_active);
        assert!(handle.view().listing_ids().is_empty());
        harness.until_subscribed(Topic::Poll(id)).await;

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let harness = Harness::new();
        harness.connector.set_online(false);

        let mut session = harness.session();
        let result = session.run().await;

        assert_eq!(result, Err(TransportError::RetriesExhausted { attempts: 5 }));
        assert_eq!(session.state(), ReconnectState::Exhausted);
        assert_eq!(
            harness.clock.sleeps(),
            [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
        );
        assert!(session.handle().view().is_stale());
    }

    #[tokio::test]
    async fn resume_after_exhaustion_connects() {
        let harness = Harness::new();
        harness.connector.set_online(false);
        let mut session = harness.session();
        assert!(session.run().await.is_err());

        harness.connector.set_online(true);
        session.resume();
        assert_eq!(session.state(), ReconnectState::Disconnected);

        let handle = session.handle();
        let task = tokio::spawn(async move { session.run().await });
        let status = handle.wait_for(|s| s.baselines >= 1).await;
        assert_eq!(status.state, ReconnectState::Connected);

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn lost_connection_resyncs_on_reconnect() {
        let harness = Harness::new();
        let id = harness.create("Lunch today?");

        let mut session = harness.session();
        let handle = session.handle();
        let task = tokio::spawn(async move { session.run().await });
        handle.wait_for(|s| s.baselines >= 1).await;

        harness.connector.sever();
        harness.store.toggle_like(id, UserId::from(9)).unwrap();

        let status = handle.wait_for(|s| s.baselines >= 2).await;
        assert_eq!(status.state, ReconnectState::Connected);
        assert_eq!(handle.poll(id).unwrap().snapshot.total_likes, 1);
        assert_eq!(harness.clock.sleeps(), vec![Duration::from_secs(1)]);

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn poll_created_right_after_baseline_read_is_delivered() {
        let harness = Harness::new();
        harness.create("Existing poll");
        let (store, router) = (harness.store.clone(), harness.router.clone());
        let reader = RacingReader::new(harness.reader()).after_list(move || {
            create_and_route(&store, &router, "Created during baseline");
        });

        let mut session = harness.session_reading(Arc::new(reader));
        let handle = session.handle();
        let task = tokio::spawn(async move { session.run().await });

        handle.wait_for(|s| s.baselines >= 1).await;
        until("both polls listed", || handle.view().listing_ids().len() == 2).await;
        assert_eq!(
            handle.view().listing_ids(),
            &[PollId::from(2), PollId::from(1)]
        );
        assert_eq!(harness.router.metrics().snapshot().deliveries_enqueued, 1);

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn listed_polls_follow_metrics_and_deactivation() {
        let harness = Harness::new();
        let id = harness.create("Lunch today?");

        let mut session = harness.session();
        let handle = session.handle();
        let task = tokio::spawn(async move { session.run().await });
        handle.wait_for(|s| s.baselines >= 1).await;
        assert_eq!(handle.view().listing_ids(), &[id]);
        harness.until_subscribed(Topic::Poll(id)).await;

        harness
            .router
            .route(harness.store.toggle_like(id, UserId::from(9)).unwrap());
        until("like counted", || {
            handle.poll(id).map(|p| p.snapshot.total_likes) == Some(1)
        })
        .await;

        let closed = harness
            .store
            .update_poll(
                id,
                UserId::from(1),
                PollUpdate {
                    is_active: Some(false),
                    ..PollUpdate::default()
                },
            )
            .unwrap();
        harness.router.route(closed);
        until("closed poll unlisted", || handle.view().listing_ids().is_empty()).await;
        assert!(handle.poll(id).is_none());
        until("poll unsubscribed", || {
            harness.router.registry().subscribers_of(Topic::Poll(id)).is_empty()
        })
        .await;

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn poll_entering_listing_is_reread_after_subscribing() {
        let harness = Harness::new();
        let (store, router) = (harness.store.clone(), harness.router.clone());
        let reader = RacingReader::new(harness.reader()).after_get(move || {
            router.route(store.toggle_like(PollId::from(1), UserId::from(9)).unwrap());
        });

        let mut session = harness.session_reading(Arc::new(reader));
        let handle = session.handle();
        let task = tokio::spawn(async move { session.run().await });
        handle.wait_for(|s| s.baselines >= 1).await;
        harness.until_subscribed(Topic::Feed).await;

        // Liked once before the re-read and once while it is served.
        let id = harness.create("Fresh poll");
        harness
            .router
            .route(harness.store.toggle_like(id, UserId::from(8)).unwrap());

        until("both likes seen", || {
            handle.poll(id).map(|p| p.snapshot.total_likes) == Some(2)
        })
        .await;
        assert_eq!(handle.view().listing_ids(), &[id]);

        handle.shutdown();
        task.await.unwrap().unwrap();
    }
}
