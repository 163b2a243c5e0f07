//! In-process client transport.
//!
//! [`LoopbackConnector`] runs the server's connection loop on a spawned task
//! and wires it to the client over unbounded channels, so a
//! [`ClientSession`](crate::client::ClientSession) can be exercised against
//! a real registry and router without sockets. `sever` and `set_online`
//! simulate network loss.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::channel::mpsc;
use futures::StreamExt;

use crate::adapters::websocket::{run_connection, ConnectionSettings, EventRouter};
use crate::domain::foundation::Viewer;
use crate::domain::protocol::{ClientMessage, ServerMessage};
use crate::ports::{ClientTransport, Connector, TransportError};

type Uplink = mpsc::UnboundedSender<Result<Message, String>>;

pub struct LoopbackConnector {
    router: Arc<EventRouter>,
    viewer: Viewer,
    settings: ConnectionSettings,
    online: AtomicBool,
    links: Mutex<Vec<Uplink>>,
}

impl LoopbackConnector {
    pub fn new(router: Arc<EventRouter>, viewer: Viewer) -> Self {
        Self {
            router,
            viewer,
            settings: ConnectionSettings::default(),
            online: AtomicBool::new(true),
            links: Mutex::new(Vec::new()),
        }
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// While offline every `connect` fails.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Drop every open link as if the network went away.
    pub fn sever(&self) {
        let links: Vec<Uplink> = std::mem::take(&mut *self.lock_links());
        for link in &links {
            let _ = link.unbounded_send(Ok(Message::Close(None)));
            link.close_channel();
        }
        tracing::debug!(links = links.len(), "Loopback links severed");
    }

    fn lock_links(&self) -> std::sync::MutexGuard<'_, Vec<Uplink>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self) -> Result<Box<dyn ClientTransport>, TransportError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("server unreachable".to_string()));
        }

        let (uplink, server_inbound) = mpsc::unbounded::<Result<Message, String>>();
        let (server_outbound, downlink) = mpsc::unbounded::<Message>();

        let router = self.router.clone();
        let viewer = self.viewer;
        let settings = self.settings;
        tokio::spawn(async move {
            run_connection(server_outbound, server_inbound, viewer, &router, settings).await;
        });

        self.lock_links().push(uplink.clone());
        Ok(Box::new(LoopbackTransport { uplink, downlink }))
    }
}

/// Client half of one loopback link.
pub struct LoopbackTransport {
    uplink: Uplink,
    downlink: mpsc::UnboundedReceiver<Message>,
}

#[async_trait]
impl ClientTransport for LoopbackTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        let json =
            serde_json::to_string(&message).map_err(|e| TransportError::Send(e.to_string()))?;
        self.uplink
            .unbounded_send(Ok(Message::Text(json)))
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage, TransportError>> {
        loop {
            let text = match self.downlink.next().await? {
                Message::Text(text) => text,
                Message::Close(_) => return None,
                _ => continue,
            };
            match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => return Some(Ok(message)),
                Err(e) => tracing::debug!(error = %e, "Discarding malformed server frame"),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.uplink.unbounded_send(Ok(Message::Close(None)));
        self.uplink.close_channel();
    }
}
