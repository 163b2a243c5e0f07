//! WebSocket upgrade handler and per-connection transport loop.
//!
//! Handles the HTTP → WebSocket upgrade and the connection lifecycle:
//! 1. Resolve the optional `?token=` to a viewer
//! 2. Upgrade to WebSocket and register the connection
//! 3. Send `connected`, then drain the outbound queue and serve inbound
//!    subscribe/unsubscribe/ping frames until the transport fails, the
//!    peer closes, or the idle timeout expires
//! 4. Unregister, which removes every subscription

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::domain::foundation::{AuthError, ConnectionId, Timestamp, Viewer};
use crate::domain::poll::Topic;
use crate::domain::protocol::{ClientMessage, ConnectedPayload, ServerMessage};
use crate::ports::TokenVerifier;

use super::connection::{Connection, ConnectionState};
use super::registry::SubscriptionChange;
use super::router::EventRouter;

/// Timeouts applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Close the connection when no `ping` arrives within this window.
    pub idle_timeout: Duration,
    /// Upper bound for a single frame write.
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub router: Arc<EventRouter>,
    /// `None` means every connection is anonymous.
    pub verifier: Option<Arc<dyn TokenVerifier>>,
    pub settings: ConnectionSettings,
}

impl WebSocketState {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self {
            router,
            verifier: None,
            settings: ConnectionSettings::default(),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectReason {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("no ping within {0:?}")]
    IdleTimeout(Duration),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The registry closed the connection from outside.
    #[error("connection evicted")]
    Evicted,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws?token=<jwt>`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<WebSocketState>,
) -> Response {
    let viewer = match resolve_viewer(state.verifier.as_deref(), query.token.as_deref()).await {
        Ok(viewer) => viewer,
        Err(err) => {
            tracing::debug!(error = %err, "Rejected WebSocket handshake");
            let status = if err.requires_reauthentication() {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            return (status, err.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        run_connection(sink, stream, viewer, &state.router, state.settings).await;
    })
}

/// Map an optional handshake token to a viewer.
///
/// Missing or blank tokens are anonymous. Without a verifier every token is
/// ignored.
pub async fn resolve_viewer(
    verifier: Option<&dyn TokenVerifier>,
    token: Option<&str>,
) -> Result<Viewer, AuthError> {
    let (Some(verifier), Some(token)) = (verifier, token.map(str::trim)) else {
        return Ok(Viewer::Anonymous);
    };
    if token.is_empty() {
        return Ok(Viewer::Anonymous);
    }
    verifier.verify(token).await.map(Viewer::User)
}

/// Serve one established connection until it ends.
///
/// Generic over the transport halves so the loop can be driven by in-memory
/// channels as well as an axum `WebSocket`.
pub async fn run_connection<S, R, E>(
    mut sink: S,
    mut stream: R,
    viewer: Viewer,
    router: &EventRouter,
    settings: ConnectionSettings,
) -> DisconnectReason
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let registry = router.registry();
    let connection = registry.register(viewer);
    let id = connection.id();

    tracing::info!(
        connection_id = %id,
        authenticated = viewer.is_authenticated(),
        "WebSocket connected"
    );

    let connected = ServerMessage::Connected {
        payload: ConnectedPayload {
            connection_id: id,
            authenticated: viewer.is_authenticated(),
            timestamp: Timestamp::now().to_rfc3339(),
        },
    };

    let reason = match send_message(&mut sink, &connected, settings.write_timeout).await {
        Ok(()) => serve(&mut sink, &mut stream, &connection, router, settings).await,
        Err(reason) => reason,
    };

    connection.transition(ConnectionState::Draining);
    registry.unregister(&id);
    let _ = tokio::time::timeout(settings.write_timeout, sink.close()).await;

    tracing::info!(connection_id = %id, reason = %reason, "WebSocket disconnected");
    reason
}

async fn serve<S, R, E>(
    sink: &mut S,
    stream: &mut R,
    connection: &Connection,
    router: &EventRouter,
    settings: ConnectionSettings,
) -> DisconnectReason
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let id = connection.id();
    let idle = tokio::time::sleep(settings.idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            outbound = connection.queue().recv() => {
                let Some(message) = outbound else {
                    return DisconnectReason::Evicted;
                };
                if let Err(reason) = send_message(sink, &message, settings.write_timeout).await {
                    return reason;
                }
            }

            inbound = stream.next() => {
                let text = match inbound {
                    None | Some(Ok(Message::Close(_))) => return DisconnectReason::PeerClosed,
                    Some(Err(e)) => return DisconnectReason::ReceiveFailed(e.to_string()),
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!(connection_id = %id, "Ignoring binary frame");
                        continue;
                    }
                    // Protocol-level ping/pong is answered by the transport.
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                };

                let message = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        router.metrics().record_malformed_frame();
                        tracing::debug!(
                            connection_id = %id,
                            error = %e,
                            "Discarding malformed frame"
                        );
                        continue;
                    }
                };

                if message == ClientMessage::Ping {
                    idle.as_mut().reset(Instant::now() + settings.idle_timeout);
                }

                if let Some(reply) = handle_client_message(router, &id, message) {
                    if let Err(reason) = send_message(sink, &reply, settings.write_timeout).await {
                        return reason;
                    }
                }
            }

            _ = &mut idle => return DisconnectReason::IdleTimeout(settings.idle_timeout),
        }
    }
}

/// Apply one inbound message and return the direct reply, if any.
fn handle_client_message(
    router: &EventRouter,
    id: &ConnectionId,
    message: ClientMessage,
) -> Option<ServerMessage> {
    let registry = router.registry();
    match message {
        ClientMessage::Subscribe { resource_id } => {
            let topic = Topic::from_resource(resource_id);
            match registry.subscribe(id, topic) {
                SubscriptionChange::Inactive => None,
                _ => Some(ServerMessage::subscribed(topic)),
            }
        }
        ClientMessage::Unsubscribe { resource_id } => {
            let topic = Topic::from_resource(resource_id);
            match registry.unsubscribe(id, topic) {
                SubscriptionChange::Inactive => None,
                _ => Some(ServerMessage::unsubscribed(topic)),
            }
        }
        ClientMessage::Ping => Some(ServerMessage::Pong),
        ClientMessage::Unknown => {
            tracing::trace!(connection_id = %id, "Ignoring unknown message type");
            None
        }
    }
}

/// Serialize and write one message within `write_timeout`.
async fn send_message<S>(
    sink: &mut S,
    message: &ServerMessage,
    write_timeout: Duration,
) -> Result<(), DisconnectReason>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = serde_json::to_string(message)
        .map_err(|e| DisconnectReason::WriteFailed(e.to_string()))?;

    match tokio::time::timeout(write_timeout, sink.send(Message::Text(json))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DisconnectReason::WriteFailed(e.to_string())),
        Err(_) => Err(DisconnectReason::WriteTimeout(write_timeout)),
    }
}

/// Create axum router for the WebSocket endpoint.
pub fn websocket_router() -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new().route("/ws", get(ws_handler))
}
