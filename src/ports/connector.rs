//! Client transport ports.
//!
//! The client session drives its reconnect state machine against a
//! [`Connector`]; each successful connect yields a [`ClientTransport`]
//! carrying protocol messages in both directions.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::protocol::{ClientMessage, ServerMessage};

/// Errors surfaced by client transports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("No traffic from server within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Connection closed")]
    Closed,

    /// Connected, but the baseline refetch failed.
    #[error("Baseline refetch failed: {0}")]
    Baseline(String),

    /// Terminal: automatic reconnection gave up.
    #[error("Could not connect after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// One established client connection.
///
/// `recv` must be cancel-safe: the session polls it inside `select!`.
#[async_trait]
pub trait ClientTransport: Send {
    async fn send(&mut self, message: ClientMessage) -> Result<(), TransportError>;

    /// Next inbound message; `None` once the server closed the stream.
    async fn recv(&mut self) -> Option<Result<ServerMessage, TransportError>>;

    /// Close the transport. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens client transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ClientTransport>, TransportError>;
}
