//! `tokio-tungstenite` implementation of the client transport ports.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};

use crate::domain::protocol::{ClientMessage, ServerMessage};
use crate::ports::{ClientTransport, Connector, TransportError};

/// Opens WebSocket connections to the realtime server.
pub struct TungsteniteConnector {
    url: String,
    token: Option<SecretString>,
}

impl TungsteniteConnector {
    /// `url` is the full endpoint, e.g. `ws://localhost:8080/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
        }
    }

    /// Present `token` at handshake so the connection is attributed to a user.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    fn endpoint(&self) -> String {
        match &self.token {
            Some(token) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", self.url, separator, token.expose_secret())
            }
            None => self.url.clone(),
        }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self) -> Result<Box<dyn ClientTransport>, TransportError> {
        let (stream, _response) = connect_async(self.endpoint())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(url = %self.url, "WebSocket client connected");
        Ok(Box::new(TungsteniteTransport { stream }))
    }
}

/// One open client WebSocket.
pub struct TungsteniteTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ClientTransport for TungsteniteTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        let json =
            serde_json::to_string(&message).map_err(|e| TransportError::Send(e.to_string()))?;
        self.stream
            .send(Message::Text(json))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage, TransportError>> {
        loop {
            let text = match self.stream.next().await? {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };

            match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => return Some(Ok(message)),
                Err(e) => {
                    tracing::debug!(error = %e, "Discarding malformed server frame");
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_without_token_is_unchanged() {
        let connector = TungsteniteConnector::new("ws://localhost:8080/ws");
        assert_eq!(connector.endpoint(), "ws://localhost:8080/ws");
    }

    #[test]
    fn endpoint_appends_token() {
        let connector = TungsteniteConnector::new("ws://localhost:8080/ws")
            .with_token(SecretString::new("abc".to_string()));
        assert_eq!(connector.endpoint(), "ws://localhost:8080/ws?token=abc");

        let connector = TungsteniteConnector::new("ws://h/ws?v=1")
            .with_token(SecretString::new("abc".to_string()));
        assert_eq!(connector.endpoint(), "ws://h/ws?v=1&token=abc");
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let connector = TungsteniteConnector::new("ws://127.0.0.1:1/ws");
        assert!(matches!(
            connector.connect().await,
            Err(TransportError::Connect(_))
        ));
    }
}
