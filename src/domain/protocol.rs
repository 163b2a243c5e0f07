//! WebSocket message protocol shared by server and client.
//!
//! Every frame is a JSON envelope `{type, resource_id?, payload?}`:
//! - Client → Server: subscribe, unsubscribe, ping
//! - Server → Client: connected, resource events, subscription acks, pong
//!
//! Unknown `type` values deserialize to an `Unknown` variant on both sides
//! so newer peers can add message types without breaking older ones.

use serde::{Deserialize, Serialize};

use super::foundation::{ConnectionId, PollId};
use super::poll::{MetricDelta, PollEvent, PollSnapshot, Topic};

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake completed; sent once before anything else.
    Connected { payload: ConnectedPayload },

    ResourceCreated {
        resource_id: PollId,
        payload: PollSnapshot,
    },

    ResourceUpdated {
        resource_id: PollId,
        payload: PollSnapshot,
    },

    ResourceDeleted { resource_id: PollId },

    MetricChanged {
        resource_id: PollId,
        payload: MetricDelta,
    },

    /// Acknowledges a subscribe. No `resource_id` means the feed.
    Subscribed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_id: Option<PollId>,
    },

    /// Acknowledges an unsubscribe. No `resource_id` means the feed.
    Unsubscribed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_id: Option<PollId>,
    },

    /// Heartbeat response.
    Pong,

    #[serde(other)]
    Unknown,
}

/// Sent when a client completes the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    pub connection_id: ConnectionId,
    pub authenticated: bool,
    pub timestamp: String,
}

impl ServerMessage {
    /// Ack for a subscription change on `topic`.
    pub fn subscribed(topic: Topic) -> Self {
        ServerMessage::Subscribed {
            resource_id: topic.resource_id(),
        }
    }

    pub fn unsubscribed(topic: Topic) -> Self {
        ServerMessage::Unsubscribed {
            resource_id: topic.resource_id(),
        }
    }

    /// Wire `type` tag, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::ResourceCreated { .. } => "resource_created",
            ServerMessage::ResourceUpdated { .. } => "resource_updated",
            ServerMessage::ResourceDeleted { .. } => "resource_deleted",
            ServerMessage::MetricChanged { .. } => "metric_changed",
            ServerMessage::Subscribed { .. } => "subscribed",
            ServerMessage::Unsubscribed { .. } => "unsubscribed",
            ServerMessage::Pong => "pong",
            ServerMessage::Unknown => "unknown",
        }
    }

    /// The domain event this message carries, if any.
    pub fn into_event(self) -> Option<PollEvent> {
        match self {
            ServerMessage::ResourceCreated { payload, .. } => Some(PollEvent::Created(payload)),
            ServerMessage::ResourceUpdated { payload, .. } => Some(PollEvent::Updated(payload)),
            ServerMessage::ResourceDeleted { resource_id } => Some(PollEvent::Deleted(resource_id)),
            ServerMessage::MetricChanged {
                resource_id,
                payload,
            } => Some(PollEvent::MetricChanged {
                poll_id: resource_id,
                delta: payload,
            }),
            _ => None,
        }
    }
}

impl From<PollEvent> for ServerMessage {
    fn from(event: PollEvent) -> Self {
        match event {
            PollEvent::Created(snapshot) => ServerMessage::ResourceCreated {
                resource_id: snapshot.id,
                payload: snapshot,
            },
            PollEvent::Updated(snapshot) => ServerMessage::ResourceUpdated {
                resource_id: snapshot.id,
                payload: snapshot,
            },
            PollEvent::Deleted(resource_id) => ServerMessage::ResourceDeleted { resource_id },
            PollEvent::MetricChanged { poll_id, delta } => ServerMessage::MetricChanged {
                resource_id: poll_id,
                payload: delta,
            },
        }
    }
}

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving events for a poll, or for the feed when `resource_id`
    /// is absent.
    Subscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_id: Option<PollId>,
    },

    Unsubscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_id: Option<PollId>,
    },

    /// Heartbeat request; resets the server's idle timer.
    Ping,

    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn subscribe(topic: Topic) -> Self {
        ClientMessage::Subscribe {
            resource_id: topic.resource_id(),
        }
    }

    pub fn unsubscribe(topic: Topic) -> Self {
        ClientMessage::Unsubscribe {
            resource_id: topic.resource_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::poll::snapshot::fixtures;

    #[test]
    fn server_message_serializes_with_type_tag() {
        let msg = ServerMessage::ResourceDeleted {
            resource_id: PollId::from(7),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"resource_deleted""#));
        assert!(json.contains(r#""resource_id":7"#));
    }

    #[test]
    fn created_event_carries_snapshot_as_payload() {
        let snapshot = fixtures::poll(3, 1, true);
        let msg = ServerMessage::from(PollEvent::Created(snapshot.clone()));

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "resource_created");
        assert_eq!(value["resource_id"], 3);
        assert_eq!(value["payload"]["title"], snapshot.title);
        assert_eq!(msg.into_event(), Some(PollEvent::Created(snapshot)));
    }

    #[test]
    fn feed_ack_omits_resource_id() {
        let json = serde_json::to_string(&ServerMessage::subscribed(Topic::Feed)).unwrap();
        assert_eq!(json, r#"{"type":"subscribed"}"#);
    }

    #[test]
    fn pong_is_a_bare_type() {
        assert_eq!(
            serde_json::to_string(&ServerMessage::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
    }

    #[test]
    fn client_message_deserializes_subscribe() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "subscribe", "resource_id": 12}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                resource_id: Some(PollId::from(12))
            }
        );
    }

    #[test]
    fn client_subscribe_without_resource_targets_feed() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "subscribe"}"#).unwrap();
        assert_eq!(msg, ClientMessage::subscribe(Topic::Feed));
    }

    #[test]
    fn client_message_deserializes_ping_with_extra_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "ping", "payload": {"t": 1}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn unknown_types_are_tolerated() {
        let client: ClientMessage =
            serde_json::from_str(r#"{"type": "request.state"}"#).unwrap();
        assert_eq!(client, ClientMessage::Unknown);

        let server: ServerMessage =
            serde_json::from_str(r#"{"type": "typing", "resource_id": 1}"#).unwrap();
        assert_eq!(server, ServerMessage::Unknown);
    }

    #[test]
    fn malformed_resource_id_is_an_error() {
        let frame = r#"{"type": "subscribe", "resource_id": "seven"}"#;
        let result = serde_json::from_str::<ClientMessage>(frame);
        assert!(result.is_err());
    }
}
