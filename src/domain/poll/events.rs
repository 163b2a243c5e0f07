//! Domain events emitted by the mutation layer after each committed write.
//!
//! A [`PollEvent`] is immutable and fully materialized: created/updated
//! events carry the post-mutation snapshot, metric events carry the new
//! tally. The enum makes a mismatched kind/payload pair unrepresentable;
//! [`EventEnvelope`] is the loose `{kind, resource_id, payload}` shape used
//! at the HTTP ingress and is validated into a `PollEvent` there.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::{PollId, ValidationError};

use super::{MetricDelta, PollSnapshot};

/// Kind of state transition an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollEventKind {
    ResourceCreated,
    ResourceUpdated,
    ResourceDeleted,
    MetricChanged,
}

impl PollEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollEventKind::ResourceCreated => "resource_created",
            PollEventKind::ResourceUpdated => "resource_updated",
            PollEventKind::ResourceDeleted => "resource_deleted",
            PollEventKind::MetricChanged => "metric_changed",
        }
    }
}

impl fmt::Display for PollEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed state transition of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Created(PollSnapshot),
    Updated(PollSnapshot),
    Deleted(PollId),
    MetricChanged { poll_id: PollId, delta: MetricDelta },
}

impl PollEvent {
    pub fn kind(&self) -> PollEventKind {
        match self {
            PollEvent::Created(_) => PollEventKind::ResourceCreated,
            PollEvent::Updated(_) => PollEventKind::ResourceUpdated,
            PollEvent::Deleted(_) => PollEventKind::ResourceDeleted,
            PollEvent::MetricChanged { .. } => PollEventKind::MetricChanged,
        }
    }

    /// The poll this event is about.
    pub fn resource_id(&self) -> PollId {
        match self {
            PollEvent::Created(snapshot) | PollEvent::Updated(snapshot) => snapshot.id,
            PollEvent::Deleted(id) => *id,
            PollEvent::MetricChanged { poll_id, .. } => *poll_id,
        }
    }
}

/// Loose ingress shape of a domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub kind: PollEventKind,
    pub resource_id: PollId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
}

impl TryFrom<EventEnvelope> for PollEvent {
    type Error = ValidationError;

    fn try_from(envelope: EventEnvelope) -> Result<Self, Self::Error> {
        let EventEnvelope {
            kind,
            resource_id,
            payload,
        } = envelope;

        let event = match kind {
            PollEventKind::ResourceDeleted => PollEvent::Deleted(resource_id),
            PollEventKind::ResourceCreated | PollEventKind::ResourceUpdated => {
                let snapshot: PollSnapshot = parse_payload(payload)?;
                if snapshot.id != resource_id {
                    return Err(ValidationError::invalid_format(
                        "payload.id",
                        format!(
                            "snapshot id {} does not match resource_id {}",
                            snapshot.id, resource_id
                        ),
                    ));
                }
                if kind == PollEventKind::ResourceCreated {
                    PollEvent::Created(snapshot)
                } else {
                    PollEvent::Updated(snapshot)
                }
            }
            PollEventKind::MetricChanged => PollEvent::MetricChanged {
                poll_id: resource_id,
                delta: parse_payload(payload)?,
            },
        };

        Ok(event)
    }
}

impl From<&PollEvent> for EventEnvelope {
    fn from(event: &PollEvent) -> Self {
        let payload = match event {
            PollEvent::Created(snapshot) | PollEvent::Updated(snapshot) => {
                serde_json::to_value(snapshot).ok()
            }
            PollEvent::Deleted(_) => None,
            PollEvent::MetricChanged { delta, .. } => serde_json::to_value(delta).ok(),
        };
        Self {
            kind: event.kind(),
            resource_id: event.resource_id(),
            payload,
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: Option<JsonValue>,
) -> Result<T, ValidationError> {
    let payload = payload.ok_or_else(|| ValidationError::empty_field("payload"))?;
    serde_json::from_value(payload)
        .map_err(|e| ValidationError::invalid_format("payload", e.to_string()))
}
