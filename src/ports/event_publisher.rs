//! EventPublisher port - the seam between the mutation layer and the
//! realtime core.
//!
//! The poll/vote/like persistence layer calls `publish` once per committed
//! write with a fully materialized [`PollEvent`]. The realtime core never
//! touches the store itself.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::poll::PollEvent;

/// Port for handing committed domain events to the broadcast layer.
///
/// Implementations must:
/// - Never block on slow subscribers (overload is absorbed by dropping)
/// - Preserve emission order per poll for every recipient
/// - Not surface per-connection transport failures to the caller
///
/// # Example
///
/// ```ignore
/// let snapshot = store.update_poll(id, update).await?;
/// publisher.publish(PollEvent::Updated(snapshot)).await?;
/// ```
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: PollEvent) -> Result<(), DomainError>;

    /// Publish several events in order.
    async fn publish_all(&self, events: Vec<PollEvent>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
