//! PollReader port - baseline reads for client resynchronization.
//!
//! After a gap in event delivery the client discards its local view and
//! reads the current state of every poll matching its filter through this
//! port instead of trying to replay what it missed.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PollId};
use crate::domain::poll::{PollView, ViewFilter};

/// Read access to current poll state, as seen by the session's viewer.
#[async_trait]
pub trait PollReader: Send + Sync {
    /// Every poll matching `filter`, newest first.
    async fn list_polls(&self, filter: &ViewFilter) -> Result<Vec<PollView>, DomainError>;

    /// A single poll, or `None` if it no longer exists.
    async fn get_poll(&self, id: PollId) -> Result<Option<PollView>, DomainError>;
}
