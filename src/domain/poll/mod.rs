//! Poll vocabulary shared by the server broadcast layer and the client
//! reconciler: snapshots, metric deltas, domain events, subscription
//! topics and viewer-side listing state.

mod events;
pub(crate) mod snapshot;
mod topic;
mod view;

pub use events::{EventEnvelope, PollEvent, PollEventKind};
pub use snapshot::{LikeTally, MetricDelta, PollOptionSnapshot, PollSnapshot, VoteTally};
pub use topic::Topic;
pub use view::{PollView, ViewFilter, ViewerState};
