//! WebSocket adapters for real-time poll updates.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Mutation layer (poll API)                        │
//! │         POST /internal/events  │  EventPublisher::publish           │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         EventRouter                                 │
//! │   - Resolves recipients: poll subscribers ∪ feed (created)          │
//! │   - Enqueues one copy per connection, drop-oldest on overflow       │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     ConnectionRegistry                              │
//! │   Topic: feed         Topic: poll:7        Topic: poll:9            │
//! │   ├── conn-a          ├── conn-a           └── conn-c               │
//! │   └── conn-b          └── conn-c                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     ▼
//!                per-connection OutboundQueue → transport loop
//! ```
//!
//! # Components
//!
//! - [`queue`] - Bounded drop-oldest outbound queue
//! - [`index`] - Topic → connection sets
//! - [`connection`] - Per-connection state and lifecycle
//! - [`registry`] - Owner of connections; single writer of the index
//! - [`router`] - Fan-out of domain events
//! - [`handler`] - Axum upgrade handler and transport loop

pub mod connection;
pub mod handler;
pub mod index;
pub mod queue;
pub mod registry;
pub mod router;

pub use connection::{Connection, ConnectionState};
pub use handler::{
    resolve_viewer, run_connection, websocket_router, ws_handler, ConnectionSettings,
    DisconnectReason, WebSocketState,
};
pub use index::SubscriptionIndex;
pub use queue::{OutboundQueue, PushOutcome};
pub use registry::{ConnectionRegistry, SubscriptionChange};
pub use router::{EventRouter, RouteReport, RouterMetrics, RouterMetricsSnapshot};
