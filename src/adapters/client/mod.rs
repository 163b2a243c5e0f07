//! Client-side adapters.
//!
//! - `ws` - `tokio-tungstenite` connector for a remote realtime server
//! - `http` - `reqwest` baseline reader against the poll API
//! - `loopback` - in-process connector wired to a local router
//! - `memory` - in-memory poll store and reader

mod http;
mod loopback;
mod memory;
mod ws;

pub use http::{HttpPollReader, ReaderError};
pub use loopback::{LoopbackConnector, LoopbackTransport};
pub use memory::{InMemoryPollReader, InMemoryPollStore, NewPoll, PollUpdate};
pub use ws::{TungsteniteConnector, TungsteniteTransport};
