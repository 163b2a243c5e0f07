//! Ports - Interfaces for external collaborators.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the realtime core and the outside world. Adapters implement these ports.
//!
//! ## Server side
//!
//! - `EventPublisher` - Mutation layer hands committed events to the core
//! - `TokenVerifier` - Resolves handshake tokens to user ids
//!
//! ## Client side
//!
//! - `Connector` / `ClientTransport` - Establishes and carries connections
//! - `PollReader` - Baseline refetch after a reconnect gap

mod connector;
mod event_publisher;
mod poll_reader;
mod token_verifier;

pub use connector::{ClientTransport, Connector, TransportError};
pub use event_publisher::EventPublisher;
pub use poll_reader::PollReader;
pub use token_verifier::TokenVerifier;
