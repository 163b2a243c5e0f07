//! Domain layer containing the realtime vocabulary.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps, errors, state machines)
//! - `poll` - Poll snapshots, metric deltas, domain events, topics
//! - `protocol` - WebSocket wire messages

pub mod foundation;
pub mod poll;
pub mod protocol;
