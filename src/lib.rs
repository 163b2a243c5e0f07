//! QuickPoll realtime - subscription and broadcast layer for live polls
//!
//! Clients hold a WebSocket open, subscribe to individual polls or to the
//! global feed, and receive every committed change to what they watch.
//! The mutation layer hands each committed event to the
//! [`EventRouter`](adapters::websocket::EventRouter), which fans it out to
//! per-connection drop-oldest queues. The [`client`] module is the other
//! end: a reconnecting session that keeps a local view in sync and rebuilds
//! it from a baseline read after every gap.

pub mod adapters;
pub mod app;
pub mod client;
pub mod config;
pub mod domain;
pub mod ports;
