//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the realtime core to external systems:
//! - `websocket` - Connection registry, event router, axum transport
//! - `http` - Event ingress and health endpoints
//! - `auth` - Token verifiers
//! - `client` - WebSocket connector and poll API reader for clients

pub mod auth;
pub mod client;
pub mod http;
pub mod websocket;
