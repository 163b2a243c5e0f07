//! HTTP adapters.
//!
//! - `POST /internal/events` - the mutation layer hands a committed event
//!   to the router
//! - `POST /internal/events/batch` - several events, routed in order
//! - `GET /health` - liveness plus connection and router counters
//!
//! The two ingress routes are guarded by `X-Internal-Token` when an ingest
//! secret is configured.

mod dto;
mod events;
mod health;
mod middleware;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use secrecy::SecretString;

use crate::adapters::websocket::EventRouter;
use crate::domain::foundation::Timestamp;
use crate::ports::EventPublisher;

pub use dto::{AcceptedResponse, ErrorResponse, HealthResponse};
pub use events::{publish_event, publish_events, ApiError};
pub use health::health;
pub use middleware::{require_internal_token, IngestSecret, INTERNAL_TOKEN_HEADER};

/// Shared state for the HTTP endpoints.
#[derive(Clone)]
pub struct HttpState {
    pub publisher: Arc<dyn EventPublisher>,
    pub router: Arc<EventRouter>,
    pub started_at: Timestamp,
}

impl HttpState {
    /// State publishing straight into `router`.
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self {
            publisher: router.clone(),
            router,
            started_at: Timestamp::now(),
        }
    }
}

/// Ingress and health routes. Without `ingest_secret` the ingress routes
/// are open and must only be reachable from the poll API's network.
pub fn http_router(ingest_secret: Option<SecretString>) -> Router<HttpState> {
    let mut ingress = Router::new()
        .route("/internal/events", post(publish_event))
        .route("/internal/events/batch", post(publish_events));
    match ingest_secret {
        Some(secret) => {
            let secret: IngestSecret = Arc::new(secret);
            ingress = ingress.route_layer(from_fn_with_state(secret, require_internal_token));
        }
        None => tracing::warn!("No ingest secret configured, event ingress is unauthenticated"),
    }

    ingress.route("/health", get(health))
}
