//! Server composition: one registry, one router, and the axum routes in
//! front of them.

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::auth::HmacTokenVerifier;
use crate::adapters::http::{http_router, HttpState};
use crate::adapters::websocket::{
    websocket_router, ConnectionRegistry, EventRouter, WebSocketState,
};
use crate::config::AppConfig;

pub struct RealtimeServer {
    config: AppConfig,
    router: Arc<EventRouter>,
}

impl RealtimeServer {
    pub fn new(config: AppConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.realtime.queue_capacity));
        let router = Arc::new(
            EventRouter::new(registry).with_feed_lifecycle(config.realtime.feed_lifecycle),
        );
        Self { config, router }
    }

    /// The router mutation-layer events are published into.
    pub fn event_router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.router.registry()
    }

    /// All routes with tracing and CORS applied. The request timeout covers
    /// plain HTTP endpoints only; upgraded sockets have their own idle and
    /// write timeouts.
    pub fn routes(&self) -> Router {
        let mut ws_state = WebSocketState::new(self.router.clone())
            .with_settings(self.config.realtime.connection_settings());
        if let Some(secret) = &self.config.auth.jwt_secret {
            ws_state = ws_state.with_verifier(Arc::new(HmacTokenVerifier::new(secret)));
        } else {
            tracing::warn!("No JWT secret configured, all connections are anonymous");
        }

        let http = http_router(self.config.auth.ingest_secret.clone())
            .with_state(HttpState::new(self.router.clone()))
            .layer(TimeoutLayer::new(self.config.server.request_timeout()));

        websocket_router()
            .with_state(ws_state)
            .merge(http)
            .layer(TraceLayer::new_for_http())
            .layer(self.cors())
    }

    fn cors(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .config
            .server
            .cors_origins_list()
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        if origins.is_empty() && !self.config.is_production() {
            return CorsLayer::permissive();
        }

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
    }
}
