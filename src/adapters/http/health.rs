//! Liveness endpoint with broadcast counters.

use axum::extract::{Json, State};

use crate::domain::foundation::Timestamp;

use super::dto::HealthResponse;
use super::HttpState;

/// GET /health
pub async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    let registry = state.router.registry();
    let uptime = *Timestamp::now().as_datetime() - *state.started_at.as_datetime();

    Json(HealthResponse {
        status: "ok",
        connections: registry.connection_count(),
        topics: registry.topic_count(),
        uptime_secs: uptime.num_seconds(),
        metrics: state.router.metrics().snapshot(),
    })
}
