//! Shared-secret guard for the event ingress routes.
//!
//! The poll API sends the configured secret in `X-Internal-Token` with
//! every publish. Requests without it, or with a different value, are
//! rejected before the body is read.
//!
//! ```ignore
//! let ingest = Router::new()
//!     .route("/internal/events", post(publish_event))
//!     .route_layer(middleware::from_fn_with_state(secret, require_internal_token));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use super::dto::ErrorResponse;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Guard state: the expected ingress secret.
pub type IngestSecret = Arc<SecretString>;

/// Reject requests whose `X-Internal-Token` does not match the secret.
pub async fn require_internal_token(
    State(secret): State<IngestSecret>,
    request: Request,
    next: Next,
) -> Response {
    let rejection = match request.headers().get(INTERNAL_TOKEN_HEADER) {
        None => Some("Missing internal token"),
        Some(token) if !tokens_match(token.as_bytes(), secret.expose_secret().as_bytes()) => {
            Some("Invalid internal token")
        }
        Some(_) => None,
    };

    match rejection {
        None => next.run(request).await,
        Some(message) => {
            tracing::warn!(path = %request.uri().path(), reason = message, "Rejected ingress");
            unauthorized(message)
        }
    }
}

fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented.ct_eq(expected).into()
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("UNAUTHORIZED", message)),
    )
        .into_response()
}
