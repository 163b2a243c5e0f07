//! Event ingress for the mutation layer.
//!
//! The poll API posts one materialized event per committed write. Envelopes
//! are validated into `PollEvent`s before anything is routed; a batch is
//! rejected as a whole if any envelope is invalid.

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::poll::{EventEnvelope, PollEvent};

use super::dto::{AcceptedResponse, ErrorResponse};
use super::HttpState;

/// Error wrapper mapping domain errors onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code() {
            ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,
            ErrorCode::PollNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = if self.0.details.is_empty() {
            ErrorResponse::new(self.0.code().to_string(), self.0.message.clone())
        } else {
            ErrorResponse::with_details(
                self.0.code().to_string(),
                self.0.message.clone(),
                serde_json::json!(self.0.details),
            )
        };
        (status, Json(body)).into_response()
    }
}

/// POST /internal/events - Route one committed event
pub async fn publish_event(
    State(state): State<HttpState>,
    Json(envelope): Json<EventEnvelope>,
) -> Result<impl IntoResponse, ApiError> {
    let event = PollEvent::try_from(envelope).map_err(DomainError::from)?;
    tracing::debug!(event = %event.kind(), poll_id = %event.resource_id(), "Event received");

    state.publisher.publish(event).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: 1 })))
}

/// POST /internal/events/batch - Route several events in order
pub async fn publish_events(
    State(state): State<HttpState>,
    Json(envelopes): Json<Vec<EventEnvelope>>,
) -> Result<impl IntoResponse, ApiError> {
    let events = envelopes
        .into_iter()
        .enumerate()
        .map(|(i, envelope)| {
            PollEvent::try_from(envelope)
                .map_err(|e| DomainError::from(e).with_detail("index", i.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let accepted = events.len();
    state.publisher.publish_all(events).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted })))
}
