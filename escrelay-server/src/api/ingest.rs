use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use escrelay_core::events::EventKey;
use escrelay_sdk::objects::IngestAccepted;

use super::extractors::AuthenticatedEvent;
use crate::state::AppState;

/// `POST /events`: accept an observed escrow event for broadcast.
///
/// A fresh event is queued for the relay and answered with `202`. An event
/// already accepted recently (same transaction hash and log id) is answered
/// with `200` and `accepted: false` and is not published again.
pub(super) async fn ingest_event(
    State(state): State<AppState>,
    AuthenticatedEvent { event, signed_at }: AuthenticatedEvent,
) -> Result<impl IntoResponse, IngestApiError> {
    let key = EventKey::of(&event);
    if !state.recent.admit(key.clone()) {
        tracing::debug!(
            event_id = key.id,
            tx_hash = %key.tx_hash,
            signed_at,
            "Duplicate EventLog ignored"
        );
        return Ok((StatusCode::OK, Json(IngestAccepted { accepted: false })));
    }

    if state.events.send(event).await.is_err() {
        state.recent.forget(&key);
        return Err(IngestApiError::RelayClosed);
    }

    tracing::debug!(event_id = key.id, signed_at, "EventLog accepted");
    Ok((StatusCode::ACCEPTED, Json(IngestAccepted { accepted: true })))
}

/// Errors that can occur in the ingestion handler.
#[derive(Debug)]
pub(super) enum IngestApiError {
    /// The relay has stopped consuming events (server shutting down).
    RelayClosed,
}

impl IntoResponse for IngestApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            IngestApiError::RelayClosed => {
                tracing::warn!("EventLog rejected, relay is not running");
                (StatusCode::SERVICE_UNAVAILABLE, "relay is shutting down").into_response()
            }
        }
    }
}
