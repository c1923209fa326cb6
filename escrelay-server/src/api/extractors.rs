//! Producer authentication for the ingestion route.
//!
//! [`AuthenticatedEvent`] checks the `Escrelay-Signature` header against the
//! raw request bytes with the live ingest key, and only parses the body as an
//! [`EventLog`] once the signature holds.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request, rejection::BytesRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use escrelay_sdk::objects::EventLog;
use escrelay_sdk::signature::{SIGNATURE_HEADER, SignatureError, SignatureHeader, unix_now};

use crate::state::AppState;

/// An [`EventLog`] posted by a producer holding the ingest secret.
#[derive(Debug)]
pub struct AuthenticatedEvent {
    pub event: EventLog,
    /// Timestamp the producer signed with.
    pub signed_at: i64,
}

/// Why an ingestion request was refused before reaching the handler.
#[derive(Debug, thiserror::Error)]
pub enum IngestRejection {
    #[error("missing Escrelay-Signature header")]
    MissingSignature,
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Body(#[from] BytesRejection),
    #[error("body is not an EventLog: {0}")]
    InvalidEvent(serde_json::Error),
}

impl IntoResponse for IngestRejection {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestRejection::MissingSignature => StatusCode::UNAUTHORIZED,
            IngestRejection::Signature(SignatureError::InvalidFormat)
            | IngestRejection::Signature(SignatureError::InvalidBase64) => StatusCode::BAD_REQUEST,
            IngestRejection::Signature(SignatureError::Stale { .. })
            | IngestRejection::Signature(SignatureError::Mismatch) => StatusCode::UNAUTHORIZED,
            IngestRejection::Body(rejection) => rejection.status(),
            IngestRejection::InvalidEvent(_) => StatusCode::BAD_REQUEST,
        };
        tracing::warn!(%status, error = %self, "Ingestion request rejected");
        (status, self.to_string()).into_response()
    }
}

impl FromRequest<AppState> for AuthenticatedEvent {
    type Rejection = IngestRejection;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header: SignatureHeader = req
            .headers()
            .get(SIGNATURE_HEADER)
            .ok_or(IngestRejection::MissingSignature)?
            .to_str()
            .map_err(|_| SignatureError::InvalidFormat)?
            .parse()?;

        // Honors the route's body limit.
        let body = Bytes::from_request(req, state).await?;

        state
            .config
            .ingest
            .read()
            .await
            .key()
            .verify(&header, &body, unix_now())?;

        let event = serde_json::from_slice(&body).map_err(IngestRejection::InvalidEvent)?;
        Ok(AuthenticatedEvent {
            event,
            signed_at: header.timestamp,
        })
    }
}
