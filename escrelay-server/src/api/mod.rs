//! HTTP API handlers.
//!
//! # Endpoints
//!
//! - `GET  /events/stream`     – server-sent events stream of relayed escrow events
//! - `POST /events`            – signed ingestion of an observed escrow event
//! - `POST /products/validate` – run the product validation schema

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::state::AppState;

mod extractors;
mod ingest;
mod products;
mod stream;

/// Upper bound on an ingested event body.
const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/stream", get(stream::event_stream))
        .route(
            "/events",
            post(ingest::ingest_event).layer(DefaultBodyLimit::max(MAX_EVENT_BYTES)),
        )
        .route("/products/validate", post(products::validate_product))
}
