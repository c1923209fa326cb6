use axum::{
    extract::State,
    http::{HeaderMap, header},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use escrelay_core::broadcast::StreamFrame;
use escrelay_sdk::objects::stream::{GAP_EVENT, LAST_EVENT_ID_HEADER};
use futures_util::{StreamExt, stream};
use std::convert::Infallible;

use crate::state::AppState;

/// `GET /events/stream`: server-sent events stream of relayed events.
///
/// Registers a subscriber before the response is returned, so nothing
/// published after this handler runs is missed. A `Last-Event-ID` header
/// resumes from the relay backlog; if part of what followed it is no longer
/// retained, the stream opens with a `gap` frame. The stream ends when the
/// subscriber is closed (lagging) or the server shuts down; a client
/// disconnect drops the stream and with it the subscription.
pub(super) async fn event_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let last_sequence = parse_last_event_id(&headers);
    let subscription = state.broadcaster.subscribe_after(last_sequence);
    let keep_alive = state.config.stream.read().await.keep_alive;

    tracing::info!(
        subscriber = %subscription.id(),
        ?last_sequence,
        "Event stream opened"
    );

    let gap = (subscription.missed() > 0).then(|| gap_event(subscription.missed()));
    let mut shutdown = state.shutdown.clone();
    let events = stream::iter(gap)
        .chain(subscription.map(|frame| to_sse_event(&frame)))
        .map(Ok::<_, Infallible>)
        .take_until(async move {
            let _ = shutdown.wait_for(|stopping| *stopping).await;
        });

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(events).keep_alive(KeepAlive::new().interval(keep_alive)),
    )
}

fn to_sse_event(frame: &StreamFrame) -> Event {
    Event::default()
        .id(frame.sequence.to_string())
        .data(&frame.json)
}

/// Body matches [`escrelay_sdk::objects::StreamGap`].
fn gap_event(missed: u64) -> Event {
    Event::default()
        .event(GAP_EVENT)
        .data(serde_json::json!({ "missed": missed }).to_string())
}

fn parse_last_event_id(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(LAST_EVENT_ID_HEADER)?;
    match value.to_str().ok().and_then(|v| v.trim().parse().ok()) {
        Some(seq) => Some(seq),
        None => {
            tracing::debug!(?value, "Ignoring unparsable Last-Event-ID");
            None
        }
    }
}
