//! Relay API client (event producers and stream consumers → relay server).

use futures_util::{Stream, StreamExt, stream};
use reqwest::{Client, StatusCode};
use url::Url;

use super::ClientError;
use crate::objects::stream::{GAP_EVENT, LAST_EVENT_ID_HEADER};
use crate::objects::{EventLog, IngestAccepted, Product, SseDecoder, SseFrame, StreamGap};
use crate::signature::{IngestKey, SIGNATURE_HEADER, SignedEvent};
use crate::validation::ValidationErrors;

/// Typed HTTP client for the relay server.
///
/// Publishing requires the shared ingest secret; the stream and product
/// validation endpoints are open.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    base_url: Url,
    key: IngestKey,
}

/// An event received from the stream together with its relay sequence
/// number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedEvent {
    pub sequence: Option<u64>,
    pub event: EventLog,
}

/// One message on the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Event(RelayedEvent),
    /// The resume point was older than the relay backlog; `missed` events
    /// will never arrive on this stream.
    Gap(StreamGap),
}

impl RelayClient {
    /// Create a new `RelayClient`.
    ///
    /// * `base_url` – root URL of the relay server (e.g. `https://relay.example.com`).
    /// * `ingest_secret` – the shared HMAC secret for body signing.
    pub fn new(base_url: Url, ingest_secret: &[u8]) -> Self {
        Self {
            http: Client::new(),
            base_url,
            key: IngestKey::new(ingest_secret),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/events` – hand an observed event to the relay.
    ///
    /// `accepted` is `false` when the relay had already taken this event.
    pub async fn publish_event(&self, event: &EventLog) -> Result<IngestAccepted, ClientError> {
        let signed = SignedEvent::sign(event, &self.key)?;

        let url = self.base_url.join("/api/events")?;

        let resp = self
            .http
            .post(url)
            .header(SIGNATURE_HEADER, signed.header.to_string())
            .body(signed.body)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /api/products/validate` – run the product schema server-side.
    ///
    /// The outer `Result` is the transport; the inner one is the schema
    /// verdict.
    pub async fn validate_product(
        &self,
        input: &serde_json::Value,
    ) -> Result<Result<Product, ValidationErrors>, ClientError> {
        let url = self.base_url.join("/api/products/validate")?;

        let resp = self.http.post(url).json(input).send().await?;

        if resp.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let bytes = resp.bytes().await?;
            let errors: ValidationErrors = serde_json::from_slice(&bytes)?;
            return Ok(Err(errors));
        }
        parse_response(resp).await.map(Ok)
    }

    /// `GET /api/events/stream` – subscribe to relayed events.
    ///
    /// Pass the last sequence number seen to resume after a disconnect.
    pub async fn subscribe(
        &self,
        last_sequence: Option<u64>,
    ) -> Result<impl Stream<Item = Result<StreamMessage, ClientError>>, ClientError> {
        let url = self.base_url.join("/api/events/stream")?;

        let mut req = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(seq) = last_sequence {
            req = req.header(LAST_EVENT_ID_HEADER, seq.to_string());
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }

        let mut decoder = SseDecoder::new();
        let events = resp
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder
                    .push(&bytes)
                    .into_iter()
                    .map(decode_frame)
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(ClientError::Http(e))],
            })
            .flat_map(stream::iter);

        Ok(events)
    }
}

fn decode_frame(frame: SseFrame) -> Result<StreamMessage, ClientError> {
    if frame.event.as_deref() == Some(GAP_EVENT) {
        return Ok(StreamMessage::Gap(serde_json::from_str(&frame.data)?));
    }
    let event: EventLog = serde_json::from_str(&frame.data)?;
    Ok(StreamMessage::Event(RelayedEvent {
        sequence: frame.sequence(),
        event,
    }))
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
