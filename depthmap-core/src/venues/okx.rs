//! OKX venue adapter

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use super::errors::FeedError;
use super::types::{now_millis, DepthEntry, VenueId};
use super::{parse_level, FeedEvent, StreamHandle, VenueAdapter};

const VENUE: &str = "okx";

/// Envelope returned by the `/api/v5/market/books` endpoint.
#[derive(Deserialize, Debug)]
struct BooksResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<BookData>,
}

/// One book payload. OKX levels are arrays of four decimal strings; only
/// price and quantity matter here.
#[derive(Deserialize, Debug)]
struct BookData {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
    #[serde(default)]
    ts: Option<String>,
}

/// OKX depth feed adapter.
pub struct OkxAdapter {
    rest_url: String,
    ws_url: String,
}

impl OkxAdapter {
    pub fn new() -> Self {
        Self {
            rest_url: "https://www.okx.com".to_string(),
            ws_url: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
        }
    }

    /// Adapter against non-default endpoints (demo trading, local stub).
    pub fn with_endpoints(rest_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            rest_url: rest_url.into(),
            ws_url: ws_url.into(),
        }
    }

    async fn run_stream(
        ws_url: String,
        symbol: String,
        venue: VenueId,
        events: mpsc::UnboundedSender<FeedEvent>,
    ) -> Result<(), FeedError> {
        let url = Url::parse(&ws_url).map_err(|e| FeedError::transport(e.to_string()))?;
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::json!({
            "op": "subscribe",
            "args": [{ "channel": "books", "instId": symbol }],
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        info!(venue = %venue, symbol = %symbol, "books stream subscribed");

        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => match decode_stream_message(&text, &venue)? {
                    DecodedMessage::Entries(entries) if !entries.is_empty() => {
                        let batch = FeedEvent::Entries {
                            venue: venue.clone(),
                            entries,
                        };
                        if events.send(batch).is_err() {
                            // Receiver gone: the session tore us down.
                            return Ok(());
                        }
                    }
                    DecodedMessage::Entries(_) => {}
                    DecodedMessage::Ignored => {}
                    DecodedMessage::Malformed(err) => {
                        warn!(venue = %venue, error = %err, "dropping malformed books message");
                    }
                },
                Message::Ping(payload) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Message::Close(frame) => {
                    debug!(venue = %venue, ?frame, "close frame received");
                    break;
                }
                _ => {}
            }
        }

        Err(FeedError::transport("books stream ended"))
    }
}

impl Default for OkxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for OkxAdapter {
    fn venue(&self) -> VenueId {
        VenueId::new(VENUE)
    }

    async fn fetch_snapshot(&self, symbol: &str, limit: u32) -> Result<Vec<DepthEntry>, FeedError> {
        let url = format!(
            "{}/api/v5/market/books?instId={}&sz={}",
            self.rest_url, symbol, limit
        );

        let response = reqwest::get(&url).await?;
        if !response.status().is_success() {
            return Err(FeedError::transport(format!(
                "snapshot request returned {}",
                response.status()
            )));
        }

        let books: BooksResponse = response.json().await?;
        if books.code != "0" {
            return Err(FeedError::transport(format!(
                "snapshot request rejected: code {} {}",
                books.code, books.msg
            )));
        }

        let venue = self.venue();
        let mut entries = Vec::new();
        for book in &books.data {
            book_entries(book, &venue, &mut entries).map_err(FeedError::into_transport)?;
        }
        Ok(entries)
    }

    fn open_stream(&self, symbol: &str, events: mpsc::UnboundedSender<FeedEvent>) -> StreamHandle {
        let venue = self.venue();
        let ws_url = self.ws_url.clone();
        let symbol = symbol.to_string();
        let task_venue = venue.clone();

        let task = tokio::spawn(async move {
            let result =
                Self::run_stream(ws_url, symbol, task_venue.clone(), events.clone()).await;
            if let Err(err) = result {
                let _ = events.send(FeedEvent::TransportError {
                    venue: task_venue,
                    message: err.to_string(),
                });
            }
        });

        StreamHandle::new(venue, task)
    }
}

#[derive(Debug)]
enum DecodedMessage {
    Entries(Vec<DepthEntry>),
    Ignored,
    Malformed(FeedError),
}

/// Normalize one book payload, stamping entries with the venue-reported
/// timestamp when present.
fn book_entries(
    book: &BookData,
    venue: &VenueId,
    out: &mut Vec<DepthEntry>,
) -> Result<(), FeedError> {
    let timestamp = match &book.ts {
        Some(ts) => ts
            .parse::<i64>()
            .map_err(|_| FeedError::decode(format!("bad book timestamp: {ts}")))?,
        None => now_millis(),
    };

    for level in book.bids.iter().chain(book.asks.iter()) {
        let (price, quantity) = match (level.first(), level.get(1)) {
            (Some(p), Some(q)) => (p.as_str(), q.as_str()),
            _ => return Err(FeedError::decode("book level with fewer than two fields")),
        };
        if let Some((price, quantity)) = parse_level(price, quantity)? {
            out.push(DepthEntry::new(price, quantity, venue.clone(), timestamp));
        }
    }
    Ok(())
}

/// Decode one stream frame.
///
/// Subscription acknowledgments decode to `Ignored`; a venue-reported error
/// event fails the stream; a malformed book payload is dropped on its own.
fn decode_stream_message(text: &str, venue: &VenueId) -> Result<DecodedMessage, FeedError> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => return Ok(DecodedMessage::Malformed(err.into())),
    };

    if let Some(event) = value.get("event").and_then(|v| v.as_str()) {
        if event == "error" {
            let msg = value
                .get("msg")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error event");
            return Err(FeedError::transport(format!("venue error event: {msg}")));
        }
        return Ok(DecodedMessage::Ignored);
    }

    let channel = value
        .pointer("/arg/channel")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if channel != "books" {
        return Ok(DecodedMessage::Ignored);
    }

    let data: Vec<BookData> = match serde_json::from_value(value["data"].clone()) {
        Ok(data) => data,
        Err(err) => return Ok(DecodedMessage::Malformed(err.into())),
    };

    let mut entries = Vec::new();
    for book in &data {
        if let Err(err) = book_entries(book, venue, &mut entries) {
            return Ok(DecodedMessage::Malformed(err));
        }
    }
    Ok(DecodedMessage::Entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_books_update() {
        let text = r#"
        {
            "arg": {"channel": "books", "instId": "BTC-USDT"},
            "action": "update",
            "data": [{
                "bids": [["16500.1", "2.5", "0", "4"], ["16499.0", "0", "0", "0"]],
                "asks": [["16501.3", "1.25", "0", "2"]],
                "ts": "1672515782136"
            }]
        }
        "#;

        let venue = VenueId::new(VENUE);
        let decoded = decode_stream_message(text, &venue).unwrap();
        let entries = match decoded {
            DecodedMessage::Entries(entries) => entries,
            _ => panic!("expected entries"),
        };

        // The zero-quantity bid is a deletion and must not appear.
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].price, 16500.1);
        assert_eq!(entries[0].quantity, 2.5);
        assert!(entries.iter().all(|e| e.timestamp == 1672515782136));
    }

    #[test]
    fn test_subscription_ack_is_ignored() {
        let venue = VenueId::new(VENUE);
        let text = r#"{"event": "subscribe", "arg": {"channel": "books", "instId": "BTC-USDT"}}"#;
        assert!(matches!(
            decode_stream_message(text, &venue).unwrap(),
            DecodedMessage::Ignored
        ));
    }

    #[test]
    fn test_error_event_fails_the_stream() {
        let venue = VenueId::new(VENUE);
        let text = r#"{"event": "error", "code": "60012", "msg": "invalid request"}"#;
        let err = decode_stream_message(text, &venue).unwrap_err();
        assert!(matches!(err, FeedError::Transport(_)));
    }

    #[test]
    fn test_malformed_book_is_dropped_not_fatal() {
        let venue = VenueId::new(VENUE);
        let text = r#"
        {
            "arg": {"channel": "books", "instId": "BTC-USDT"},
            "data": [{"bids": [["garbage"]], "asks": [], "ts": "1"}]
        }
        "#;
        assert!(matches!(
            decode_stream_message(text, &venue).unwrap(),
            DecodedMessage::Malformed(_)
        ));
    }

    #[test]
    fn test_snapshot_payload_normalization() {
        let response: BooksResponse = serde_json::from_str(
            r#"{"code": "0", "msg": "", "data": [{"bids": [["99.0", "8", "0", "1"]], "asks": [["101.0", "3", "0", "1"]], "ts": "77"}]}"#,
        )
        .unwrap();

        let venue = VenueId::new(VENUE);
        let mut entries = Vec::new();
        for book in &response.data {
            book_entries(book, &venue, &mut entries).unwrap();
        }
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].price, 99.0);
        assert_eq!(entries[0].quantity, 8.0);
        assert_eq!(entries[1].timestamp, 77);
    }
}
