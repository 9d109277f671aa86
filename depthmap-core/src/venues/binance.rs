//! Binance venue adapter

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use super::errors::FeedError;
use super::types::{now_millis, DepthEntry, VenueId};
use super::{normalize_levels, FeedEvent, StreamHandle, VenueAdapter};

const VENUE: &str = "binance";

/// Depth snapshot response from the REST endpoint.
#[derive(Deserialize, Debug)]
struct DepthSnapshot {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

/// Depth delta pushed on the `<symbol>@depth` stream.
#[derive(Deserialize, Debug)]
struct DepthUpdate {
    #[serde(rename = "E")]
    event_time: Option<i64>,
    #[serde(rename = "b")]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    asks: Vec<[String; 2]>,
}

/// Binance depth feed adapter.
pub struct BinanceAdapter {
    rest_url: String,
    ws_url: String,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        Self {
            rest_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443/ws".to_string(),
        }
    }

    /// Adapter against non-default endpoints (testnet, local stub).
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
            "method": "SUBSCRIBE",
            "params": [format!("{}@depth", instrument(&symbol).to_lowercase())],
            "id": 1,
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        info!(venue = %venue, symbol = %symbol, "depth stream subscribed");

        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => match decode_stream_message(&text, &venue) {
                    Ok(Some(entries)) if !entries.is_empty() => {
                        let batch = FeedEvent::Entries {
                            venue: venue.clone(),
                            entries,
                        };
                        if events.send(batch).is_err() {
                            // Receiver gone: the session tore us down.
                            return Ok(());
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(venue = %venue, error = %err, "dropping malformed depth message");
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

        Err(FeedError::transport("depth stream ended"))
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> VenueId {
        VenueId::new(VENUE)
    }

    async fn fetch_snapshot(&self, symbol: &str, limit: u32) -> Result<Vec<DepthEntry>, FeedError> {
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.rest_url,
            instrument(symbol),
            limit
        );

        let response = reqwest::get(&url).await?;
        if !response.status().is_success() {
            return Err(FeedError::transport(format!(
                "snapshot request returned {}",
                response.status()
            )));
        }

        let snapshot: DepthSnapshot = response.json().await?;
        snapshot_entries(&snapshot, &self.venue(), now_millis())
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

/// Map a canonical hyphenated symbol ("BTC-USDT") to Binance's joined form.
fn instrument(symbol: &str) -> String {
    symbol.replace('-', "").to_uppercase()
}

/// Normalize a REST snapshot. The endpoint reports no timestamp, so entries
/// carry the local receipt time.
fn snapshot_entries(
    snapshot: &DepthSnapshot,
    venue: &VenueId,
    timestamp: i64,
) -> Result<Vec<DepthEntry>, FeedError> {
    let mut entries = Vec::new();
    normalize_levels(
        snapshot.bids.iter().map(|l| (l[0].as_str(), l[1].as_str())),
        venue,
        timestamp,
        &mut entries,
    )
    .map_err(FeedError::into_transport)?;
    normalize_levels(
        snapshot.asks.iter().map(|l| (l[0].as_str(), l[1].as_str())),
        venue,
        timestamp,
        &mut entries,
    )
    .map_err(FeedError::into_transport)?;
    Ok(entries)
}

/// Decode one stream frame into normalized entries.
///
/// Subscription acknowledgments and other non-depth frames decode to `None`.
fn decode_stream_message(
    text: &str,
    venue: &VenueId,
) -> Result<Option<Vec<DepthEntry>>, FeedError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("e").and_then(|v| v.as_str()) != Some("depthUpdate") {
        return Ok(None);
    }

    let update: DepthUpdate = serde_json::from_value(value)?;
    let timestamp = update.event_time.unwrap_or_else(now_millis);

    let mut entries = Vec::new();
    normalize_levels(
        update.bids.iter().map(|l| (l[0].as_str(), l[1].as_str())),
        venue,
        timestamp,
        &mut entries,
    )?;
    normalize_levels(
        update.asks.iter().map(|l| (l[0].as_str(), l[1].as_str())),
        venue,
        timestamp,
        &mut entries,
    )?;
    Ok(Some(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_depth_update() {
        let text = r#"
        {
            "e": "depthUpdate",
            "E": 1672515782136,
            "s": "BTCUSDT",
            "U": 157,
            "u": 160,
            "b": [["16569.01", "0.014"], ["16568.50", "0.000"]],
            "a": [["16570.00", "0.250"]]
        }
        "#;

        let venue = VenueId::new(VENUE);
        let entries = decode_stream_message(text, &venue).unwrap().unwrap();

        // The zero-quantity bid level is a deletion and must not appear.
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].price, 16569.01);
        assert_eq!(entries[0].quantity, 0.014);
        assert_eq!(entries[0].timestamp, 1672515782136);
        assert_eq!(entries[1].price, 16570.00);
        assert!(entries.iter().all(|e| e.venue == venue));
    }

    #[test]
    fn test_subscription_ack_is_ignored() {
        let venue = VenueId::new(VENUE);
        let result = decode_stream_message(r#"{"result": null, "id": 1}"#, &venue).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_malformed_message_is_a_decode_error() {
        let venue = VenueId::new(VENUE);
        let err = decode_stream_message("not json", &venue).unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)));

        let text = r#"{"e": "depthUpdate", "b": [["oops", "1.0"]], "a": []}"#;
        let err = decode_stream_message(text, &venue).unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)));
    }

    #[test]
    fn test_instrument_mapping() {
        assert_eq!(instrument("BTC-USDT"), "BTCUSDT");
        assert_eq!(instrument("ethusdt"), "ETHUSDT");
    }

    #[test]
    fn test_snapshot_normalization() {
        let snapshot: DepthSnapshot = serde_json::from_str(
            r#"{"lastUpdateId": 1027024, "bids": [["99.00", "8.0"]], "asks": [["101.00", "0.0"], ["102.00", "3.0"]]}"#,
        )
        .unwrap();

        let venue = VenueId::new(VENUE);
        let entries = snapshot_entries(&snapshot, &venue, 42).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.timestamp == 42));

        // Malformed snapshot bodies fail the whole fetch as transport errors.
        let bad: DepthSnapshot =
            serde_json::from_str(r#"{"bids": [["x", "1"]], "asks": []}"#).unwrap();
        let err = snapshot_entries(&bad, &venue, 42).unwrap_err();
        assert!(matches!(err, FeedError::Transport(_)));
    }
}
