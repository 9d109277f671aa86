//! Depth Monitor Application
//!
//! Thin console front end for the aggregation engine: wires configuration
//! and logging, runs one session against the built-in venues, and logs the
//! aggregate view periodically. Rendering proper is someone else's job.

use anyhow::Result;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use depthmap_core::{connect, ProcessingMode, SessionConfig, SessionStatus, TimeWindow, VenueId};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        )
        .init();

    let symbol = std::env::var("DEPTH_SYMBOL").unwrap_or_else(|_| "BTC-USDT".to_string());
    let config = SessionConfig {
        symbol: symbol.clone(),
        venues: vec![VenueId::new("binance"), VenueId::new("okx")],
        window: TimeWindow::FiveMinutes,
        mode: ProcessingMode::Batched,
        ..SessionConfig::default()
    };

    info!(symbol = %symbol, "starting depth monitor");
    let session = connect(config);

    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = report.tick() => {
                let snapshot = session.snapshot();
                info!(
                    status = %snapshot.status,
                    bids = snapshot.view.bids.len(),
                    asks = snapshot.view.asks.len(),
                    zones = snapshot.view.pressure_zones.len(),
                    max_qty = snapshot.view.max_quantity,
                    "depth view"
                );

                if snapshot.status == SessionStatus::Error {
                    if let Some(error) = &snapshot.error {
                        warn!("session error: {error}");
                    }
                }

                for zone in snapshot.view.pressure_zones.iter().take(3) {
                    info!(
                        side = %zone.side,
                        range = %format!("{:.0}..{:.0}", zone.min_price, zone.max_price),
                        volume = zone.total_volume,
                        score = zone.pressure_score,
                        "pressure zone"
                    );
                }
            }
        }
    }

    session.shutdown().await;
    info!("depth monitor stopped");
    Ok(())
}
