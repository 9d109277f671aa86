//! Session management: adapter lifecycles, buffering, reprocessing

pub mod controller;

pub use controller::{SessionController, SessionHandle};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::depth::{AggregateView, ZoneConfig};
use crate::venues::{TimeWindow, VenueId};

/// Session lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Open,
    Closed,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Open => write!(f, "open"),
            SessionStatus::Closed => write!(f, "closed"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// When aggregation passes run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Every inbound batch triggers a full pass. No debouncing: redundant
    /// recomputation is traded for minimal latency.
    RealTime,
    /// Inbound batches are staged and drained on a fixed period.
    Batched,
}

/// Session configuration, injected by the caller.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Canonical instrument, e.g. "BTC-USDT"; adapters map it to their
    /// venue-specific form.
    pub symbol: String,
    /// Selected venues. Changing the set always tears the session down and
    /// reconnects; adapters are never added or removed incrementally.
    pub venues: Vec<VenueId>,
    pub snapshot_limit: u32,
    pub window: TimeWindow,
    pub mode: ProcessingMode,
    pub detect_zones: bool,
    pub zone_config: ZoneConfig,
    /// Drain period for [`ProcessingMode::Batched`].
    pub batch_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USDT".to_string(),
            venues: vec![VenueId::new("binance"), VenueId::new("okx")],
            snapshot_limit: 50,
            window: TimeWindow::default(),
            mode: ProcessingMode::RealTime,
            detect_zones: true,
            zone_config: ZoneConfig::default(),
            batch_interval: Duration::from_secs(1),
        }
    }
}

/// Single read-and-react value exposed to the presentation layer.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub view: Arc<AggregateView>,
    pub status: SessionStatus,
    pub error: Option<String>,
}

/// Per-venue feed counters.
#[derive(Clone, Debug, Default)]
pub struct FeedStats {
    pub batches_received: u64,
    pub entries_received: u64,
    pub transport_errors: u64,
    pub last_event_ms: Option<i64>,
}
