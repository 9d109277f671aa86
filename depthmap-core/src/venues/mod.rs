//! Venue connectivity modules

pub mod binance;
pub mod errors;
pub mod okx;
pub mod types;

pub use binance::BinanceAdapter;
pub use errors::FeedError;
pub use okx::OkxAdapter;
pub use types::{now_millis, DepthEntry, Side, TimeWindow, VenueId};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Event delivered by a live venue stream.
#[derive(Clone, Debug)]
pub enum FeedEvent {
    /// One decoded batch of normalized entries.
    Entries {
        venue: VenueId,
        entries: Vec<DepthEntry>,
    },
    /// Transport-level stream failure. The stream task ends after sending
    /// this; recovery is the session controller's decision.
    TransportError { venue: VenueId, message: String },
}

/// Handle to a live venue stream task.
///
/// Closing aborts the task and with it the connection it owns. The handle
/// never reconnects on its own.
pub struct StreamHandle {
    venue: VenueId,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn new(venue: VenueId, task: JoinHandle<()>) -> Self {
        Self { venue, task }
    }

    pub fn venue(&self) -> &VenueId {
        &self.venue
    }

    pub fn close(self) {
        self.task.abort();
    }
}

/// Trait for venue adapters.
///
/// Adapters normalize venue-specific snapshot/delta payloads into
/// [`DepthEntry`] batches and retain no state beyond their connection
/// parameters.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> VenueId;

    /// Fetch the initial depth snapshot over REST.
    ///
    /// Fails with [`FeedError::Transport`] on non-2xx responses or malformed
    /// payloads; callers treat a failure as an empty result.
    async fn fetch_snapshot(&self, symbol: &str, limit: u32) -> Result<Vec<DepthEntry>, FeedError>;

    /// Open the live depth stream for a symbol.
    ///
    /// Spawns a task that delivers [`FeedEvent`]s on `events` until the
    /// connection fails or the returned handle is closed.
    fn open_stream(&self, symbol: &str, events: mpsc::UnboundedSender<FeedEvent>) -> StreamHandle;
}

/// Venue-keyed adapter registry.
///
/// Selecting venues for a session is a lookup here; adding a venue is a
/// [`VenueRegistry::register`] call.
pub struct VenueRegistry {
    adapters: DashMap<VenueId, Arc<dyn VenueAdapter>>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
        }
    }

    /// Registry preloaded with the built-in venue adapters.
    pub fn with_default_venues() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(BinanceAdapter::new()));
        registry.register(Arc::new(OkxAdapter::new()));
        registry
    }

    pub fn register(&self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters.insert(adapter.venue(), adapter);
    }

    pub fn get(&self, venue: &VenueId) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters.get(venue).map(|a| a.clone())
    }

    pub fn venues(&self) -> Vec<VenueId> {
        self.adapters.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for VenueRegistry {
    fn default() -> Self {
        Self::with_default_venues()
    }
}

/// Parse one price/quantity level of decimal strings.
///
/// Returns `None` for zero-quantity levels: those are deletions on the venue
/// side and carry no information for a windowed depth view.
pub(crate) fn parse_level(price: &str, quantity: &str) -> Result<Option<(f64, f64)>, FeedError> {
    let price: f64 = price.parse()?;
    let quantity: f64 = quantity.parse()?;
    if quantity <= 0.0 {
        return Ok(None);
    }
    Ok(Some((price, quantity)))
}

/// Normalize a batch of `[price, quantity]` string levels into entries.
pub(crate) fn normalize_levels<'a, I>(
    levels: I,
    venue: &VenueId,
    timestamp: i64,
    out: &mut Vec<DepthEntry>,
) -> Result<(), FeedError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (price, quantity) in levels {
        if let Some((price, quantity)) = parse_level(price, quantity)? {
            out.push(DepthEntry::new(price, quantity, venue.clone(), timestamp));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_quantity_levels_are_dropped() {
        let venue = VenueId::new("binance");
        let mut out = Vec::new();
        normalize_levels(
            [("100.5", "2.0"), ("101.0", "0.00000000"), ("99.5", "1.5")],
            &venue,
            1_000,
            &mut out,
        )
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].price, 100.5);
        assert_eq!(out[1].price, 99.5);
        assert!(out.iter().all(|e| e.quantity > 0.0));
    }

    #[test]
    fn test_malformed_level_is_a_decode_error() {
        let venue = VenueId::new("binance");
        let mut out = Vec::new();
        let err = normalize_levels([("not-a-number", "1.0")], &venue, 0, &mut out).unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)));
    }

    #[test]
    fn test_stream_handle_close() {
        tokio_test::block_on(async {
            let task = tokio::spawn(std::future::pending::<()>());
            let handle = StreamHandle::new(VenueId::new("test"), task);
            assert_eq!(handle.venue().as_str(), "test");
            handle.close();
        });
    }

    #[test]
    fn test_registry_lookup_is_venue_keyed() {
        let registry = VenueRegistry::with_default_venues();
        assert!(registry.get(&VenueId::new("binance")).is_some());
        assert!(registry.get(&VenueId::new("okx")).is_some());
        assert!(registry.get(&VenueId::new("unknown")).is_none());

        let mut venues = registry.venues();
        venues.sort();
        assert_eq!(venues, vec![VenueId::new("binance"), VenueId::new("okx")]);
    }
}
