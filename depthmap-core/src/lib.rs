//! Multi-Venue Depth Aggregation Library
//!
//! Turns independent, asynchronously-arriving order book feeds from multiple
//! trading venues into a single time-windowed, classified, and clustered
//! market depth view. Venue connectivity, aggregation, and session lifecycle
//! are separate layers; rendering and controls live with the consumer.

pub mod depth;
pub mod session;
pub mod venues;

// Re-export main types for easy access
pub use depth::{AggregateView, Aggregator, PressureZone, ZoneConfig};
pub use session::{
    FeedStats, ProcessingMode, SessionConfig, SessionController, SessionHandle, SessionSnapshot,
    SessionStatus,
};
pub use venues::{
    DepthEntry, FeedError, FeedEvent, Side, StreamHandle, TimeWindow, VenueAdapter, VenueId,
    VenueRegistry,
};

use std::sync::Arc;

/// Start a session over the built-in venue adapters.
pub fn connect(config: SessionConfig) -> SessionHandle {
    SessionController::spawn(config, Arc::new(VenueRegistry::with_default_venues()))
}

/// Start a session over a caller-assembled registry, for custom venues or
/// non-default endpoints.
pub fn connect_with_registry(config: SessionConfig, registry: Arc<VenueRegistry>) -> SessionHandle {
    SessionController::spawn(config, registry)
}
