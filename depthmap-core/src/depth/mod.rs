//! Depth aggregation: windowed classification and pressure-zone clustering

pub mod aggregator;
pub mod zones;

pub use aggregator::{AggregateView, Aggregator};
pub use zones::{detect_zones, PressureZone, ZoneConfig};
