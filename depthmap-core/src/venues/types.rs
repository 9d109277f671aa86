//! Core market depth data types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue identifier
///
/// Open string key rather than a closed enum: new venues only need an
/// adapter registered under their id, never a change to core logic.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VenueId(pub String);

impl VenueId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Book side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// One normalized price/quantity observation from a venue.
///
/// Immutable once created. Quantity is always > 0: zero-quantity levels are
/// deletions on the venue side and are dropped during normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthEntry {
    pub price: f64,
    pub quantity: f64,
    pub venue: VenueId,
    /// Milliseconds since epoch, venue-reported where available.
    pub timestamp: i64,
}

impl DepthEntry {
    pub fn new(price: f64, quantity: f64, venue: VenueId, timestamp: i64) -> Self {
        Self {
            price,
            quantity,
            venue,
            timestamp,
        }
    }
}

/// Trailing duration whose entries are considered current.
///
/// A filter policy applied on every aggregation pass, not stored state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
}

impl TimeWindow {
    pub fn millis(&self) -> i64 {
        match self {
            TimeWindow::OneMinute => 60_000,
            TimeWindow::FiveMinutes => 300_000,
            TimeWindow::FifteenMinutes => 900_000,
            TimeWindow::OneHour => 3_600_000,
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::FiveMinutes
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::OneMinute => write!(f, "1m"),
            TimeWindow::FiveMinutes => write!(f, "5m"),
            TimeWindow::FifteenMinutes => write!(f, "15m"),
            TimeWindow::OneHour => write!(f, "1h"),
        }
    }
}

/// Current wall-clock time in milliseconds since epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_durations() {
        assert_eq!(TimeWindow::OneMinute.millis(), 60_000);
        assert_eq!(TimeWindow::FiveMinutes.millis(), 300_000);
        assert_eq!(TimeWindow::FifteenMinutes.millis(), 900_000);
        assert_eq!(TimeWindow::OneHour.millis(), 3_600_000);
    }

    #[test]
    fn test_venue_id_is_open() {
        let venue = VenueId::new("some-future-venue");
        assert_eq!(venue.as_str(), "some-future-venue");
        assert_eq!(venue, VenueId::from("some-future-venue"));
    }
}
