//! Windowed classification of multi-venue depth entries

use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::venues::{DepthEntry, TimeWindow, VenueId};

use super::zones::{detect_zones, PressureZone, ZoneConfig};

/// The externally visible result of one aggregation pass.
///
/// Published as a whole: a new view replaces the previous one atomically, so
/// consumers never see fresh bids next to stale pressure zones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateView {
    /// Classified bids, price descending.
    pub bids: Vec<DepthEntry>,
    /// Classified asks, price ascending.
    pub asks: Vec<DepthEntry>,
    /// Detected zones across all venues, score descending.
    pub pressure_zones: Vec<PressureZone>,
    pub min_price: f64,
    pub max_price: f64,
    /// Largest single-entry quantity in the classified union. Zero for an
    /// empty view; consumers scale against it and must not divide by zero.
    pub max_quantity: f64,
    pub last_updated: i64,
}

impl AggregateView {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Midpoint of the observed price range.
    pub fn mid_price(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some((self.min_price + self.max_price) / 2.0)
    }

    pub fn total_bid_volume(&self) -> f64 {
        self.bids.iter().map(|e| e.quantity).sum()
    }

    pub fn total_ask_volume(&self) -> f64 {
        self.asks.iter().map(|e| e.quantity).sum()
    }

    /// Volume-weighted average price over the classified union.
    pub fn vwap(&self) -> Option<f64> {
        let entries = self.bids.iter().chain(self.asks.iter());
        let (mut value, mut volume) = (0.0, 0.0);
        for entry in entries {
            value += entry.price * entry.quantity;
            volume += entry.quantity;
        }
        if volume > 0.0 {
            Some(value / volume)
        } else {
            None
        }
    }
}

/// Pure aggregation pass over a buffer snapshot.
///
/// Holds no state between invocations: the view is a function of the entries
/// it is handed, the window, and the clock.
#[derive(Clone, Debug)]
pub struct Aggregator {
    pub window: TimeWindow,
    pub detect_zones: bool,
    pub zone_config: ZoneConfig,
}

impl Aggregator {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            detect_zones: true,
            zone_config: ZoneConfig::default(),
        }
    }

    /// Run one full pass: filter to the window, classify per venue, compute
    /// extrema, then cluster pressure zones per venue group.
    pub fn aggregate(&self, entries: &[DepthEntry], now_ms: i64) -> AggregateView {
        let window_ms = self.window.millis();
        let filtered: Vec<&DepthEntry> = entries
            .iter()
            .filter(|e| now_ms - e.timestamp < window_ms)
            .collect();

        if filtered.is_empty() {
            return AggregateView {
                last_updated: now_ms,
                ..AggregateView::default()
            };
        }

        let mut groups: BTreeMap<&VenueId, Vec<&DepthEntry>> = BTreeMap::new();
        for &entry in &filtered {
            groups.entry(&entry.venue).or_default().push(entry);
        }

        let global_mean =
            filtered.iter().map(|e| e.price).sum::<f64>() / filtered.len() as f64;

        // Per-venue reference price: the mean over the venue's windowed
        // entries. A lone observation yields no usable mid, so that venue
        // falls back to the global mean below.
        let mut venue_mid: BTreeMap<&VenueId, f64> = BTreeMap::new();
        for (venue, group) in &groups {
            if group.len() >= 2 {
                let mean = group.iter().map(|e| e.price).sum::<f64>() / group.len() as f64;
                venue_mid.insert(*venue, mean);
            }
        }

        // Heuristic split against the venue-local mean. Entries right at the
        // midpoint land on the ask side; noisy partial snapshots make exact
        // best-bid/ask recovery impossible here, and that is accepted.
        let mut bids: Vec<DepthEntry> = Vec::new();
        let mut asks: Vec<DepthEntry> = Vec::new();
        for &entry in &filtered {
            let mid = venue_mid.get(&entry.venue).copied().unwrap_or(global_mean);
            if entry.price < mid {
                bids.push(entry.clone());
            } else {
                asks.push(entry.clone());
            }
        }

        // Stable sorts keep first-seen order among equal prices.
        bids.sort_by_key(|e| Reverse(OrderedFloat(e.price)));
        asks.sort_by_key(|e| OrderedFloat(e.price));

        let mut min_price = f64::MAX;
        let mut max_price = f64::MIN;
        let mut max_quantity: f64 = 0.0;
        for &entry in &filtered {
            min_price = min_price.min(entry.price);
            max_price = max_price.max(entry.price);
            max_quantity = max_quantity.max(entry.quantity);
        }

        let mut pressure_zones = Vec::new();
        if self.detect_zones {
            let threshold = self.zone_config.seed_ratio * max_quantity;
            for group in groups.values() {
                let group_entries: Vec<DepthEntry> =
                    group.iter().map(|e| (*e).clone()).collect();
                pressure_zones.extend(detect_zones(
                    &group_entries,
                    threshold,
                    global_mean,
                    &self.zone_config,
                ));
            }
            pressure_zones.sort_by_key(|z| Reverse(OrderedFloat(z.pressure_score)));
        }

        AggregateView {
            bids,
            asks,
            pressure_zones,
            min_price,
            max_price,
            max_quantity,
            last_updated: now_ms,
        }
    }
}
