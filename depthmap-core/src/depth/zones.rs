//! Pressure-zone clustering over integer price buckets

use std::collections::{BTreeMap, BTreeSet};

use crate::venues::{DepthEntry, Side};

/// Clustering constants.
///
/// The scan radius and half-threshold growth ratio are tuning knobs carried
/// as configuration, with the defaults the system ships with.
#[derive(Clone, Copy, Debug)]
pub struct ZoneConfig {
    /// Seed threshold as a fraction of the pass's max single-entry quantity.
    pub seed_ratio: f64,
    /// Fraction of the seed threshold a neighbor bucket must hold for the
    /// zone to keep growing in that direction.
    pub growth_ratio: f64,
    /// Maximum buckets scanned below and above a seed.
    pub scan_radius: i64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            seed_ratio: 0.2,
            growth_ratio: 0.5,
            scan_radius: 5,
        }
    }
}

/// A contiguous run of price buckets whose aggregated volume clears the
/// detection threshold. Derived data: recomputed from scratch on every pass,
/// never mutated incrementally.
#[derive(Clone, Debug, PartialEq)]
pub struct PressureZone {
    pub min_price: f64,
    pub max_price: f64,
    pub total_volume: f64,
    pub pressure_score: f64,
    pub side: Side,
    pub entries: Vec<DepthEntry>,
}

#[derive(Default)]
struct Bucket {
    volume: f64,
    entries: Vec<DepthEntry>,
}

/// Cluster one venue group's entries into pressure zones.
///
/// Buckets are visited in ascending price order. A bucket seeds a zone when
/// its summed quantity reaches `threshold`; the zone then grows outward up to
/// `scan_radius` buckets per direction while each next neighbor holds at
/// least `growth_ratio * threshold`, stopping at the first that does not.
/// Absorbed buckets are claimed and can neither seed nor join a later zone.
///
/// `reference_price` labels the zone side: a zone whose first entry sits
/// below it is a bid zone, otherwise an ask zone. A threshold of 0 would
/// make every nonempty bucket a seed.
pub fn detect_zones(
    entries: &[DepthEntry],
    threshold: f64,
    reference_price: f64,
    config: &ZoneConfig,
) -> Vec<PressureZone> {
    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for entry in entries {
        let key = entry.price.round() as i64;
        let bucket = buckets.entry(key).or_default();
        bucket.volume += entry.quantity;
        bucket.entries.push(entry.clone());
    }

    let keys: Vec<i64> = buckets.keys().copied().collect();
    let mut claimed: BTreeSet<i64> = BTreeSet::new();
    let mut zones = Vec::new();
    let half = threshold * config.growth_ratio;

    for &seed in &keys {
        if claimed.contains(&seed) {
            continue;
        }
        let bucket = &buckets[&seed];
        if bucket.volume < threshold {
            continue;
        }

        claimed.insert(seed);
        let mut zone_entries = bucket.entries.clone();
        let mut total_volume = bucket.volume;
        let mut low = seed;
        let mut high = seed;

        for step in 1..=config.scan_radius {
            let candidate = seed - step;
            match buckets.get(&candidate) {
                Some(neighbor) if neighbor.volume >= half && !claimed.contains(&candidate) => {
                    claimed.insert(candidate);
                    zone_entries.extend(neighbor.entries.iter().cloned());
                    total_volume += neighbor.volume;
                    low = candidate;
                }
                _ => break,
            }
        }

        for step in 1..=config.scan_radius {
            let candidate = seed + step;
            match buckets.get(&candidate) {
                Some(neighbor) if neighbor.volume >= half && !claimed.contains(&candidate) => {
                    claimed.insert(candidate);
                    zone_entries.extend(neighbor.entries.iter().cloned());
                    total_volume += neighbor.volume;
                    high = candidate;
                }
                _ => break,
            }
        }

        let side = if zone_entries[0].price < reference_price {
            Side::Bid
        } else {
            Side::Ask
        };
        let span = (high - low) as f64 + 1.0;

        zones.push(PressureZone {
            min_price: low as f64,
            max_price: high as f64,
            total_volume,
            pressure_score: total_volume * span,
            side,
            entries: zone_entries,
        });
    }

    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::VenueId;

    fn entry(price: f64, quantity: f64) -> DepthEntry {
        DepthEntry::new(price, quantity, VenueId::new("test"), 0)
    }

    #[test]
    fn test_single_bucket_zone_scores_its_volume() {
        let entries = vec![entry(99.0, 8.0)];
        let zones = detect_zones(&entries, 1.6, 100.0, &ZoneConfig::default());

        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        assert_eq!(zone.min_price, 99.0);
        assert_eq!(zone.max_price, 99.0);
        assert_eq!(zone.total_volume, 8.0);
        // Volume times (span + 1) with a one-bucket span.
        assert_eq!(zone.pressure_score, 8.0);
        assert_eq!(zone.side, Side::Bid);
    }

    #[test]
    fn test_score_rewards_breadth() {
        // Seed at 100 absorbs 101; score doubles from the two-bucket span.
        let entries = vec![entry(100.0, 5.0), entry(101.0, 3.0)];
        let zones = detect_zones(&entries, 1.6, 90.0, &ZoneConfig::default());

        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        assert_eq!(zone.min_price, 100.0);
        assert_eq!(zone.max_price, 101.0);
        assert_eq!(zone.total_volume, 8.0);
        assert_eq!(zone.pressure_score, 16.0);
        assert_eq!(zone.side, Side::Ask);
        assert_eq!(
            zone.pressure_score,
            zone.total_volume * (zone.max_price - zone.min_price + 1.0)
        );
    }

    #[test]
    fn test_growth_stops_at_first_thin_bucket() {
        // 102 fails the half-threshold test, so 103 must not be reached even
        // though it would pass on its own.
        let entries = vec![
            entry(100.0, 10.0),
            entry(101.0, 6.0),
            entry(102.0, 1.0),
            entry(103.0, 9.0),
        ];
        let config = ZoneConfig::default();
        let zones = detect_zones(&entries, 10.0, 0.0, &config);

        let first = zones.iter().find(|z| z.min_price == 100.0).unwrap();
        assert_eq!(first.max_price, 101.0);
        assert_eq!(first.total_volume, 16.0);
    }

    #[test]
    fn test_claimed_buckets_cannot_reseed() {
        // 101 is absorbed by the zone seeded at 100 and must not produce a
        // second zone of its own, even though it clears the seed threshold.
        let entries = vec![entry(100.0, 10.0), entry(101.0, 10.0)];
        let zones = detect_zones(&entries, 5.0, 0.0, &ZoneConfig::default());

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].total_volume, 20.0);
    }

    #[test]
    fn test_scan_radius_bounds_growth() {
        // Seven consecutive heavy buckets above the seed; only five join.
        let mut entries = vec![entry(100.0, 10.0)];
        for i in 1..=7 {
            entries.push(entry(100.0 + i as f64, 10.0));
        }
        let zones = detect_zones(&entries, 10.0, 0.0, &ZoneConfig::default());

        assert_eq!(zones[0].max_price, 105.0);
        assert_eq!(zones[0].total_volume, 60.0);
        // The two buckets beyond the radius seed their own zone.
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[1].min_price, 106.0);
        assert_eq!(zones[1].max_price, 107.0);
    }

    #[test]
    fn test_below_threshold_group_produces_no_zones() {
        let entries = vec![entry(100.0, 0.5), entry(104.0, 0.3)];
        let zones = detect_zones(&entries, 2.0, 100.0, &ZoneConfig::default());
        assert!(zones.is_empty());
    }

    #[test]
    fn test_fractional_prices_bucket_to_nearest_integer() {
        let entries = vec![entry(99.6, 4.0), entry(100.2, 4.0)];
        let zones = detect_zones(&entries, 8.0, 0.0, &ZoneConfig::default());

        // Both entries round into bucket 100.
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].min_price, 100.0);
        assert_eq!(zones[0].max_price, 100.0);
        assert_eq!(zones[0].entries.len(), 2);
    }
}
