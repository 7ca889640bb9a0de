//! Collection statistics. Everything here is a pure fold over the catalog and the tracking map,
//! so the numbers can be recomputed whenever either changes.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::{TrackingMap, TrackingRecord, Vehicle};

/// `part / total` as a percentage. A zero total yields 0, never NaN.
pub fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

/// Owned and upgraded to the vehicle's highest star rank.
pub fn is_maxed(vehicle: &Vehicle, record: &TrackingRecord) -> bool {
    record.owned && record.stars >= vehicle.max_stars
}

/// Vehicles grouped by the highest star rank they can reach.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct RankBucket {
    pub max_stars: u8,
    pub total: usize,
    pub owned: usize,
    pub unowned: usize,
    /// Owned vehicles at their highest star rank.
    pub maxed: usize,
    pub percent_owned: f64,
    /// `maxed` as a share of `owned`.
    pub percent_maxed: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct KeyVehicleProgress {
    pub total: usize,
    pub keys_obtained: usize,
    pub owned: usize,
    pub percent_obtained: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintProgress {
    pub required: u64,
    /// Owned blueprints, capped per star at what that star needs.
    pub owned: u64,
    pub percent: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total_cars: usize,
    pub total_owned: usize,
    /// Owned vehicles the user marked gold-maxed.
    pub gold_maxed: usize,
    pub percent_owned: f64,
    /// Owned vehicles by the star rank they currently have.
    pub owned_by_current_stars: BTreeMap<u8, usize>,
    /// One bucket per distinct maximum star rank in the catalog, ascending.
    pub by_max_stars: Vec<RankBucket>,
    pub key_vehicles: KeyVehicleProgress,
    pub blueprints: BlueprintProgress,
}

impl CollectionStats {
    pub fn bucket(&self, max_stars: u8) -> Option<&RankBucket> {
        self.by_max_stars
            .iter()
            .find(|bucket| bucket.max_stars == max_stars)
    }
}

pub fn collection_stats(catalog: &[Vehicle], tracking: &TrackingMap) -> CollectionStats {
    let mut stats = CollectionStats::default();
    let mut buckets: BTreeMap<u8, RankBucket> = BTreeMap::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut blueprints_owned: u64 = 0;

    for vehicle in catalog {
        let key = vehicle.key();
        if !seen.insert(key.clone()) {
            log::warn!("Duplicate vehicle in catalog: {key}");
            continue;
        }
        let record = tracking.get(&key);

        stats.total_cars += 1;
        stats.blueprints.required += vehicle.blueprints_required();
        blueprints_owned += vehicle
            .blueprints_per_star
            .iter()
            .map(|(star, &needed)| {
                let have = record
                    .blueprints
                    .owned_by_star
                    .get(star)
                    .copied()
                    .unwrap_or(0);
                u64::from(have.min(needed))
            })
            .sum::<u64>();

        let bucket = buckets
            .entry(vehicle.max_stars)
            .or_insert_with(|| RankBucket {
                max_stars: vehicle.max_stars,
                ..RankBucket::default()
            });
        bucket.total += 1;

        if vehicle.key_vehicle {
            stats.key_vehicles.total += 1;
            if record.key_obtained {
                stats.key_vehicles.keys_obtained += 1;
            }
            if record.owned {
                stats.key_vehicles.owned += 1;
            }
        }

        if !record.owned {
            continue;
        }

        stats.total_owned += 1;
        if record.gold_maxed {
            stats.gold_maxed += 1;
        }
        *stats
            .owned_by_current_stars
            .entry(record.stars)
            .or_default() += 1;
        bucket.owned += 1;
        if is_maxed(vehicle, &record) {
            bucket.maxed += 1;
        }
    }

    stats.by_max_stars = buckets
        .into_values()
        .map(|mut bucket| {
            bucket.unowned = bucket.total - bucket.owned;
            bucket.percent_owned = percent(bucket.owned, bucket.total);
            bucket.percent_maxed = percent(bucket.maxed, bucket.owned);
            bucket
        })
        .collect();
    stats.percent_owned = percent(stats.total_owned, stats.total_cars);
    stats.key_vehicles.percent_obtained =
        percent(stats.key_vehicles.keys_obtained, stats.key_vehicles.total);
    stats.blueprints.owned = blueprints_owned;
    stats.blueprints.percent = if stats.blueprints.required == 0 {
        0.0
    } else {
        blueprints_owned as f64 * 100.0 / stats.blueprints.required as f64
    };
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TrackingPatch, test_support::vehicle};

    #[test]
    fn percent_of_nothing_is_zero() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(5, 0), 0.0);
        assert!(!percent(0, 0).is_nan());
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn empty_catalog_has_zeroed_stats() {
        let stats = collection_stats(&[], &TrackingMap::new());
        assert_eq!(stats.total_cars, 0);
        assert_eq!(stats.percent_owned, 0.0);
        assert_eq!(stats.blueprints.percent, 0.0);
        assert!(stats.by_max_stars.is_empty());
    }

    #[test]
    fn ten_four_star_cars_three_owned_and_maxed() {
        let catalog: Vec<Vehicle> = (0..10)
            .map(|i| vehicle("Brand", &format!("Model {i}"), 4))
            .collect();
        let mut tracking = TrackingMap::new();
        for v in &catalog[..3] {
            tracking.update(
                &v.key(),
                &TrackingPatch {
                    owned: Some(true),
                    stars: Some(4),
                    ..Default::default()
                },
            );
        }

        let stats = collection_stats(&catalog, &tracking);
        let bucket = stats.bucket(4).unwrap();
        assert_eq!(bucket.owned, 3);
        assert_eq!(bucket.unowned, 7);
        assert_eq!(bucket.maxed, 3);
        assert_eq!(bucket.percent_maxed, 100.0);
        assert_eq!(stats.total_owned, 3);
        assert_eq!(stats.percent_owned, 30.0);
    }

    #[test]
    fn current_star_and_max_star_aggregations_are_distinct() {
        let catalog = vec![
            vehicle("A", "Three", 3),
            vehicle("B", "Five", 5),
            vehicle("C", "Five Too", 5),
        ];
        let mut tracking = TrackingMap::new();
        tracking.update(&catalog[0].key(), &TrackingPatch::owned(true));
        tracking.update(&catalog[0].key(), &TrackingPatch::stars(3));
        tracking.update(&catalog[1].key(), &TrackingPatch::owned(true));
        tracking.update(&catalog[1].key(), &TrackingPatch::stars(3));

        let stats = collection_stats(&catalog, &tracking);
        assert_eq!(stats.owned_by_current_stars, BTreeMap::from([(3, 2)]));
        assert_eq!(stats.bucket(3).unwrap().owned, 1);
        assert_eq!(stats.bucket(3).unwrap().maxed, 1);
        assert_eq!(stats.bucket(5).unwrap().owned, 1);
        assert_eq!(stats.bucket(5).unwrap().maxed, 0);
        assert_eq!(stats.bucket(5).unwrap().percent_maxed, 0.0);
    }

    #[test]
    fn gold_maxed_counts_only_flagged_owned_records() {
        let catalog = vec![vehicle("A", "One", 3), vehicle("A", "Two", 3)];
        let mut tracking = TrackingMap::new();
        tracking.update(&catalog[0].key(), &TrackingPatch::gold_maxed(true));
        let stats = collection_stats(&catalog, &tracking);
        assert_eq!(stats.gold_maxed, 1);
        assert_eq!(stats.total_owned, 1);
    }

    #[test]
    fn key_vehicles_and_blueprints_are_tallied() {
        let mut key_car = vehicle("K", "Key", 5);
        key_car.key_vehicle = true;
        key_car.blueprints_per_star = BTreeMap::from([(1, 10), (2, 20)]);
        let catalog = vec![key_car.clone(), vehicle("K", "Other", 5)];

        let mut tracking = TrackingMap::new();
        tracking.update(&key_car.key(), &TrackingPatch::key_obtained(true));
        // more than needed for star 1 counts as exactly enough
        tracking.update(&key_car.key(), &TrackingPatch::blueprint(1, 15));
        tracking.update(&key_car.key(), &TrackingPatch::blueprint(2, 5));

        let stats = collection_stats(&catalog, &tracking);
        assert_eq!(stats.key_vehicles.total, 1);
        assert_eq!(stats.key_vehicles.keys_obtained, 1);
        assert_eq!(stats.key_vehicles.owned, 1);
        assert_eq!(stats.key_vehicles.percent_obtained, 100.0);
        assert_eq!(stats.blueprints.required, 30);
        assert_eq!(stats.blueprints.owned, 15);
        assert_eq!(stats.blueprints.percent, 50.0);
    }

    #[test]
    fn tracking_for_unknown_vehicles_and_duplicates_are_ignored() {
        let catalog = vec![vehicle("A", "One", 3), vehicle("a", " one ", 3)];
        let mut tracking = TrackingMap::new();
        tracking.update(&catalog[0].key(), &TrackingPatch::owned(true));
        tracking.update("ghost::car", &TrackingPatch::owned(true));

        let stats = collection_stats(&catalog, &tracking);
        assert_eq!(stats.total_cars, 1);
        assert_eq!(stats.total_owned, 1);
    }
}
