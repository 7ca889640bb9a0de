use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::tracking::{TrackingMap, lenient_field, lenient_star_counts};

/// The shape the account backend stores: tracking state flattened into key lists and maps.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    tsify::Tsify,
    schemars::JsonSchema,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProgressSnapshot {
    #[serde(default)]
    pub owned_cars: Vec<String>,
    #[serde(default)]
    pub gold_maxed_cars: Vec<String>,
    #[serde(default)]
    pub key_obtained_cars: Vec<String>,
    #[serde(default)]
    pub star_ranks: BTreeMap<String, u8>,
    #[serde(default)]
    pub blueprints: BTreeMap<String, BTreeMap<u8, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garage_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<u64>,
}

impl RemoteProgressSnapshot {
    pub fn from_tracking_map(map: &TrackingMap) -> Self {
        let mut snapshot = Self::default();
        // the map iterates in key order, so the lists come out sorted
        for (key, record) in map.iter() {
            if record.owned {
                snapshot.owned_cars.push(key.clone());
            }
            if record.gold_maxed {
                snapshot.gold_maxed_cars.push(key.clone());
            }
            if record.key_obtained {
                snapshot.key_obtained_cars.push(key.clone());
            }
            if record.stars > 0 {
                snapshot.star_ranks.insert(key.clone(), record.stars);
            }
            if !record.blueprints.is_empty() {
                snapshot
                    .blueprints
                    .insert(key.clone(), record.blueprints.owned_by_star.clone());
            }
        }
        snapshot
    }

    pub fn with_garage_level(mut self, garage_level: Option<u32>, xp: Option<u64>) -> Self {
        self.garage_level = garage_level;
        self.xp = xp;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mentioned_keys().is_empty()
    }

    /// Every vehicle key the snapshot says anything about.
    pub fn mentioned_keys(&self) -> BTreeSet<&str> {
        self.owned_cars
            .iter()
            .chain(&self.gold_maxed_cars)
            .chain(&self.key_obtained_cars)
            .chain(self.star_ranks.keys())
            .chain(self.blueprints.keys())
            .map(String::as_str)
            .collect()
    }

    /// Hash of the serialized snapshot, used to skip pushing a snapshot that was already pushed.
    pub fn content_hash(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        xxh3_64(&bytes)
    }

    /// Merge this (remote) snapshot into `local`.
    ///
    /// For every key the snapshot mentions, ownership, gold-maxed and key-obtained status come
    /// from the snapshot, and stars and blueprints come from the snapshot when it has them.
    /// Keys the snapshot doesn't mention, and fields it doesn't carry, keep their local values.
    pub fn reconcile_into(&self, local: &TrackingMap) -> TrackingMap {
        let owned: BTreeSet<&str> = self.owned_cars.iter().map(String::as_str).collect();
        let gold_maxed: BTreeSet<&str> = self.gold_maxed_cars.iter().map(String::as_str).collect();
        let key_obtained: BTreeSet<&str> =
            self.key_obtained_cars.iter().map(String::as_str).collect();

        let mut merged = local.clone();
        for key in self.mentioned_keys() {
            let mut record = local.get(key);
            record.gold_maxed = gold_maxed.contains(key);
            record.key_obtained = key_obtained.contains(key);
            record.owned = owned.contains(key) || record.gold_maxed || record.key_obtained;
            if let Some(&stars) = self.star_ranks.get(key) {
                record.stars = stars;
            }
            if let Some(blueprints) = self.blueprints.get(key) {
                record.blueprints.owned_by_star = blueprints.clone();
            }
            merged.insert(key.to_string(), record);
        }
        merged
    }

    pub fn to_tracking_map(&self) -> TrackingMap {
        self.reconcile_into(&TrackingMap::default())
    }

    pub fn from_json_lenient(value: &serde_json::Value) -> Self {
        let Some(object) = value.as_object() else {
            log::warn!("Remote progress is not an object, treating it as empty");
            return Self::default();
        };

        let key_list = |name: &str| -> Vec<String> {
            object
                .get(name)
                .and_then(|list| list.as_array())
                .map(|list| {
                    list.iter()
                        .filter_map(|key| key.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        let star_ranks = object
            .get("starRanks")
            .and_then(|ranks| ranks.as_object())
            .map(|ranks| {
                ranks
                    .iter()
                    .filter_map(|(key, stars)| {
                        let stars = u8::try_from(stars.as_u64()?).ok()?;
                        Some((key.clone(), stars))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let blueprints = object
            .get("blueprints")
            .and_then(|blueprints| blueprints.as_object())
            .map(|blueprints| {
                blueprints
                    .iter()
                    .map(|(key, by_star)| (key.clone(), lenient_star_counts(by_star)))
                    .filter(|(_, by_star)| !by_star.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            owned_cars: key_list("ownedCars"),
            gold_maxed_cars: key_list("goldMaxedCars"),
            key_obtained_cars: key_list("keyObtainedCars"),
            star_ranks,
            blueprints,
            garage_level: lenient_field(object, "garageLevel"),
            xp: lenient_field(object, "xp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackingPatch;
    use serde_json::json;

    fn sample_map() -> TrackingMap {
        let mut map = TrackingMap::new();
        map.update("a::one", &TrackingPatch::owned(true));
        map.update("a::one", &TrackingPatch::stars(3));
        map.update("b::two", &TrackingPatch::gold_maxed(true));
        map.update("c::key", &TrackingPatch::key_obtained(true));
        map.update("d::bp", &TrackingPatch::blueprint(1, 5));
        map
    }

    #[test]
    fn projection_lists_each_fact_once() {
        let snapshot = RemoteProgressSnapshot::from_tracking_map(&sample_map());
        assert_eq!(snapshot.owned_cars, vec!["a::one", "b::two", "c::key"]);
        assert_eq!(snapshot.gold_maxed_cars, vec!["b::two"]);
        assert_eq!(snapshot.key_obtained_cars, vec!["c::key"]);
        assert_eq!(snapshot.star_ranks, BTreeMap::from([("a::one".to_string(), 3)]));
        assert_eq!(
            snapshot.blueprints,
            BTreeMap::from([("d::bp".to_string(), BTreeMap::from([(1, 5)]))])
        );
    }

    #[test]
    fn wire_format_is_camel_case() {
        let snapshot = RemoteProgressSnapshot {
            owned_cars: vec!["a::one".into()],
            garage_level: Some(12),
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["ownedCars"], json!(["a::one"]));
        assert_eq!(value["garageLevel"], json!(12));
        assert!(value.get("xp").is_none());
    }

    #[test]
    fn reconciliation_keeps_local_only_entries() {
        let mut local = TrackingMap::new();
        local.update("car::a", &TrackingPatch::owned(true));
        let remote = RemoteProgressSnapshot {
            owned_cars: vec!["car::b".into()],
            ..Default::default()
        };

        let merged = remote.reconcile_into(&local);
        assert!(merged.get("car::a").owned);
        assert!(merged.get("car::b").owned);
    }

    #[test]
    fn remote_is_authoritative_for_keys_it_mentions() {
        let mut local = TrackingMap::new();
        local.update("car::a", &TrackingPatch::gold_maxed(true));
        local.update(
            "car::a",
            &TrackingPatch {
                upgrade_stage: Some(4),
                import_parts: Some(9),
                ..Default::default()
            },
        );
        let remote = RemoteProgressSnapshot {
            star_ranks: BTreeMap::from([("car::a".to_string(), 2)]),
            ..Default::default()
        };

        let record = remote.reconcile_into(&local).get("car::a");
        assert!(!record.owned);
        assert!(!record.gold_maxed);
        assert_eq!(record.stars, 2);
        // fields the backend doesn't carry stay local
        assert_eq!(record.upgrade_stage, Some(4));
        assert_eq!(record.import_parts, Some(9));
    }

    #[test]
    fn remote_key_grants_ownership() {
        let remote = RemoteProgressSnapshot {
            key_obtained_cars: vec!["car::k".into()],
            ..Default::default()
        };
        let record = remote.reconcile_into(&TrackingMap::new()).get("car::k");
        assert!(record.key_obtained);
        assert!(record.owned);
        assert!(!record.gold_maxed);
    }

    #[test]
    fn round_trip_through_snapshot_preserves_synced_fields() {
        let map = sample_map();
        let back = RemoteProgressSnapshot::from_tracking_map(&map).to_tracking_map();
        for (key, record) in map.iter() {
            let restored = back.get(key);
            assert_eq!(restored.owned, record.owned, "{key}");
            assert_eq!(restored.stars, record.stars, "{key}");
            assert_eq!(restored.gold_maxed, record.gold_maxed, "{key}");
            assert_eq!(restored.key_obtained, record.key_obtained, "{key}");
            assert_eq!(restored.blueprints, record.blueprints, "{key}");
        }
    }

    #[test]
    fn identical_snapshots_hash_identically() {
        let a = RemoteProgressSnapshot::from_tracking_map(&sample_map());
        let b = RemoteProgressSnapshot::from_tracking_map(&sample_map());
        assert_eq!(a.content_hash(), b.content_hash());

        let mut changed = sample_map();
        changed.update("e::new", &TrackingPatch::owned(true));
        let c = RemoteProgressSnapshot::from_tracking_map(&changed);
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn malformed_remote_fields_fall_back_individually() {
        let snapshot = RemoteProgressSnapshot::from_json_lenient(&json!({
            "ownedCars": ["a::one", 7, null],
            "goldMaxedCars": "nope",
            "starRanks": { "a::one": 4, "b::two": 900 },
            "blueprints": { "a::one": { "1": 3 }, "b::two": [] },
            "garageLevel": "high",
            "xp": 1200
        }));
        assert_eq!(snapshot.owned_cars, vec!["a::one"]);
        assert!(snapshot.gold_maxed_cars.is_empty());
        assert_eq!(snapshot.star_ranks, BTreeMap::from([("a::one".to_string(), 4)]));
        assert_eq!(snapshot.blueprints.len(), 1);
        assert_eq!(snapshot.garage_level, None);
        assert_eq!(snapshot.xp, Some(1200));
    }

    #[test]
    fn empty_snapshot_leaves_local_untouched() {
        let local = sample_map();
        let merged = RemoteProgressSnapshot::default().reconcile_into(&local);
        assert_eq!(merged, local);
        assert!(RemoteProgressSnapshot::default().is_empty());
        assert!(merged.get("zzz").is_default());
    }
}
