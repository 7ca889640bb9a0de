//! Per-vehicle progress records and the map that holds them.
//!
//! Stored data may have been written by older builds or edited by hand, so parsing is lenient:
//! a missing or invalid field falls back to its default without discarding the rest of the
//! record, and an invalid record falls back to the default record without discarding the map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Blueprints {
    #[serde(default)]
    pub owned_by_star: BTreeMap<u8, u32>,
}

impl Blueprints {
    pub fn is_empty(&self) -> bool {
        self.owned_by_star.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.owned_by_star.values().map(|&n| u64::from(n)).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    #[serde(default)]
    pub owned: bool,
    /// Current star rank. 0 if not owned.
    #[serde(default)]
    pub stars: u8,
    /// Implies `owned`.
    #[serde(default)]
    pub gold_maxed: bool,
    /// Only meaningful for key vehicles.
    #[serde(default)]
    pub key_obtained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_stage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_parts: Option<u32>,
    #[serde(default, skip_serializing_if = "Blueprints::is_empty")]
    pub blueprints: Blueprints,
}

/// A partial update to a [`TrackingRecord`]. Fields left as `None` keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct TrackingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_maxed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_obtained: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_stage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_parts: Option<u32>,
    /// Blueprint counts per star. Merged star by star unless `replace_blueprints` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprints: Option<BTreeMap<u8, u32>>,
    #[serde(default)]
    pub replace_blueprints: bool,
}

impl TrackingPatch {
    pub fn owned(owned: bool) -> Self {
        Self {
            owned: Some(owned),
            ..Self::default()
        }
    }

    pub fn stars(stars: u8) -> Self {
        Self {
            stars: Some(stars),
            ..Self::default()
        }
    }

    pub fn gold_maxed(gold_maxed: bool) -> Self {
        Self {
            gold_maxed: Some(gold_maxed),
            ..Self::default()
        }
    }

    pub fn key_obtained(key_obtained: bool) -> Self {
        Self {
            key_obtained: Some(key_obtained),
            ..Self::default()
        }
    }

    pub fn blueprint(star: u8, count: u32) -> Self {
        Self {
            blueprints: Some(BTreeMap::from([(star, count)])),
            ..Self::default()
        }
    }

    pub fn replace_blueprints(owned_by_star: BTreeMap<u8, u32>) -> Self {
        Self {
            blueprints: Some(owned_by_star),
            replace_blueprints: true,
            ..Self::default()
        }
    }
}

impl TrackingRecord {
    /// Merge `patch` into this record and restore the record's invariants.
    ///
    /// Revoking the key revokes ownership and gold-maxed status but leaves `stars` alone.
    pub fn apply(&mut self, patch: &TrackingPatch) {
        if let Some(owned) = patch.owned {
            self.owned = owned;
        }
        if let Some(stars) = patch.stars {
            self.stars = stars;
        }
        if let Some(gold_maxed) = patch.gold_maxed {
            self.gold_maxed = gold_maxed;
        }
        if let Some(upgrade_stage) = patch.upgrade_stage {
            self.upgrade_stage = Some(upgrade_stage);
        }
        if let Some(import_parts) = patch.import_parts {
            self.import_parts = Some(import_parts);
        }
        if let Some(blueprints) = &patch.blueprints {
            if patch.replace_blueprints {
                self.blueprints.owned_by_star = blueprints.clone();
            } else {
                self.blueprints
                    .owned_by_star
                    .extend(blueprints.iter().map(|(&star, &count)| (star, count)));
            }
        }

        if patch.owned == Some(false) {
            self.gold_maxed = false;
        }
        if self.gold_maxed {
            self.owned = true;
        }

        match patch.key_obtained {
            Some(true) => {
                self.key_obtained = true;
                self.owned = true;
            }
            Some(false) => {
                self.key_obtained = false;
                self.owned = false;
                self.gold_maxed = false;
            }
            None => {}
        }
    }

    pub fn with_patch(mut self, patch: &TrackingPatch) -> Self {
        self.apply(patch);
        self
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn from_json_lenient(value: &serde_json::Value) -> Self {
        let Some(object) = value.as_object() else {
            log::warn!("Tracking record is not an object, using defaults: {value}");
            return Self::default();
        };

        let owned_by_star = object
            .get("blueprints")
            .and_then(|blueprints| blueprints.get("ownedByStar"))
            .map(lenient_star_counts)
            .unwrap_or_default();

        Self {
            owned: lenient_field(object, "owned").unwrap_or_default(),
            stars: lenient_field(object, "stars").unwrap_or_default(),
            gold_maxed: lenient_field(object, "goldMaxed").unwrap_or_default(),
            key_obtained: lenient_field(object, "keyObtained").unwrap_or_default(),
            upgrade_stage: lenient_field(object, "upgradeStage"),
            import_parts: lenient_field(object, "importParts"),
            blueprints: Blueprints { owned_by_star },
        }
    }
}

/// Parse one field of a JSON object, treating absence, `null`, and type mismatches as `None`.
pub(crate) fn lenient_field<T: DeserializeOwned>(
    object: &serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> Option<T> {
    let value = object.get(name)?;
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value.clone())
        .inspect_err(|e| log::warn!("Ignoring invalid `{name}` ({value}): {e}"))
        .ok()
}

/// Parse a `{ "<star>": <count> }` object, skipping entries that don't fit.
pub(crate) fn lenient_star_counts(value: &serde_json::Value) -> BTreeMap<u8, u32> {
    let Some(object) = value.as_object() else {
        return BTreeMap::new();
    };
    object
        .iter()
        .filter_map(|(star, count)| {
            let star = star.trim().parse::<u8>().ok()?;
            let count = count
                .as_u64()
                .and_then(|count| u32::try_from(count).ok())?;
            Some((star, count))
        })
        .collect()
}

/// All tracked vehicles, by vehicle key. Absent keys read as the default record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingMap(im::OrdMap<String, TrackingRecord>);

impl TrackingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> TrackingRecord {
        self.0.get(key).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, key: String, record: TrackingRecord) {
        self.0.insert(key, record);
    }

    /// Apply `patch` to the record for `key` (creating it if needed) and return the result.
    pub fn update(&mut self, key: &str, patch: &TrackingPatch) -> TrackingRecord {
        let record = self.get(key).with_patch(patch);
        self.0.insert(key.to_string(), record.clone());
        record
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrackingRecord)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_json_lenient(value: &serde_json::Value) -> Self {
        let Some(object) = value.as_object() else {
            log::warn!("Tracking map is not an object, starting empty");
            return Self::default();
        };
        object
            .iter()
            .map(|(key, record)| (key.clone(), TrackingRecord::from_json_lenient(record)))
            .collect()
    }
}

impl FromIterator<(String, TrackingRecord)> for TrackingMap {
    fn from_iter<I: IntoIterator<Item = (String, TrackingRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
