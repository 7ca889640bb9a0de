pub mod api;
pub mod catalog;
pub mod snapshot;
pub mod stats;
pub mod tracking;
pub mod units;

use std::collections::BTreeMap;

use unicode_normalization::UnicodeNormalization;

pub use snapshot::RemoteProgressSnapshot;
pub use tracking::{Blueprints, TrackingMap, TrackingPatch, TrackingRecord};
pub use units::Unit;

/// Separates the brand and model parts of a vehicle key.
pub const CAR_KEY_JOINER: &str = "::";

/// Derive the key that joins catalog data and tracking data.
///
/// Each part is NFKC-normalized, trimmed, has its whitespace runs collapsed to a single `-` and
/// is lowercased, so `("Lamborghini", " Huracán  EVO ")` and `("lamborghini", "huracán evo")`
/// produce the same key. Empty parts still produce a (degenerate) key.
pub fn generate_car_key(brand: &str, model: &str) -> String {
    format!(
        "{}{CAR_KEY_JOINER}{}",
        normalize_key_part(brand),
        normalize_key_part(model)
    )
}

/// One half of a vehicle key. Also used to key per-brand data.
pub fn normalize_key_part(part: &str) -> String {
    let normalized = part.nfkc().collect::<String>();
    normalized
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

#[derive(
    Clone,
    Copy,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    parse_display::Display,
    parse_display::FromStr,
    tsify::Tsify,
    schemars::JsonSchema,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum CarClass {
    D,
    C,
    B,
    A,
    S,
}

#[derive(
    Clone,
    Copy,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    parse_display::Display,
    parse_display::FromStr,
    tsify::Tsify,
    schemars::JsonSchema,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
#[display(style = "lowercase")]
pub enum Tier {
    Stock,
    Max,
    Gold,
}

/// Performance figures for one upgrade tier. Speeds are always stored in km/h.
#[derive(
    Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, tsify::Tsify, schemars::JsonSchema,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub tier: Tier,
    pub rank: u32,
    pub top_speed_kmh: f64,
    pub acceleration: f64,
    pub handling: f64,
    pub nitro: f64,
}

/// A catalog entry, as served by the catalog endpoints.
#[derive(
    Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, tsify::Tsify, schemars::JsonSchema,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub slug: String,
    pub class: CarClass,
    /// The highest star rank this vehicle can reach.
    pub max_stars: u8,
    /// Only obtainable through a key item.
    #[serde(default)]
    pub key_vehicle: bool,
    /// Blueprints needed to reach each star rank.
    #[serde(default)]
    pub blueprints_per_star: BTreeMap<u8, u32>,
    #[serde(default)]
    pub tiers: Vec<TierStats>,
}

impl Vehicle {
    pub fn key(&self) -> String {
        generate_car_key(&self.brand, &self.model)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.brand.trim(), self.model.trim())
    }

    pub fn blueprints_required(&self) -> u64 {
        self.blueprints_per_star.values().map(|&n| u64::from(n)).sum()
    }
}
