//! Scalar user preferences, one storage slot each.
//!
//! Values are stored as JSON. Older builds wrote some of them as bare strings (`metric`, `on`),
//! which are still accepted. Anything missing or unreadable reads as the default.

use chrono::{DateTime, Utc};
use depot::{Depot, StorageError};
use garage_utils::{CarClass, Unit};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub const PREFERRED_UNIT_KEY: &str = "preferredUnit";
pub const TRACKER_MODE_KEY: &str = "trackerMode";
pub const CARS_PER_PAGE_KEY: &str = "carsPerPage";
pub const CURRENT_PAGE_KEY: &str = "currentPage";
pub const LEGEND_STORE_FILTERS_KEY: &str = "legendStoreFilters";
pub const GARAGE_LEVEL_KEY: &str = "garageLevel";
pub const PREFERENCES_TOPIC: &str = "preferences:updated";

pub const DEFAULT_CARS_PER_PAGE: u32 = 25;
pub const DEFAULT_CURRENT_PAGE: u32 = 1;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    parse_display::Display,
    tsify::Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "lowercase")]
#[display(style = "lowercase")]
pub enum TrackerMode {
    On,
    #[default]
    Off,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct LegendStoreFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<CarClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<u32>,
    #[serde(default)]
    pub hide_owned: bool,
}

/// The player's garage level as they last entered it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct GarageLevel {
    pub level: u32,
    #[serde(default)]
    pub xp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Parse a stored preference, accepting a bare string where JSON was expected.
fn read_preference<T: DeserializeOwned>(depot: &Depot, key: &str) -> Option<T> {
    let raw = depot.read(key)?;
    serde_json::from_str(&raw)
        .or_else(|_| serde_json::from_value(serde_json::Value::String(raw.trim().to_string())))
        .inspect_err(|e| log::warn!("Ignoring stored `{key}` ({raw}): {e}"))
        .ok()
}

pub trait PreferenceStore {
    fn preferred_unit(&self) -> Unit;
    fn set_preferred_unit(&mut self, unit: Unit) -> Result<(), StorageError>;

    fn tracker_mode(&self) -> TrackerMode;
    fn set_tracker_mode(&mut self, mode: TrackerMode) -> Result<(), StorageError>;

    /// Never 0.
    fn cars_per_page(&self) -> u32;
    fn set_cars_per_page(&mut self, cars_per_page: u32) -> Result<(), StorageError>;

    /// 1-based, never 0.
    fn current_page(&self) -> u32;
    fn set_current_page(&mut self, page: u32) -> Result<(), StorageError>;

    fn legend_store_filters(&self) -> LegendStoreFilters;
    fn set_legend_store_filters(
        &mut self,
        filters: &LegendStoreFilters,
    ) -> Result<(), StorageError>;

    fn garage_level(&self) -> Option<GarageLevel>;
    fn set_garage_level(&mut self, level: &GarageLevel) -> Result<(), StorageError>;
}

impl PreferenceStore for Depot {
    fn preferred_unit(&self) -> Unit {
        read_preference(self, PREFERRED_UNIT_KEY).unwrap_or_default()
    }

    fn set_preferred_unit(&mut self, unit: Unit) -> Result<(), StorageError> {
        self.write_json(PREFERRED_UNIT_KEY, &unit)
    }

    fn tracker_mode(&self) -> TrackerMode {
        read_preference(self, TRACKER_MODE_KEY).unwrap_or_default()
    }

    fn set_tracker_mode(&mut self, mode: TrackerMode) -> Result<(), StorageError> {
        self.write_json(TRACKER_MODE_KEY, &mode)
    }

    fn cars_per_page(&self) -> u32 {
        read_preference(self, CARS_PER_PAGE_KEY)
            .filter(|&n: &u32| n > 0)
            .unwrap_or(DEFAULT_CARS_PER_PAGE)
    }

    fn set_cars_per_page(&mut self, cars_per_page: u32) -> Result<(), StorageError> {
        self.write_json(CARS_PER_PAGE_KEY, &cars_per_page.max(1))
    }

    fn current_page(&self) -> u32 {
        read_preference(self, CURRENT_PAGE_KEY)
            .filter(|&n: &u32| n > 0)
            .unwrap_or(DEFAULT_CURRENT_PAGE)
    }

    fn set_current_page(&mut self, page: u32) -> Result<(), StorageError> {
        self.write_json(CURRENT_PAGE_KEY, &page.max(1))
    }

    fn legend_store_filters(&self) -> LegendStoreFilters {
        read_preference(self, LEGEND_STORE_FILTERS_KEY).unwrap_or_default()
    }

    fn set_legend_store_filters(
        &mut self,
        filters: &LegendStoreFilters,
    ) -> Result<(), StorageError> {
        self.write_json(LEGEND_STORE_FILTERS_KEY, filters)
    }

    fn garage_level(&self) -> Option<GarageLevel> {
        read_preference(self, GARAGE_LEVEL_KEY)
    }

    fn set_garage_level(&mut self, level: &GarageLevel) -> Result<(), StorageError> {
        self.write_json(GARAGE_LEVEL_KEY, level)
    }
}
