//! Filtering, pagination and the brand directory.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{CarClass, TrackingMap, TrackingRecord, Vehicle};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFilter {
    /// Case-insensitive substring of "brand model".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<CarClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stars: Option<u8>,
    #[serde(default)]
    pub owned_only: bool,
    #[serde(default)]
    pub unowned_only: bool,
    #[serde(default)]
    pub key_only: bool,
    #[serde(default)]
    pub favorites_only: bool,
}

impl CatalogFilter {
    pub fn matches(&self, vehicle: &Vehicle, record: &TrackingRecord, is_favorite: bool) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim)
            && !search.is_empty()
            && !vehicle
                .display_name()
                .to_lowercase()
                .contains(&search.to_lowercase())
        {
            return false;
        }
        if let Some(brand) = &self.brand
            && !vehicle.brand.trim().eq_ignore_ascii_case(brand.trim())
        {
            return false;
        }
        if self.class.is_some_and(|class| class != vehicle.class) {
            return false;
        }
        if self.max_stars.is_some_and(|stars| stars != vehicle.max_stars) {
            return false;
        }
        if self.owned_only && !record.owned {
            return false;
        }
        if self.unowned_only && record.owned {
            return false;
        }
        if self.key_only && !vehicle.key_vehicle {
            return false;
        }
        if self.favorites_only && !is_favorite {
            return false;
        }
        true
    }
}

pub fn filter_catalog<'a>(
    catalog: &'a [Vehicle],
    filter: &CatalogFilter,
    tracking: &TrackingMap,
    favorites: &BTreeSet<String>,
) -> Vec<&'a Vehicle> {
    catalog
        .iter()
        .filter(|vehicle| {
            let key = vehicle.key();
            filter.matches(vehicle, &tracking.get(&key), favorites.contains(&key))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based, clamped into `1..=total_pages`.
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    /// Always at least 1, even for an empty list.
    pub total_pages: usize,
}

pub fn paginate<T: Clone>(items: &[T], per_page: usize, page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total_pages = items.len().div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(items.len());
    Page {
        items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
        page,
        per_page,
        total_items: items.len(),
        total_pages,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct BrandSummary {
    pub brand: String,
    pub vehicles: usize,
    pub owned: usize,
}

/// One entry per brand, sorted by brand name ignoring case.
pub fn brand_directory(catalog: &[Vehicle], tracking: &TrackingMap) -> Vec<BrandSummary> {
    let mut brands: BTreeMap<String, BrandSummary> = BTreeMap::new();
    for vehicle in catalog {
        let summary = brands
            .entry(vehicle.brand.trim().to_lowercase())
            .or_insert_with(|| BrandSummary {
                brand: vehicle.brand.trim().to_string(),
                vehicles: 0,
                owned: 0,
            });
        summary.vehicles += 1;
        if tracking.get(&vehicle.key()).owned {
            summary.owned += 1;
        }
    }
    brands.into_values().collect()
}
