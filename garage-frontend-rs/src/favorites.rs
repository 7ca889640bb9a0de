use std::collections::BTreeSet;

use depot::{Depot, StorageError};
use garage_utils::{Vehicle, normalize_key_part};

pub const FAVORITES_KEY: &str = "favorites";
pub const FAVORITES_TOPIC: &str = "favorites:updated";
pub const VIEWS_PREFIX: &str = "views:";
pub const BRAND_VIEWS_PREFIX: &str = "brandViews:";
pub const VIEWS_TOPIC: &str = "views:updated";

fn view_key(vehicle_key: &str) -> String {
    format!("{VIEWS_PREFIX}{vehicle_key}")
}

fn brand_view_key(brand: &str) -> String {
    format!("{BRAND_VIEWS_PREFIX}{}", normalize_key_part(brand))
}

pub trait FavoritesStore {
    fn favorites(&self) -> BTreeSet<String>;
    fn is_favorite(&self, key: &str) -> bool;
    /// Returns whether `key` is a favorite afterwards.
    fn toggle_favorite(&mut self, key: &str) -> Result<bool, StorageError>;

    fn view_count(&self, key: &str) -> u64;
    fn brand_view_count(&self, brand: &str) -> u64;
    /// Bump both the vehicle's and its brand's counters. Fails only if the vehicle's counter
    /// could not be written.
    fn record_view(&mut self, vehicle: &Vehicle) -> Result<(), StorageError>;
}

impl FavoritesStore for Depot {
    fn favorites(&self) -> BTreeSet<String> {
        self.read_json(FAVORITES_KEY).unwrap_or_default()
    }

    fn is_favorite(&self, key: &str) -> bool {
        self.favorites().contains(key)
    }

    fn toggle_favorite(&mut self, key: &str) -> Result<bool, StorageError> {
        let mut favorites = self.favorites();
        let now_favorite = if favorites.remove(key) {
            false
        } else {
            favorites.insert(key.to_string());
            true
        };
        self.write_json(FAVORITES_KEY, &favorites)?;
        Ok(now_favorite)
    }

    fn view_count(&self, key: &str) -> u64 {
        self.read_json(&view_key(key)).unwrap_or(0)
    }

    fn brand_view_count(&self, brand: &str) -> u64 {
        self.read_json(&brand_view_key(brand)).unwrap_or(0)
    }

    fn record_view(&mut self, vehicle: &Vehicle) -> Result<(), StorageError> {
        let key = vehicle.key();
        let views = self.view_count(&key).saturating_add(1);
        self.write_json(&view_key(&key), &views)?;

        let brand_views = self.brand_view_count(&vehicle.brand).saturating_add(1);
        if let Err(e) = self.write_json(&brand_view_key(&vehicle.brand), &brand_views) {
            log::warn!("Brand view counter for `{}` not updated: {e}", vehicle.brand);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot::{KeyFilter, MemoryStorage};
    use garage_utils::CarClass;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn vehicle(brand: &str, model: &str) -> Vehicle {
        Vehicle {
            brand: brand.to_string(),
            model: model.to_string(),
            slug: String::new(),
            class: CarClass::B,
            max_stars: 4,
            key_vehicle: false,
            blueprints_per_star: BTreeMap::new(),
            tiers: Vec::new(),
        }
    }

    #[test]
    fn toggling_twice_restores_the_set() {
        let mut depot = Depot::in_memory();
        assert!(depot.toggle_favorite("a::one").unwrap());
        assert!(depot.is_favorite("a::one"));
        assert!(!depot.toggle_favorite("a::one").unwrap());
        assert!(depot.favorites().is_empty());
    }

    #[test]
    fn views_count_per_vehicle_and_per_brand() {
        let mut depot = Depot::in_memory();
        let taycan = vehicle("Porsche", "Taycan");
        depot.record_view(&taycan).unwrap();
        depot.record_view(&taycan).unwrap();
        depot.record_view(&vehicle(" porsche", "911")).unwrap();

        assert_eq!(depot.view_count(&taycan.key()), 2);
        assert_eq!(depot.brand_view_count("PORSCHE"), 3);
        assert_eq!(depot.view_count("audi::r8"), 0);
    }

    #[test]
    fn view_listeners_can_watch_the_prefix() {
        let mut depot = Depot::in_memory();
        let keys = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&keys);
        depot.register_listener(KeyFilter::Prefix(VIEWS_PREFIX.into()), move |_, change| {
            sink.borrow_mut().push(change.key.clone())
        });

        depot.record_view(&vehicle("Audi", "R8")).unwrap();
        for notification in depot.drain_due_notifications() {
            notification();
        }
        assert_eq!(*keys.borrow(), vec!["views:audi::r8".to_string()]);
    }

    #[test]
    fn vehicle_view_counts_even_if_the_brand_counter_is_full() {
        // room for `views:audi::r8` only
        let mut depot = Depot::new(Rc::new(MemoryStorage::with_quota(20)));
        let r8 = vehicle("Audi", "R8");

        assert!(depot.record_view(&r8).is_ok());
        assert_eq!(depot.view_count(&r8.key()), 1);
        assert_eq!(depot.brand_view_count("Audi"), 0);
    }
}
