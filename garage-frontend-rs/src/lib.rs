#![deny(clippy::string_slice)]

pub mod api;
pub mod favorites;
pub mod preferences;
pub mod sync;
pub mod tracking;
mod utils;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::LazyLock;

use depot::{
    Change, ChangeKind, ChangeOrigin, Depot, KeyFilter, KeyValueStorage, ListenerKey, StorageError,
};
use garage_utils::catalog::{BrandSummary, CatalogFilter};
use garage_utils::stats::CollectionStats;
use garage_utils::{RemoteProgressSnapshot, TrackingPatch, TrackingRecord, Unit, Vehicle};
use wasm_bindgen::prelude::*;

use crate::favorites::{FAVORITES_TOPIC, FavoritesStore, VIEWS_TOPIC};
use crate::preferences::{
    GarageLevel, LegendStoreFilters, PREFERENCES_TOPIC, PreferenceStore, TrackerMode,
};
use crate::sync::{
    DEFAULT_SYNC_TIMEOUT_MS, HttpProgressRemote, ReconcileOutcome, RemoteSync, SyncOptions,
    SyncResult,
};
use crate::tracking::{TRACKING_KEY, TRACKING_TOPIC, TrackingStore};
use crate::utils::notify_topic;

pub use crate::utils::{ApiConfig, api_config};

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn car_key(brand: &str, model: &str) -> String {
    garage_utils::generate_car_key(brand, model)
}

/// The same-tab event topic UI code listens on for changes to a storage key.
fn topic_for_key(key: &str) -> Option<&'static str> {
    match key {
        TRACKING_KEY => Some(TRACKING_TOPIC),
        favorites::FAVORITES_KEY => Some(FAVORITES_TOPIC),
        preferences::PREFERRED_UNIT_KEY
        | preferences::TRACKER_MODE_KEY
        | preferences::CARS_PER_PAGE_KEY
        | preferences::CURRENT_PAGE_KEY
        | preferences::LEGEND_STORE_FILTERS_KEY
        | preferences::GARAGE_LEVEL_KEY => Some(PREFERENCES_TOPIC),
        key if key.starts_with(favorites::VIEWS_PREFIX)
            || key.starts_with(favorites::BRAND_VIEWS_PREFIX) =>
        {
            Some(VIEWS_TOPIC)
        }
        _ => None,
    }
}

#[wasm_bindgen]
pub struct Garage {
    // we should never hold a borrow across an .await. by avoiding this, we guarantee the absence of "borrow while locked" panics
    depot: Rc<RefCell<Depot>>,
    sync: Rc<RemoteSync<HttpProgressRemote>>,
    catalog: RefCell<Vec<Vehicle>>,
    #[cfg(target_arch = "wasm32")]
    _storage_events: Option<depot::web::StorageEventSubscription>,
}

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    utils::set_panic_hook();

    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Logging initialized");
});

fn open_storage() -> Rc<dyn KeyValueStorage> {
    #[cfg(target_arch = "wasm32")]
    match depot::web::LocalStorage::open() {
        Ok(storage) => return Rc::new(storage),
        Err(e) => log::error!("localStorage unavailable, progress will not persist: {e}"),
    }
    Rc::new(depot::MemoryStorage::new())
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
impl Garage {
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(constructor))]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Garage {
        LazyLock::force(&LOGGER);

        #[allow(unused_mut)]
        let mut garage = Garage::with_storage(open_storage());

        #[cfg(target_arch = "wasm32")]
        {
            let depot = Rc::clone(&garage.depot);
            garage._storage_events = depot::web::StorageEventSubscription::new(move |key| {
                depot.borrow_mut().external_change(key.as_deref());
                flush_notifications(&depot);
                match key.as_deref() {
                    Some(key) => {
                        if let Some(topic) = topic_for_key(key) {
                            notify_topic(topic, key);
                        }
                    }
                    None => {
                        for topic in [
                            TRACKING_TOPIC,
                            FAVORITES_TOPIC,
                            VIEWS_TOPIC,
                            PREFERENCES_TOPIC,
                        ] {
                            notify_topic(topic, "");
                        }
                    }
                }
            })
            .inspect_err(|e| log::error!("Not listening for other tabs: {e}"))
            .ok();
        }

        garage
    }

    /// Call `callback(key, origin, kind)` whenever `key` changes. `kind` is one of `updated`,
    /// `replaced`, `removed` or `cleared`. A key ending in `:` watches every key with that prefix
    /// (e.g. `views:`).
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn subscribe(&self, key: String, callback: js_sys::Function) -> u64 {
        let filter = if key.ends_with(':') {
            KeyFilter::Prefix(key)
        } else {
            KeyFilter::Exact(key)
        };
        self.depot
            .borrow_mut()
            .register_listener(filter, move |_, change: &Change| {
                let this = JsValue::null();
                let key = JsValue::from_str(&change.key);
                let origin = JsValue::from_str(match change.origin {
                    ChangeOrigin::Local => "local",
                    ChangeOrigin::OtherTab => "otherTab",
                });
                let kind = JsValue::from_str(change_kind_name(change.kind));
                if let Err(e) = callback.call3(&this, &key, &origin, &kind) {
                    log::error!("Storage listener threw: {e:?}");
                }
            })
            .to_raw()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn unsubscribe(&self, key: u64) {
        self.depot
            .borrow_mut()
            .unregister_listener(ListenerKey::from_raw(key))
    }

    // =======
    // tracking
    // =======

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn get_car_tracking_data(&self, key: &str) -> TrackingRecord {
        self.depot.borrow().get_car_tracking_data(key)
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn get_all_car_tracking_data(&self) -> Result<JsValue, JsValue> {
        let map = self.depot.borrow().get_all_car_tracking_data();
        serde_wasm_bindgen::to_value(&map)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e:?}")))
    }

    /// Apply `patch` to the vehicle's record. Returns the new record, or nothing if it couldn't
    /// be saved. When `access_token` is given the new progress is pushed in the background.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn set_car_tracking_data(
        &self,
        key: &str,
        patch: TrackingPatch,
        access_token: Option<String>,
    ) -> Option<TrackingRecord> {
        let record = self.update_tracking(key, &patch)?;
        if let Some(access_token) = access_token {
            self.push_in_background(access_token);
        }
        Some(record)
    }

    // =======
    // preferences
    // =======

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(getter))]
    pub fn preferred_unit(&self) -> Unit {
        self.depot.borrow().preferred_unit()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(setter))]
    pub fn set_preferred_unit(&self, unit: Unit) {
        self.save_preference(preferences::PREFERRED_UNIT_KEY, |depot| {
            depot.set_preferred_unit(unit)
        });
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(getter))]
    pub fn tracker_mode(&self) -> TrackerMode {
        self.depot.borrow().tracker_mode()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(setter))]
    pub fn set_tracker_mode(&self, mode: TrackerMode) {
        self.save_preference(preferences::TRACKER_MODE_KEY, |depot| {
            depot.set_tracker_mode(mode)
        });
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(getter))]
    pub fn cars_per_page(&self) -> u32 {
        self.depot.borrow().cars_per_page()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(setter))]
    pub fn set_cars_per_page(&self, cars_per_page: u32) {
        self.save_preference(preferences::CARS_PER_PAGE_KEY, |depot| {
            depot.set_cars_per_page(cars_per_page)
        });
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(getter))]
    pub fn current_page(&self) -> u32 {
        self.depot.borrow().current_page()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(setter))]
    pub fn set_current_page(&self, page: u32) {
        self.save_preference(preferences::CURRENT_PAGE_KEY, |depot| {
            depot.set_current_page(page)
        });
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn legend_store_filters(&self) -> LegendStoreFilters {
        self.depot.borrow().legend_store_filters()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn set_legend_store_filters(&self, filters: LegendStoreFilters) {
        self.save_preference(preferences::LEGEND_STORE_FILTERS_KEY, |depot| {
            depot.set_legend_store_filters(&filters)
        });
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn garage_level(&self) -> Option<GarageLevel> {
        self.depot.borrow().garage_level()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn set_garage_level(&self, level: u32, xp: u64) {
        let garage_level = GarageLevel {
            level,
            xp,
            updated_at: Some(chrono::Utc::now()),
        };
        self.save_preference(preferences::GARAGE_LEVEL_KEY, |depot| {
            depot.set_garage_level(&garage_level)
        });
    }

    /// A km/h figure in the preferred unit, e.g. "342 km/h" or "213 mph".
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn format_speed(&self, kmh: f64) -> String {
        garage_utils::units::format_speed(kmh, self.preferred_unit())
    }

    /// Turn a speed typed in the preferred unit into km/h.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn speed_to_kmh(&self, value: f64) -> f64 {
        garage_utils::units::speed_to_kmh(value, self.preferred_unit())
    }

    /// An RFC 3339 timestamp from the backend (e.g. a comment's `createdAt`) as "3 hours ago" or
    /// "Mar 9, 2024".
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn format_timestamp(&self, created_at: &str) -> String {
        garage_utils::units::format_timestamp(created_at, chrono::Utc::now())
    }

    // =======
    // favorites and views
    // =======

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn favorites(&self) -> Vec<String> {
        self.depot.borrow().favorites().into_iter().collect()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn is_favorite(&self, key: &str) -> bool {
        self.depot.borrow().is_favorite(key)
    }

    /// Returns whether the vehicle is a favorite afterwards.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn toggle_favorite(&self, key: &str) -> bool {
        let _flusher = FlushLater::new(&self.depot);
        let toggled = self.depot.borrow_mut().toggle_favorite(key);
        match toggled {
            Ok(now_favorite) => {
                notify_topic(FAVORITES_TOPIC, key);
                now_favorite
            }
            Err(_) => self.depot.borrow().is_favorite(key),
        }
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn record_view(&self, vehicle: Vehicle) {
        let _flusher = FlushLater::new(&self.depot);
        let recorded = self.depot.borrow_mut().record_view(&vehicle);
        if recorded.is_ok() {
            notify_topic(VIEWS_TOPIC, &vehicle.key());
        }
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn view_count(&self, key: &str) -> u64 {
        self.depot.borrow().view_count(key)
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn brand_view_count(&self, brand: &str) -> u64 {
        self.depot.borrow().brand_view_count(brand)
    }

    // =======
    // catalog views
    // =======

    /// Replace the catalog the statistics and filters run over.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn load_catalog(&self, catalog: JsValue) -> Result<usize, JsValue> {
        let catalog: Vec<Vehicle> = serde_wasm_bindgen::from_value(catalog)
            .map_err(|e| JsValue::from_str(&format!("Invalid catalog: {e:?}")))?;
        let len = catalog.len();
        self.set_catalog(catalog);
        Ok(len)
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn collection_stats(&self) -> CollectionStats {
        let tracking = self.depot.borrow().get_all_car_tracking_data();
        garage_utils::stats::collection_stats(&self.catalog.borrow(), &tracking)
    }

    /// The current page (per the stored page preferences) of catalog vehicles matching `filter`.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn filtered_catalog_page(&self, filter: CatalogFilter) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.catalog_page(&filter))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e:?}")))
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn brand_directory(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.brands())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e:?}")))
    }

    // =======
    // account sync
    // =======

    /// False while progress pulled at login is being merged; UI should hold off on pushing.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(getter))]
    pub fn sync_ready(&self) -> bool {
        self.sync.is_ready()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn progress_snapshot(&self) -> RemoteProgressSnapshot {
        let depot = self.depot.borrow();
        let garage_level = depot.garage_level();
        RemoteProgressSnapshot::from_tracking_map(&depot.get_all_car_tracking_data())
            .with_garage_level(
                garage_level.as_ref().map(|level| level.level),
                garage_level.as_ref().map(|level| level.xp),
            )
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub async fn push_progress(
        &self,
        access_token: String,
        options: Option<SyncOptions>,
    ) -> SyncResult {
        let (snapshot, options) = self.push_request(options);
        self.sync
            .push_progress(&access_token, snapshot, options)
            .await
    }

    /// Pull the account's progress and merge it into local storage. Call once after login.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub async fn reconcile_on_login(&self, access_token: String) -> ReconcileOutcome {
        let outcome = self
            .sync
            .reconcile_on_login(&self.depot, &access_token, DEFAULT_SYNC_TIMEOUT_MS)
            .await;
        flush_notifications(&self.depot);
        if matches!(outcome, ReconcileOutcome::Merged { .. }) {
            notify_topic(TRACKING_TOPIC, TRACKING_KEY);
        }
        outcome
    }

    /// Local progress stays; only the link to the account is dropped.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn logout(&self) {
        self.sync.end_session();
    }
}

impl Garage {
    /// A garage over any storage backend, without the browser's cross-tab events.
    pub fn with_storage(storage: Rc<dyn KeyValueStorage>) -> Garage {
        Garage {
            depot: Rc::new(RefCell::new(Depot::new(storage))),
            sync: Rc::new(RemoteSync::new(HttpProgressRemote)),
            catalog: RefCell::new(Vec::new()),
            #[cfg(target_arch = "wasm32")]
            _storage_events: None,
        }
    }

    pub fn depot(&self) -> &RefCell<Depot> {
        &self.depot
    }

    pub fn set_catalog(&self, catalog: Vec<Vehicle>) {
        *self.catalog.borrow_mut() = catalog;
    }

    pub fn catalog_page(&self, filter: &CatalogFilter) -> garage_utils::catalog::Page<Vehicle> {
        let (tracking, favorites, per_page, page) = {
            let depot = self.depot.borrow();
            (
                depot.get_all_car_tracking_data(),
                depot.favorites(),
                depot.cars_per_page(),
                depot.current_page(),
            )
        };
        let catalog = self.catalog.borrow();
        let matching: Vec<Vehicle> =
            garage_utils::catalog::filter_catalog(&catalog, filter, &tracking, &favorites)
                .into_iter()
                .cloned()
                .collect();
        garage_utils::catalog::paginate(&matching, per_page as usize, page as usize)
    }

    pub fn brands(&self) -> Vec<BrandSummary> {
        let tracking = self.depot.borrow().get_all_car_tracking_data();
        garage_utils::catalog::brand_directory(&self.catalog.borrow(), &tracking)
    }

    fn update_tracking(&self, key: &str, patch: &TrackingPatch) -> Option<TrackingRecord> {
        let _flusher = FlushLater::new(&self.depot);
        let record = self.depot.borrow_mut().set_car_tracking_data(key, patch)?;
        notify_topic(TRACKING_TOPIC, key);
        Some(record)
    }

    fn save_preference(
        &self,
        key: &str,
        write: impl FnOnce(&mut Depot) -> Result<(), StorageError>,
    ) {
        let _flusher = FlushLater::new(&self.depot);
        let saved = write(&mut self.depot.borrow_mut());
        if saved.is_ok() {
            notify_topic(PREFERENCES_TOPIC, key);
        }
    }

    /// The current snapshot, with catalog display names as labels unless the caller gave some.
    fn push_request(&self, options: Option<SyncOptions>) -> (RemoteProgressSnapshot, SyncOptions) {
        let snapshot = self.progress_snapshot();
        let mut options = options.unwrap_or_default();

        let mentioned = snapshot.mentioned_keys();
        let mut labels: BTreeMap<String, String> = self
            .catalog
            .borrow()
            .iter()
            .map(|vehicle| (vehicle.key(), vehicle.display_name()))
            .filter(|(key, _)| mentioned.contains(key.as_str()))
            .collect();
        labels.append(&mut options.labels);
        options.labels = labels;
        (snapshot, options)
    }

    fn push_in_background(&self, access_token: String) {
        if !self.sync.is_ready() {
            log::info!("Not pushing progress until login reconciliation finishes");
            return;
        }
        let (snapshot, options) = self.push_request(None);

        #[cfg(target_arch = "wasm32")]
        {
            let sync = Rc::clone(&self.sync);
            wasm_bindgen_futures::spawn_local(async move {
                let result = sync.push_progress(&access_token, snapshot, options).await;
                log::info!("Background progress push: {result:?}");
            });
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = (access_token, snapshot, options);
            log::info!("No executor for background pushes outside the browser");
        }
    }
}

fn change_kind_name(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Updated => "updated",
        ChangeKind::Replaced => "replaced",
        ChangeKind::Removed => "removed",
        ChangeKind::Cleared => "cleared",
    }
}

/// Flush pending store notifications safely, avoiding RefCell re-borrows during callbacks.
fn flush_notifications(depot: &RefCell<Depot>) {
    // do it like this to avoid holding the borrow while we call the callbacks
    let notifications = depot.borrow_mut().drain_due_notifications();
    // that's important because many of these callbacks will call back into rust functions that themselves do borrow_mut()
    for notification in notifications {
        notification();
    }
}

/// Flushes listeners when dropped, so no code path in a mutating method forgets to.
struct FlushLater<'a> {
    depot: &'a RefCell<Depot>,
}

impl<'a> FlushLater<'a> {
    fn new(depot: &'a RefCell<Depot>) -> Self {
        Self { depot }
    }
}

impl<'a> Drop for FlushLater<'a> {
    fn drop(&mut self) {
        flush_notifications(self.depot);
    }
}
