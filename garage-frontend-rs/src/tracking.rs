//! The local tracking store: every vehicle's [`TrackingRecord`], kept as one JSON object under
//! [`TRACKING_KEY`].

use depot::{Depot, StorageError};
use garage_utils::{TrackingMap, TrackingPatch, TrackingRecord};

pub const TRACKING_KEY: &str = "carTracking";
pub const TRACKING_TOPIC: &str = "tracking:updated";

pub trait TrackingStore {
    /// The stored record for `key`, or the default record. Unreadable storage counts as empty.
    fn get_car_tracking_data(&self, key: &str) -> TrackingRecord;

    fn get_all_car_tracking_data(&self) -> TrackingMap;

    /// Merge `patch` into the record for `key` and persist the whole map.
    ///
    /// Returns the new record, or `None` if storage rejected the write, in which case nothing
    /// changed and no listener is notified.
    fn set_car_tracking_data(&mut self, key: &str, patch: &TrackingPatch)
    -> Option<TrackingRecord>;

    /// Overwrite the whole map, e.g. after reconciling with the account backend.
    fn replace_all_car_tracking_data(&mut self, map: &TrackingMap) -> Result<(), StorageError>;
}

impl TrackingStore for Depot {
    fn get_car_tracking_data(&self, key: &str) -> TrackingRecord {
        self.get_all_car_tracking_data().get(key)
    }

    fn get_all_car_tracking_data(&self) -> TrackingMap {
        self.read_value(TRACKING_KEY)
            .map(|value| TrackingMap::from_json_lenient(&value))
            .unwrap_or_default()
    }

    fn set_car_tracking_data(
        &mut self,
        key: &str,
        patch: &TrackingPatch,
    ) -> Option<TrackingRecord> {
        let mut map = self.get_all_car_tracking_data();
        let record = map.update(key, patch);
        match self.write_json(TRACKING_KEY, &map) {
            Ok(()) => Some(record),
            Err(e) => {
                log::error!("Tracking update for {key} was not saved: {e}");
                None
            }
        }
    }

    fn replace_all_car_tracking_data(&mut self, map: &TrackingMap) -> Result<(), StorageError> {
        self.replace_json(TRACKING_KEY, map)
    }
}
