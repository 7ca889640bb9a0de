//! A small library for synchronous, local-first key/value state in the browser.
//! It was created for the garage tracker, so it doesn't include much that was not needed there.
//!
//! Model:
//! 1. All state lives in a string-keyed, string-valued backend ([`KeyValueStorage`]). In the browser that is `localStorage`; in tests it is [`MemoryStorage`].
//! 2. A [`Depot`] wraps one backend. Reads go straight to the backend, so a write is visible to the next read in the same tab.
//! 3. Successful writes queue a [`Change`] for every listener whose [`KeyFilter`] matches. Writes made by other tabs arrive through [`Depot::external_change`].
//! 4. Queued notifications are handed out by [`Depot::drain_due_notifications`] and must be called *after* the caller releases its borrow of the depot,
//!    since listeners usually read the depot again.

pub mod storage;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub mod web;

use std::rc::Rc;

use serde::{Serialize, de::DeserializeOwned};
use slotmap::SlotMap;

pub use storage::{KeyValueStorage, MemoryStorage, StorageError};

slotmap::new_key_type! {
    pub struct ListenerKey;
}

impl ListenerKey {
    /// Stable integer form, for handing the key to JavaScript.
    pub fn to_raw(self) -> u64 {
        slotmap::Key::data(&self).as_ffi()
    }

    pub fn from_raw(raw: u64) -> Self {
        slotmap::KeyData::from_ffi(raw).into()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOrigin {
    /// Written through this depot.
    Local,
    /// Written by another browsing context sharing the same backend.
    OtherTab,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Updated,
    /// The value was rebuilt wholesale rather than edited (e.g. after reconciling with a server).
    Replaced,
    Removed,
    /// Every key may have changed. Matches all filters.
    Cleared,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Change {
    pub key: String,
    pub kind: ChangeKind,
    pub origin: ChangeOrigin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyFilter {
    Exact(String),
    Prefix(String),
    All,
}

impl KeyFilter {
    pub fn matches(&self, change: &Change) -> bool {
        if change.kind == ChangeKind::Cleared {
            return true;
        }
        match self {
            KeyFilter::Exact(key) => change.key == *key,
            KeyFilter::Prefix(prefix) => change.key.starts_with(prefix.as_str()),
            KeyFilter::All => true,
        }
    }
}

type Callback = Rc<dyn Fn(ListenerKey, &Change)>;

struct Listener {
    filter: KeyFilter,
    callback: Callback,
}

pub struct Depot {
    storage: Rc<dyn KeyValueStorage>,
    listeners: SlotMap<ListenerKey, Listener>,
    pending: Vec<Change>,
}

impl std::fmt::Debug for Depot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Depot")
            .field("listeners", &self.listeners.len())
            .field("pending", &self.pending)
            .finish()
    }
}

impl Depot {
    pub fn new(storage: Rc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            listeners: SlotMap::with_key(),
            pending: Vec::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Rc::new(MemoryStorage::new()))
    }

    /// Raw read. Backend errors are logged and reported as absence.
    pub fn read(&self, key: &str) -> Option<String> {
        self.storage
            .get_item(key)
            .inspect_err(|e| log::warn!("Failed to read `{key}` from storage: {e}"))
            .ok()
            .flatten()
    }

    /// Read and parse a JSON value. Unparsable values are logged and reported as absence.
    pub fn read_value(&self, key: &str) -> Option<serde_json::Value> {
        let raw = self.read(key)?;
        serde_json::from_str(&raw)
            .inspect_err(|e| log::warn!("Stored value for `{key}` is not valid JSON: {e}"))
            .ok()
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read(key)?;
        serde_json::from_str(&raw)
            .inspect_err(|e| log::warn!("Stored value for `{key}` has an unexpected shape: {e}"))
            .ok()
    }

    /// Write a raw value. Listeners are only queued once the backend accepted the write.
    pub fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write_with_kind(key, value, ChangeKind::Updated)
    }

    pub fn write_json<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.write_with_kind(key, &raw, ChangeKind::Updated)
    }

    pub fn replace_json<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.write_with_kind(key, &raw, ChangeKind::Replaced)
    }

    fn write_with_kind(
        &mut self,
        key: &str,
        value: &str,
        kind: ChangeKind,
    ) -> Result<(), StorageError> {
        self.storage
            .set_item(key, value)
            .inspect_err(|e| log::error!("Failed to write `{key}` to storage: {e}"))?;
        self.queue(Change {
            key: key.to_string(),
            kind,
            origin: ChangeOrigin::Local,
        });
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.storage
            .remove_item(key)
            .inspect_err(|e| log::error!("Failed to remove `{key}` from storage: {e}"))?;
        self.queue(Change {
            key: key.to_string(),
            kind: ChangeKind::Removed,
            origin: ChangeOrigin::Local,
        });
        Ok(())
    }

    /// Record that another tab changed `key` (`None` when it cleared the whole storage).
    /// Nothing is read here; listeners re-read when they run.
    pub fn external_change(&mut self, key: Option<&str>) {
        let change = match key {
            Some(key) => Change {
                key: key.to_string(),
                kind: ChangeKind::Updated,
                origin: ChangeOrigin::OtherTab,
            },
            None => Change {
                key: String::new(),
                kind: ChangeKind::Cleared,
                origin: ChangeOrigin::OtherTab,
            },
        };
        self.queue(change);
    }

    fn queue(&mut self, change: Change) {
        if self.listeners.is_empty() {
            return;
        }
        self.pending.push(change);
    }

    pub fn register_listener(
        &mut self,
        filter: KeyFilter,
        callback: impl Fn(ListenerKey, &Change) + 'static,
    ) -> ListenerKey {
        self.listeners.insert(Listener {
            filter,
            callback: Rc::new(callback),
        })
    }

    pub fn unregister_listener(&mut self, key: ListenerKey) {
        if self.listeners.remove(key).is_none() {
            log::warn!("Tried to unregister a listener that was not registered");
        }
    }

    pub fn has_pending_notifications(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take every queued notification as a closure. Call them after releasing the depot.
    pub fn drain_due_notifications(&mut self) -> Vec<Box<dyn FnOnce()>> {
        let mut notifications: Vec<Box<dyn FnOnce()>> = Vec::new();
        for change in self.pending.drain(..) {
            for (listener_key, listener) in &self.listeners {
                if !listener.filter.matches(&change) {
                    continue;
                }
                let callback = Rc::clone(&listener.callback);
                let change = change.clone();
                notifications.push(Box::new(move || callback(listener_key, &change)));
            }
        }
        notifications
    }
}
