//! Browser bindings: `localStorage` as a backend, the cross-tab `storage` event, and same-tab
//! `CustomEvent`s for UI code that is not wired to a [`crate::Depot`] listener.

use wasm_bindgen::{JsCast, JsValue, closure::Closure};

use crate::storage::{KeyValueStorage, StorageError};

#[derive(Debug, Clone)]
pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    pub fn open() -> Result<Self, StorageError> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))?
            .ok_or_else(|| StorageError::Unavailable("localStorage is disabled".to_string()))?;
        Ok(Self { storage })
    }
}

fn is_quota_error(error: &JsValue) -> bool {
    js_sys::Reflect::get(error, &JsValue::from_str("name"))
        .ok()
        .and_then(|name| name.as_string())
        .is_some_and(|name| name == "QuotaExceededError" || name == "NS_ERROR_DOM_QUOTA_REACHED")
}

impl KeyValueStorage for LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage
            .get_item(key)
            .map_err(|e| StorageError::Backend(format!("{e:?}")))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage.set_item(key, value).map_err(|e| {
            if is_quota_error(&e) {
                StorageError::QuotaExceeded {
                    key: key.to_string(),
                }
            } else {
                StorageError::Backend(format!("{e:?}"))
            }
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.storage
            .remove_item(key)
            .map_err(|e| StorageError::Backend(format!("{e:?}")))
    }
}

/// Listens for `storage` events, which the browser only fires in tabs *other* than the writer.
/// The listener is removed when this value is dropped.
pub struct StorageEventSubscription {
    window: web_sys::Window,
    closure: Closure<dyn FnMut(web_sys::StorageEvent)>,
}

impl StorageEventSubscription {
    /// `on_change` receives the changed key, or `None` when the other tab called `clear()`.
    pub fn new(on_change: impl Fn(Option<String>) + 'static) -> Result<Self, StorageError> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;

        let closure = Closure::wrap(Box::new(move |event: web_sys::StorageEvent| {
            on_change(event.key());
        }) as Box<dyn FnMut(web_sys::StorageEvent)>);

        window
            .add_event_listener_with_callback("storage", closure.as_ref().unchecked_ref())
            .map_err(|e| StorageError::Backend(format!("{e:?}")))?;

        Ok(Self { window, closure })
    }
}

impl Drop for StorageEventSubscription {
    fn drop(&mut self) {
        if let Err(e) = self
            .window
            .remove_event_listener_with_callback("storage", self.closure.as_ref().unchecked_ref())
        {
            log::error!("Failed to remove storage listener: {e:?}");
        }
    }
}

/// Dispatch `name` as a `CustomEvent` on `window`, with `detail` as a string payload.
pub fn dispatch_window_event(name: &str, detail: &str) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let init = web_sys::CustomEventInit::new();
    init.set_detail(&JsValue::from_str(detail));
    match web_sys::CustomEvent::new_with_event_init_dict(name, &init) {
        Ok(event) => {
            if let Err(e) = window.dispatch_event(&event) {
                log::error!("Failed to dispatch {name}: {e:?}");
            }
        }
        Err(e) => log::error!("Failed to create {name} event: {e:?}"),
    }
}
