//! `chrome.storage.sync` as a [`SettingsStore`].
//!
//! Values cross the boundary as JSON: the store object is stringified on the
//! JS side and decoded key by key with `serde_json`, so one malformed key
//! never discards the others.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fm_core::settings::{SettingsKey, SettingsPatch};
use fm_core::store::{ChangeListener, ReadCallback, SettingsStore, StoreError, SubscriptionId, WriteCallback};
use js_sys::{Array, Function, Reflect, JSON};
use wasm_bindgen::prelude::*;

const STORAGE_AREA: &str = "sync";

type ChangedClosure = Closure<dyn FnMut(JsValue, JsValue)>;

/// Completion callback shared between the JS callback and the synchronous
/// error path, so exactly one of them reports.
type Pending<T> = Rc<RefCell<Option<Box<dyn FnOnce(T)>>>>;

fn lookup(path: &[&str]) -> Result<JsValue, StoreError> {
    let mut value: JsValue = js_sys::global().into();
    for key in path {
        value = Reflect::get(&value, &JsValue::from_str(key))
            .map_err(|_| StoreError::Unavailable(format!("cannot read {}", key)))?;
        if value.is_undefined() || value.is_null() {
            return Err(StoreError::Unavailable(format!("{} is not available", path.join("."))));
        }
    }
    Ok(value)
}

fn method(target: &JsValue, name: &str) -> Result<Function, StoreError> {
    Reflect::get(target, &JsValue::from_str(name))
        .ok()
        .and_then(|f| f.dyn_into::<Function>().ok())
        .ok_or_else(|| StoreError::Unavailable(format!("{} is not a function", name)))
}

/// `chrome.runtime.lastError`, if the last extension API call failed.
fn last_error() -> Option<String> {
    let error = lookup(&["chrome", "runtime", "lastError"]).ok()?;
    let message = Reflect::get(&error, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string());
    Some(message.unwrap_or_else(|| "unknown extension error".to_string()))
}

fn finish<T>(slot: &Pending<T>, result: T) {
    let done = slot.borrow_mut().take();
    if let Some(done) = done {
        done(result);
    }
}

fn to_json(value: &JsValue) -> Result<serde_json::Value, StoreError> {
    let text: String = JSON::stringify(value)
        .map_err(|_| StoreError::Malformed("value is not serializable".to_string()))?
        .into();
    serde_json::from_str(&text).map_err(|e| StoreError::Malformed(e.to_string()))
}

fn from_json(value: &serde_json::Value) -> Result<JsValue, StoreError> {
    JSON::parse(&value.to_string()).map_err(|_| StoreError::Malformed("JSON.parse failed".to_string()))
}

pub struct ChromeStorage {
    listeners: RefCell<Vec<(SubscriptionId, ChangedClosure)>>,
    next_id: Cell<u32>,
}

impl Default for ChromeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromeStorage {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn is_available() -> bool {
        lookup(&["chrome", "storage", STORAGE_AREA]).is_ok()
    }

    fn area() -> Result<JsValue, StoreError> {
        lookup(&["chrome", "storage", STORAGE_AREA])
    }

    fn on_changed() -> Result<JsValue, StoreError> {
        lookup(&["chrome", "storage", "onChanged"])
    }
}

impl SettingsStore for ChromeStorage {
    fn read(&self, keys: &[SettingsKey], done: ReadCallback) {
        let slot: Pending<Result<SettingsPatch, StoreError>> = Rc::new(RefCell::new(Some(done)));

        let target = Self::area().and_then(|area| method(&area, "get").map(|get| (area, get)));
        let (area, get) = match target {
            Ok(target) => target,
            Err(e) => return finish(&slot, Err(e)),
        };

        let key_array = Array::new();
        for key in keys {
            key_array.push(&JsValue::from_str(key.as_str()));
        }

        let pending = Rc::clone(&slot);
        let callback = Closure::once_into_js(move |items: JsValue| {
            if let Some(message) = last_error() {
                return finish(&pending, Err(StoreError::Unavailable(message)));
            }
            let result = to_json(&items).map(|value| SettingsPatch::from_json(&value).0);
            finish(&pending, result);
        });

        if let Err(e) = get.call2(&area, &key_array, &callback) {
            log::warn!("chrome.storage get threw: {:?}", e);
            finish(&slot, Err(StoreError::Unavailable("storage get threw".to_string())));
        }
    }

    fn write(&self, patch: &SettingsPatch, done: WriteCallback) {
        let slot: Pending<Result<(), StoreError>> = Rc::new(RefCell::new(Some(done)));

        let payload = serde_json::to_value(patch.sanitized())
            .map_err(|e| StoreError::Malformed(e.to_string()))
            .and_then(|value| from_json(&value));
        let target = Self::area().and_then(|area| method(&area, "set").map(|set| (area, set)));

        let (payload, (area, set)) = match (payload, target) {
            (Ok(payload), Ok(target)) => (payload, target),
            (Err(e), _) | (_, Err(e)) => return finish(&slot, Err(e)),
        };

        let pending = Rc::clone(&slot);
        let callback = Closure::once_into_js(move || match last_error() {
            Some(message) => finish(&pending, Err(StoreError::Rejected(message))),
            None => finish(&pending, Ok(())),
        });

        if let Err(e) = set.call2(&area, &payload, &callback) {
            log::warn!("chrome.storage set threw: {:?}", e);
            finish(&slot, Err(StoreError::Rejected("storage set threw".to_string())));
        }
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId::from_raw(self.next_id.get());
        self.next_id.set(self.next_id.get().wrapping_add(1));

        let closure: ChangedClosure = Closure::new(move |changes: JsValue, area: JsValue| {
            if area.as_string().as_deref() != Some(STORAGE_AREA) {
                return;
            }
            let changes = match to_json(&changes) {
                Ok(changes) => changes,
                Err(e) => {
                    log::warn!("ignoring settings change: {}", e);
                    return;
                }
            };
            let (patch, _rejected) = SettingsPatch::from_storage_changes(&changes);
            if !patch.is_empty() {
                listener(&patch.keys(), &patch);
            }
        });

        let registered = Self::on_changed()
            .and_then(|on_changed| method(&on_changed, "addListener").map(|add| (on_changed, add)))
            .and_then(|(on_changed, add)| {
                add.call1(&on_changed, closure.as_ref())
                    .map_err(|_| StoreError::Unavailable("addListener threw".to_string()))
            });
        if let Err(e) = registered {
            log::warn!("settings changes will not be observed: {}", e);
        }

        self.listeners.borrow_mut().push((id, closure));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let closure = {
            let mut listeners = self.listeners.borrow_mut();
            match listeners.iter().position(|(existing, _)| *existing == id) {
                Some(index) => listeners.remove(index).1,
                None => return false,
            }
        };

        let removed = Self::on_changed()
            .and_then(|on_changed| method(&on_changed, "removeListener").map(|remove| (on_changed, remove)))
            .and_then(|(on_changed, remove)| {
                remove
                    .call1(&on_changed, closure.as_ref())
                    .map_err(|_| StoreError::Unavailable("removeListener threw".to_string()))
            });
        if let Err(e) = removed {
            log::debug!("removing settings listener: {}", e);
        }
        true
    }
}
