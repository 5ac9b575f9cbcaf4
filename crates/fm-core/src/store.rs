//! Settings Store interface
//!
//! The store is an asynchronous key-value backend owned by the extension
//! shell. Completion is reported through callbacks so the same trait fits
//! `chrome.storage` in the browser and the in-memory store used in tests and
//! by the CLI.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::settings::{SettingsKey, SettingsPatch};

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed settings payload: {0}")]
    Malformed(String),
    #[error("Write rejected: {0}")]
    Rejected(String),
}

pub type ReadCallback = Box<dyn FnOnce(Result<SettingsPatch, StoreError>)>;
pub type WriteCallback = Box<dyn FnOnce(Result<(), StoreError>)>;

/// Called with the changed keys and a patch holding their new values.
pub type ChangeListener = Rc<dyn Fn(&[SettingsKey], &SettingsPatch)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    /// For store implementations outside this crate.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

pub trait SettingsStore {
    /// Read the given keys. Unset keys are absent from the patch.
    fn read(&self, keys: &[SettingsKey], done: ReadCallback);

    /// Persist a partial snapshot. Listeners are notified of keys whose
    /// value actually changed, regardless of which surface wrote them.
    fn write(&self, patch: &SettingsPatch, done: WriteCallback);

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;

    /// Returns false if the subscription was already gone.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Store backed by a patch held in memory. Callbacks run synchronously.
#[derive(Default)]
pub struct MemoryStore {
    values: RefCell<SettingsPatch>,
    listeners: RefCell<Vec<(SubscriptionId, ChangeListener)>>,
    next_id: Cell<u32>,
    unavailable: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: SettingsPatch) -> Self {
        let store = Self::default();
        *store.values.borrow_mut() = values.sanitized();
        store
    }

    /// Simulate an unreachable backend: reads and writes fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    pub fn values(&self) -> SettingsPatch {
        self.values.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.get() {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl SettingsStore for MemoryStore {
    fn read(&self, keys: &[SettingsKey], done: ReadCallback) {
        if let Err(e) = self.check_available() {
            done(Err(e));
            return;
        }

        let values = self.values.borrow();
        let mut out = SettingsPatch::default();
        for key in keys {
            match key {
                SettingsKey::Mode => out.mode = values.mode,
                SettingsKey::Blacklist => out.blacklist = values.blacklist.clone(),
                SettingsKey::FocusKeywords => out.focus_keywords = values.focus_keywords.clone(),
                SettingsKey::AllowedSites => out.allowed_sites = values.allowed_sites.clone(),
            }
        }
        drop(values);

        done(Ok(out));
    }

    fn write(&self, patch: &SettingsPatch, done: WriteCallback) {
        if let Err(e) = self.check_available() {
            done(Err(e));
            return;
        }

        let patch = patch.sanitized();
        let mut changed = SettingsPatch::default();
        {
            let mut values = self.values.borrow_mut();
            if patch.mode.is_some() && patch.mode != values.mode {
                values.mode = patch.mode;
                changed.mode = patch.mode;
            }
            if patch.blacklist.is_some() && patch.blacklist != values.blacklist {
                values.blacklist = patch.blacklist.clone();
                changed.blacklist = patch.blacklist.clone();
            }
            if patch.focus_keywords.is_some() && patch.focus_keywords != values.focus_keywords {
                values.focus_keywords = patch.focus_keywords.clone();
                changed.focus_keywords = patch.focus_keywords.clone();
            }
            if patch.allowed_sites.is_some() && patch.allowed_sites != values.allowed_sites {
                values.allowed_sites = patch.allowed_sites.clone();
                changed.allowed_sites = patch.allowed_sites.clone();
            }
        }

        done(Ok(()));

        if changed.is_empty() {
            return;
        }

        // Listeners may subscribe or unsubscribe while being notified.
        let listeners: Vec<ChangeListener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        let keys = changed.keys();
        for listener in listeners {
            listener(&keys, &changed);
        }
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get().wrapping_add(1));
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_now(store: &MemoryStore, keys: &[SettingsKey]) -> Result<SettingsPatch, StoreError> {
        let slot = Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        store.read(keys, Box::new(move |result| *out.borrow_mut() = Some(result)));
        let result = slot.borrow_mut().take().expect("memory store answers synchronously");
        result
    }

    #[test]
    fn test_read_returns_only_set_keys() {
        let store = MemoryStore::with_values(SettingsPatch {
            mode: Some(true),
            ..Default::default()
        });
        let patch = read_now(&store, &SettingsKey::ALL).unwrap();
        assert_eq!(patch.mode, Some(true));
        assert_eq!(patch.blacklist, None);
    }

    #[test]
    fn test_write_sanitizes_and_notifies_other_surfaces() {
        let store = MemoryStore::new();
        let seen: Rc<RefCell<Vec<Vec<SettingsKey>>>> = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        store.subscribe(Rc::new(move |keys: &[SettingsKey], _: &SettingsPatch| {
            log.borrow_mut().push(keys.to_vec());
        }));

        let acked = Rc::new(Cell::new(false));
        let ack = Rc::clone(&acked);
        store.write(
            &SettingsPatch {
                blacklist: Some(vec!["spam".into(), "".into(), "SPAM".into()]),
                ..Default::default()
            },
            Box::new(move |result| ack.set(result.is_ok())),
        );

        assert!(acked.get());
        assert_eq!(store.values().blacklist, Some(vec!["spam".to_string()]));
        assert_eq!(*seen.borrow(), vec![vec![SettingsKey::Blacklist]]);
    }

    #[test]
    fn test_unchanged_write_does_not_notify() {
        let store = MemoryStore::with_values(SettingsPatch {
            mode: Some(false),
            ..Default::default()
        });
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        store.subscribe(Rc::new(move |_: &[SettingsKey], _: &SettingsPatch| {
            counter.set(counter.get() + 1)
        }));

        store.write(
            &SettingsPatch {
                mode: Some(false),
                ..Default::default()
            },
            Box::new(|_| {}),
        );
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let store = MemoryStore::new();
        let id = store.subscribe(Rc::new(|_: &[SettingsKey], _: &SettingsPatch| {}));
        assert_eq!(store.listener_count(), 1);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_unavailable_store_fails_reads_and_writes() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            read_now(&store, &SettingsKey::ALL),
            Err(StoreError::Unavailable(_))
        ));

        let failed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&failed);
        store.write(&SettingsPatch::default(), Box::new(move |r| flag.set(r.is_err())));
        assert!(failed.get());
    }
}
