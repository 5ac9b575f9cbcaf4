//! Content script runtime
//!
//! Owns one [`ChangeDetector`] per page and the browser resources that feed
//! it: a `MutationObserver` on the document, the polling interval, the
//! location-check interval with its settle timeout, the settings store
//! listener and the zero-delay timeout that runs a drain.
//!
//! Every callback holds a `Weak` reference to the runtime. Teardown
//! disconnects the observer and clears every timer before the closures are
//! dropped, so no callback fires afterwards.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fm_core::detector::{ChangeDetector, DetectorConfig, DetectorStats};
use fm_core::settings::{SettingsKey, SettingsMirror, SettingsPatch};
use fm_core::store::{SettingsStore, StoreError, SubscriptionId};
use fm_core::types::{DetectorState, Trigger};
use fm_core::RescanSignal;
use js_sys::Array;
use wasm_bindgen::prelude::*;
use web_sys::{Element, MutationObserver, MutationObserverInit, MutationRecord, Node, Window};

use crate::dom::WebDocument;
use crate::storage::ChromeStorage;

type TimerClosure = Closure<dyn FnMut()>;
type ObserverClosure = Closure<dyn FnMut(Array, MutationObserver)>;

/// Timer periods as the browser takes them.
#[derive(Clone, Copy)]
struct Timers {
    poll: i32,
    location: i32,
    settle: i32,
}

impl Timers {
    fn from_config(config: &DetectorConfig) -> Result<Self, JsValue> {
        config
            .validate()
            .map_err(|e| JsValue::from_str(&format!("Invalid detector config: {}", e)))?;
        let ms = |value: u32| {
            i32::try_from(value).map_err(|_| JsValue::from_str(&format!("Timer period out of range: {}", value)))
        };
        Ok(Self {
            poll: ms(config.poll_interval_ms)?,
            location: ms(config.location_check_ms)?,
            settle: ms(config.settle_delay_ms)?,
        })
    }
}

/// Resources that exist only while the detector is active.
struct Sources {
    observer: MutationObserver,
    _observer_cb: ObserverClosure,
    poll_id: i32,
    _poll_cb: TimerClosure,
    location_id: i32,
    _location_cb: TimerClosure,
    subscription: SubscriptionId,
}

pub struct ContentScript {
    window: Window,
    document: WebDocument,
    store: Box<dyn SettingsStore>,
    timers: Timers,
    detector: RefCell<ChangeDetector>,
    signal: Rc<RescanSignal>,
    /// Store changes that arrived while a pass held the detector.
    deferred: RefCell<Option<SettingsPatch>>,
    sources: RefCell<Option<Sources>>,
    drain_cb: RefCell<Option<TimerClosure>>,
    drain_timer: Cell<Option<i32>>,
    settle_cb: RefCell<Option<TimerClosure>>,
    settle_timer: Cell<Option<i32>>,
}

impl ContentScript {
    /// Runtime backed by `chrome.storage.sync`.
    pub fn new(window: Window, config: DetectorConfig) -> Result<Rc<Self>, JsValue> {
        if !ChromeStorage::is_available() {
            log::warn!("chrome.storage unavailable; using built-in settings");
        }
        Self::with_store(window, config, Box::new(ChromeStorage::new()))
    }

    pub fn with_store(
        window: Window,
        config: DetectorConfig,
        store: Box<dyn SettingsStore>,
    ) -> Result<Rc<Self>, JsValue> {
        let timers = Timers::from_config(&config)?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("No document on window"))?;
        let detector = ChangeDetector::new(config, SettingsMirror::new());
        let signal = detector.signal();

        Ok(Rc::new(Self {
            window,
            document: WebDocument::new(document),
            store,
            timers,
            detector: RefCell::new(detector),
            signal,
            deferred: RefCell::new(None),
            sources: RefCell::new(None),
            drain_cb: RefCell::new(None),
            drain_timer: Cell::new(None),
            settle_cb: RefCell::new(None),
            settle_timer: Cell::new(None),
        }))
    }

    pub fn state(&self) -> DetectorState {
        self.detector.borrow().state()
    }

    pub fn stats(&self) -> DetectorStats {
        self.detector.borrow().stats()
    }

    /// Load settings, then attach if the page is eligible.
    pub fn start(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.store.read(
            &SettingsKey::ALL,
            Box::new(move |result| {
                if let Some(this) = weak.upgrade() {
                    this.on_settings_loaded(result);
                }
            }),
        );
    }

    fn on_settings_loaded(self: &Rc<Self>, result: Result<SettingsPatch, StoreError>) {
        let url = self.current_url();
        let state = {
            let mut detector = self.detector.borrow_mut();
            detector.on_settings_read(result);
            detector.attach(&url)
        };

        if state != DetectorState::Active {
            return;
        }

        if let Err(e) = self.install_sources() {
            log::error!("failed to start change detection: {:?}", e);
            self.teardown();
            return;
        }
        self.schedule_drain();
    }

    fn current_url(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn install_sources(self: &Rc<Self>) -> Result<(), JsValue> {
        let weak = Rc::downgrade(self);
        *self.drain_cb.borrow_mut() = Some(Closure::new(move || {
            if let Some(this) = weak.upgrade() {
                this.run_drain();
            }
        }));

        let weak = Rc::downgrade(self);
        *self.settle_cb.borrow_mut() = Some(Closure::new(move || {
            if let Some(this) = weak.upgrade() {
                this.settle_timer.set(None);
                this.with_detector(Trigger::NAVIGATION, |d| d.on_settled());
            }
        }));

        let weak = Rc::downgrade(self);
        let observer_cb: ObserverClosure = Closure::new(move |records: Array, _: MutationObserver| {
            if let Some(this) = weak.upgrade() {
                let tags = added_element_tags(&records);
                this.with_detector(Trigger::MUTATION, |d| {
                    d.on_mutation(tags.iter().map(String::as_str))
                });
            }
        });
        let observer = MutationObserver::new(observer_cb.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        let target: Node = match self.document.document().body() {
            Some(body) => body.into(),
            None => self.document.document().clone().into(),
        };
        observer.observe_with_options(&target, &init)?;

        let weak = Rc::downgrade(self);
        let poll_cb: TimerClosure = Closure::new(move || {
            if let Some(this) = weak.upgrade() {
                this.with_detector(Trigger::INTERVAL, |d| d.on_interval());
            }
        });
        let poll_id = self
            .window
            .set_interval_with_callback_and_timeout_and_arguments_0(poll_cb.as_ref().unchecked_ref(), self.timers.poll)?;

        let weak = Rc::downgrade(self);
        let location_cb: TimerClosure = Closure::new(move || {
            if let Some(this) = weak.upgrade() {
                this.check_location();
            }
        });
        let location_id = self.window.set_interval_with_callback_and_timeout_and_arguments_0(
            location_cb.as_ref().unchecked_ref(),
            self.timers.location,
        )?;

        let weak = Rc::downgrade(self);
        let subscription = self.store.subscribe(Rc::new(move |_keys: &[SettingsKey], patch: &SettingsPatch| {
            if let Some(this) = weak.upgrade() {
                this.on_store_change(patch);
            }
        }));

        *self.sources.borrow_mut() = Some(Sources {
            observer,
            _observer_cb: observer_cb,
            poll_id,
            _poll_cb: poll_cb,
            location_id,
            _location_cb: location_cb,
            subscription,
        });

        Ok(())
    }

    /// Run `f` against the detector and schedule a drain if it asks for one.
    ///
    /// The detector is only busy while a drain runs. These triggers carry no
    /// payload, so one arriving then is folded into the shared signal as
    /// `fallback` and picked up after the pass.
    fn with_detector<F>(&self, fallback: Trigger, f: F)
    where
        F: FnOnce(&mut ChangeDetector) -> bool,
    {
        let schedule = match self.detector.try_borrow_mut() {
            Ok(mut detector) => f(&mut detector),
            Err(_) => self.signal.raise(fallback),
        };
        if schedule {
            self.schedule_drain();
        }
    }

    /// A store change carries new values, so a busy detector gets it queued
    /// rather than reduced to a trigger.
    fn on_store_change(&self, patch: &SettingsPatch) {
        let schedule = match self.detector.try_borrow_mut() {
            Ok(mut detector) => detector.on_settings_change(patch),
            Err(_) => {
                let mut deferred = self.deferred.borrow_mut();
                match deferred.as_mut() {
                    Some(queued) => queued.merge(patch),
                    None => *deferred = Some(patch.clone()),
                }
                false
            }
        };
        if schedule {
            self.schedule_drain();
        }
    }

    fn check_location(&self) {
        let url = self.current_url();
        let changed = match self.detector.try_borrow_mut() {
            Ok(mut detector) => detector.observe_location(&url),
            Err(_) => false,
        };
        if changed {
            self.arm_settle_timer();
        }
    }

    /// (Re)start the settle timeout; a newer navigation postpones the scan.
    fn arm_settle_timer(&self) {
        if let Some(handle) = self.settle_timer.take() {
            self.window.clear_timeout_with_handle(handle);
        }
        let settle_cb = self.settle_cb.borrow();
        if let Some(cb) = settle_cb.as_ref() {
            match self
                .window
                .set_timeout_with_callback_and_timeout_and_arguments_0(cb.as_ref().unchecked_ref(), self.timers.settle)
            {
                Ok(handle) => self.settle_timer.set(Some(handle)),
                Err(e) => log::warn!("failed to arm settle timer: {:?}", e),
            }
        }
    }

    fn schedule_drain(&self) {
        if self.drain_timer.get().is_some() {
            return;
        }
        let drain_cb = self.drain_cb.borrow();
        if let Some(cb) = drain_cb.as_ref() {
            match self
                .window
                .set_timeout_with_callback_and_timeout_and_arguments_0(cb.as_ref().unchecked_ref(), 0)
            {
                Ok(handle) => self.drain_timer.set(Some(handle)),
                Err(e) => log::warn!("failed to schedule scan: {:?}", e),
            }
        }
    }

    fn run_drain(&self) {
        self.drain_timer.set(None);

        let result = self.detector.borrow_mut().drain(&self.document);
        match result {
            Ok(report) if report.hidden() > 0 => {
                log::info!("hid {} of {} new items", report.hidden(), report.evaluated)
            }
            Ok(_) => {}
            Err(e) => log::trace!("drain skipped: {}", e),
        }

        let deferred = self.deferred.borrow_mut().take();
        if let Some(patch) = deferred {
            if self.detector.borrow_mut().on_settings_change(&patch) {
                self.schedule_drain();
            }
        }

        // Raised while the pass ran (only via the busy fallback).
        if !self.signal.pending().is_empty() && self.state() == DetectorState::Active {
            self.schedule_drain();
        }
    }

    /// Release every source. Safe to call more than once.
    pub fn teardown(&self) {
        let detached = self.detector.borrow_mut().detach();

        if let Some(sources) = self.sources.borrow_mut().take() {
            sources.observer.disconnect();
            self.window.clear_interval_with_handle(sources.poll_id);
            self.window.clear_interval_with_handle(sources.location_id);
            self.store.unsubscribe(sources.subscription);
        }
        if let Some(handle) = self.drain_timer.take() {
            self.window.clear_timeout_with_handle(handle);
        }
        if let Some(handle) = self.settle_timer.take() {
            self.window.clear_timeout_with_handle(handle);
        }
        self.drain_cb.borrow_mut().take();
        self.settle_cb.borrow_mut().take();
        self.deferred.borrow_mut().take();

        if detached {
            log::debug!("content script torn down");
        }
    }
}

impl Drop for ContentScript {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn added_element_tags(records: &Array) -> Vec<String> {
    let mut tags = Vec::new();
    for record in records.iter() {
        let record: MutationRecord = record.unchecked_into();
        let added = record.added_nodes();
        for i in 0..added.length() {
            if let Some(element) = added.item(i).and_then(|n| n.dyn_into::<Element>().ok()) {
                tags.push(element.local_name());
            }
        }
    }
    tags
}

thread_local! {
    static INSTANCE: RefCell<Option<Rc<ContentScript>>> = const { RefCell::new(None) };
}

/// Create and start the page's content script over `chrome.storage.sync`.
pub fn attach(config: DetectorConfig) -> Result<(), JsValue> {
    install(|window| ContentScript::new(window, config))
}

/// Same as [`attach`] with another settings backend.
pub fn attach_with_store(config: DetectorConfig, store: Box<dyn SettingsStore>) -> Result<(), JsValue> {
    install(|window| ContentScript::with_store(window, config, store))
}

fn install<F>(build: F) -> Result<(), JsValue>
where
    F: FnOnce(Window) -> Result<Rc<ContentScript>, JsValue>,
{
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;

    let already = INSTANCE.with(|slot| slot.borrow().is_some());
    if already {
        return Err(JsValue::from_str("Already attached. Call detach() first."));
    }

    let script = build(window)?;
    INSTANCE.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&script)));
    script.start();
    Ok(())
}

/// Tear down the page's content script. Returns false if none was attached.
pub fn detach() -> bool {
    let script = INSTANCE.with(|slot| slot.borrow_mut().take());
    match script {
        Some(script) => {
            script.teardown();
            true
        }
        None => false,
    }
}

pub fn with_instance<R>(f: impl FnOnce(&ContentScript) -> R) -> Option<R> {
    INSTANCE.with(|slot| slot.borrow().as_ref().map(|script| f(script)))
}
