//! Change Detector
//!
//! The host page is a single-page application that never fully reloads, so
//! scans are driven by three independent sources: structural mutations,
//! a fallback polling tick, and location changes (after a settle delay).
//! Settings changes are a fourth source.
//!
//! Every source only raises bits on a shared [`RescanSignal`]. Raising into
//! an empty signal tells the caller to schedule one drain; raising into a
//! non-empty signal coalesces with the drain already scheduled. A drain
//! takes the whole pending set and runs a single pass, and it needs
//! exclusive access to the detector, so two passes can never overlap.
//!
//! ```text
//!   Idle ──attach(allowed url)──▶ Active ──detach()──▶ TornDown
//!                                  │  ▲
//!                                  └──┘ trigger → drain → scan pass
//! ```

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::dom::DocumentRoot;
use crate::filter::CompiledFilter;
use crate::scanner::{ScanReport, Scanner};
use crate::settings::{Settings, SettingsMirror, SettingsPatch};
use crate::sites::is_site_allowed;
use crate::store::StoreError;
use crate::types::{DetectorState, Trigger};
use crate::variants::mutation_may_contain_item;

// =============================================================================
// Configuration
// =============================================================================

/// Timer settings for the trigger sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    /// Fallback polling period
    pub poll_interval_ms: u32,
    /// How often the location is compared with the last seen one
    pub location_check_ms: u32,
    /// Wait after a location change before scanning
    pub settle_delay_ms: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
            location_check_ms: 500,
            settle_delay_ms: 400,
        }
    }
}

impl DetectorConfig {
    /// Shortest accepted timer period. Browsers clamp shorter intervals to a
    /// few milliseconds, which would rescan the page continuously.
    pub const MIN_TIMER_MS: u32 = 50;
    /// Longest accepted timer period (browser timers take an `i32`).
    pub const MAX_TIMER_MS: u32 = i32::MAX as u32;

    /// Check every timer against [`MIN_TIMER_MS`](Self::MIN_TIMER_MS) and
    /// [`MAX_TIMER_MS`](Self::MAX_TIMER_MS).
    pub fn validate(&self) -> Result<(), DetectorError> {
        let timers = [
            ("pollIntervalMs", self.poll_interval_ms),
            ("locationCheckMs", self.location_check_ms),
            ("settleDelayMs", self.settle_delay_ms),
        ];
        for (field, value) in timers {
            if !(Self::MIN_TIMER_MS..=Self::MAX_TIMER_MS).contains(&value) {
                return Err(DetectorError::InvalidConfig { field, value });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DetectorError {
    #[error("Detector is not active (state: {})", .0.as_str())]
    NotActive(DetectorState),
    #[error("No rescan pending")]
    NothingPending,
    #[error("{field} must be between 50 and 2147483647 ms, got {value}")]
    InvalidConfig { field: &'static str, value: u32 },
}

// =============================================================================
// Rescan Signal
// =============================================================================

/// Pending trigger set shared by all sources.
#[derive(Debug, Default)]
pub struct RescanSignal {
    pending: Cell<Trigger>,
}

impl RescanSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add triggers. Returns true if the signal was empty, i.e. the caller
    /// must schedule a drain.
    pub fn raise(&self, trigger: Trigger) -> bool {
        let before = self.pending.get();
        self.pending.set(before | trigger);
        before.is_empty() && !trigger.is_empty()
    }

    /// Take every pending trigger, leaving the signal empty.
    pub fn take(&self) -> Trigger {
        self.pending.replace(Trigger::empty())
    }

    pub fn pending(&self) -> Trigger {
        self.pending.get()
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Diagnostics accumulated over the life of a detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub passes: u32,
    /// Triggers folded into an already pending drain
    pub coalesced: u32,
    /// Mutation batches rejected by the pre-filter
    pub mutations_ignored: u32,
    pub navigations: u32,
    pub settings_updates: u32,
    pub totals: ScanReport,
}

// =============================================================================
// Detector
// =============================================================================

pub struct ChangeDetector {
    state: DetectorState,
    config: DetectorConfig,
    settings: SettingsMirror,
    scanner: Scanner,
    signal: Rc<RescanSignal>,
    compiled: Option<(Rc<Settings>, Rc<CompiledFilter>)>,
    last_location: Option<String>,
    stats: DetectorStats,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig, settings: SettingsMirror) -> Self {
        Self {
            state: DetectorState::Idle,
            config,
            settings,
            scanner: Scanner::new(),
            signal: Rc::new(RescanSignal::new()),
            compiled: None,
            last_location: None,
            stats: DetectorStats::default(),
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    pub fn signal(&self) -> Rc<RescanSignal> {
        Rc::clone(&self.signal)
    }

    pub fn settings(&self) -> Rc<Settings> {
        self.settings.snapshot()
    }

    /// `Idle → Active` if `url`'s host is on the allow-list.
    ///
    /// Queues the initial pass. Returns the resulting state; calling it in
    /// any other state changes nothing.
    pub fn attach(&mut self, url: &str) -> DetectorState {
        if self.state != DetectorState::Idle {
            log::debug!("attach ignored in state {}", self.state.as_str());
            return self.state;
        }

        let snapshot = self.settings.snapshot();
        if !is_site_allowed(url, &snapshot.allowed_sites) {
            log::info!("focus mode idle: {} is not an allowed site", url);
            return self.state;
        }

        log::info!("focus mode active on {}", url);
        self.state = DetectorState::Active;
        self.last_location = Some(url.to_string());
        self.raise(Trigger::INITIAL);
        self.state
    }

    /// `Active → TornDown`. Drops pending triggers. Returns false if the
    /// detector was already torn down.
    pub fn detach(&mut self) -> bool {
        if self.state == DetectorState::TornDown {
            return false;
        }
        log::info!("focus mode detached after {} passes", self.stats.passes);
        self.state = DetectorState::TornDown;
        self.signal.take();
        self.compiled = None;
        true
    }

    /// Raise triggers. Returns true if a drain must be scheduled.
    pub fn raise(&mut self, trigger: Trigger) -> bool {
        if self.state != DetectorState::Active {
            return false;
        }
        let schedule = self.signal.raise(trigger);
        if !schedule {
            self.stats.coalesced = self.stats.coalesced.saturating_add(1);
        }
        schedule
    }

    /// A mutation batch arrived; `added_tags` are the tag names of the
    /// added element nodes. Raises only if one passes the pre-filter.
    pub fn on_mutation<'t, I>(&mut self, added_tags: I) -> bool
    where
        I: IntoIterator<Item = &'t str>,
    {
        if self.state != DetectorState::Active {
            return false;
        }
        if added_tags.into_iter().any(mutation_may_contain_item) {
            self.raise(Trigger::MUTATION)
        } else {
            self.stats.mutations_ignored = self.stats.mutations_ignored.saturating_add(1);
            false
        }
    }

    pub fn on_interval(&mut self) -> bool {
        self.raise(Trigger::INTERVAL)
    }

    /// Compare the current location with the last one seen.
    ///
    /// Returns true once per distinct location; the caller then (re)arms the
    /// settle timer and calls [`on_settled`](Self::on_settled) when it fires.
    pub fn observe_location(&mut self, url: &str) -> bool {
        if self.state != DetectorState::Active {
            return false;
        }
        if self.last_location.as_deref() == Some(url) {
            return false;
        }
        log::debug!("location changed to {}", url);
        self.last_location = Some(url.to_string());
        self.stats.navigations = self.stats.navigations.saturating_add(1);
        true
    }

    pub fn on_settled(&mut self) -> bool {
        self.raise(Trigger::NAVIGATION)
    }

    /// Result of the initial settings read. Failures keep the last snapshot.
    pub fn on_settings_read(&mut self, result: Result<SettingsPatch, StoreError>) -> bool {
        if self.settings.on_read(result) {
            self.stats.settings_updates = self.stats.settings_updates.saturating_add(1);
            return self.raise(Trigger::SETTINGS);
        }
        false
    }

    /// A change notification from the store.
    pub fn on_settings_change(&mut self, patch: &SettingsPatch) -> bool {
        if self.state == DetectorState::TornDown {
            return false;
        }
        if self.settings.on_change(patch) {
            self.stats.settings_updates = self.stats.settings_updates.saturating_add(1);
            return self.raise(Trigger::SETTINGS);
        }
        false
    }

    /// Run one coalesced pass for everything raised since the last drain.
    ///
    /// The pass uses the snapshot current at its start.
    pub fn drain<D: DocumentRoot>(&mut self, root: &D) -> Result<ScanReport, DetectorError> {
        if self.state != DetectorState::Active {
            return Err(DetectorError::NotActive(self.state));
        }
        let triggers = self.signal.take();
        if triggers.is_empty() {
            return Err(DetectorError::NothingPending);
        }

        let filter = self.filter();
        let report = self.scanner.scan_with(root, &filter);

        self.stats.passes = self.stats.passes.saturating_add(1);
        self.stats.totals.merge(&report);
        log::trace!("pass {} for {:?}", self.stats.passes, triggers);

        Ok(report)
    }

    /// Compiled filter for the current snapshot, rebuilt only when the
    /// snapshot changes.
    fn filter(&mut self) -> Rc<CompiledFilter> {
        let snapshot = self.settings.snapshot();
        if let Some((ref cached_for, ref filter)) = self.compiled {
            if Rc::ptr_eq(cached_for, &snapshot) {
                return Rc::clone(filter);
            }
        }
        let filter = Rc::new(CompiledFilter::from_settings(&snapshot));
        self.compiled = Some((snapshot, Rc::clone(&filter)));
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryDocument, MemoryItem};

    const HOME: &str = "https://www.youtube.com/";

    fn detector_with(settings: Settings) -> ChangeDetector {
        ChangeDetector::new(DetectorConfig::default(), SettingsMirror::with_snapshot(settings))
    }

    fn video(doc: &MemoryDocument, title: &str) -> MemoryItem {
        doc.push(MemoryItem::new("ytd-rich-item-renderer").with_text("#video-title", title))
    }

    #[test]
    fn test_config_defaults_and_partial_json() {
        let config: DetectorConfig = serde_json::from_str(r#"{"settleDelayMs": 50}"#).unwrap();
        assert_eq!(config.settle_delay_ms, 50);
        assert_eq!(config.poll_interval_ms, DetectorConfig::default().poll_interval_ms);
    }

    #[test]
    fn test_signal_coalesces() {
        let signal = RescanSignal::new();
        assert!(signal.raise(Trigger::MUTATION));
        assert!(!signal.raise(Trigger::INTERVAL));
        assert!(!signal.raise(Trigger::MUTATION));
        assert_eq!(signal.take(), Trigger::MUTATION | Trigger::INTERVAL);
        assert!(signal.pending().is_empty());
        assert!(!signal.raise(Trigger::empty()));
    }

    #[test]
    fn test_disallowed_site_stays_idle() {
        let mut settings = Settings::default();
        settings.allowed_sites = vec!["example.com".to_string()];
        let mut detector = detector_with(settings);
        let doc = MemoryDocument::new();
        video(&doc, "drama");

        assert_eq!(detector.attach("https://other.com/"), DetectorState::Idle);
        assert!(!detector.on_interval());
        assert!(!detector.on_mutation(["ytd-rich-item-renderer"]));
        assert_eq!(detector.drain(&doc), Err(DetectorError::NotActive(DetectorState::Idle)));
        assert_eq!(doc.query_count(), 0);
    }

    #[test]
    fn test_attach_queues_initial_pass() {
        let mut detector = detector_with(Settings::default());
        let doc = MemoryDocument::new();
        let drama = video(&doc, "Celebrity drama explained");

        assert_eq!(detector.attach(HOME), DetectorState::Active);
        assert_eq!(detector.signal().pending(), Trigger::INITIAL);

        let report = detector.drain(&doc).unwrap();
        assert_eq!(report.blacklisted, 1);
        assert!(drama.is_hidden());
        assert_eq!(detector.drain(&doc), Err(DetectorError::NothingPending));
    }

    #[test]
    fn test_overlapping_triggers_run_one_pass() {
        let mut detector = detector_with(Settings::default());
        let doc = MemoryDocument::new();
        detector.attach(HOME);
        detector.drain(&doc).unwrap();

        assert!(detector.on_mutation(["ytd-rich-grid-row"]));
        assert!(!detector.on_interval());
        assert!(!detector.on_mutation(["ytd-rich-item-renderer"]));

        detector.drain(&doc).unwrap();
        assert_eq!(detector.drain(&doc), Err(DetectorError::NothingPending));
        assert_eq!(detector.stats().passes, 2);
        assert_eq!(detector.stats().coalesced, 2);
    }

    #[test]
    fn test_mutation_prefilter_ignores_plain_markup() {
        let mut detector = detector_with(Settings::default());
        detector.attach(HOME);
        detector.signal().take();

        assert!(!detector.on_mutation(["div", "span", "#text"]));
        assert!(!detector.on_mutation(std::iter::empty()));
        assert!(detector.signal().pending().is_empty());
        assert_eq!(detector.stats().mutations_ignored, 2);
    }

    #[test]
    fn test_location_change_reported_once() {
        let mut detector = detector_with(Settings::default());
        detector.attach(HOME);

        assert!(!detector.observe_location(HOME));
        assert!(detector.observe_location("https://www.youtube.com/results?search_query=x"));
        assert!(!detector.observe_location("https://www.youtube.com/results?search_query=x"));
        assert_eq!(detector.stats().navigations, 1);

        detector.signal().take();
        assert!(detector.on_settled());
        assert_eq!(detector.signal().pending(), Trigger::NAVIGATION);
    }

    #[test]
    fn test_settings_change_applies_to_next_pass_only() {
        let mut detector = detector_with(Settings::default());
        let doc = MemoryDocument::new();
        let cats = video(&doc, "Funny cats");
        detector.attach(HOME);
        detector.drain(&doc).unwrap();
        assert!(!cats.is_hidden());

        assert!(detector.on_settings_change(&SettingsPatch {
            mode: Some(true),
            ..Default::default()
        }));
        let newcomer = video(&doc, "Funny dogs");
        let report = detector.drain(&doc).unwrap();

        assert_eq!(report.distractions, 1);
        assert!(newcomer.is_hidden());
        assert!(!cats.is_hidden());
        assert_eq!(detector.stats().settings_updates, 1);
    }

    #[test]
    fn test_unchanged_settings_do_not_trigger() {
        let mut detector = detector_with(Settings::default());
        detector.attach(HOME);
        detector.signal().take();
        assert!(!detector.on_settings_change(&SettingsPatch {
            mode: Some(false),
            ..Default::default()
        }));
        assert!(detector.signal().pending().is_empty());
    }

    #[test]
    fn test_settings_read_failure_uses_defaults() {
        let mut detector = ChangeDetector::new(DetectorConfig::default(), SettingsMirror::new());
        assert!(!detector.on_settings_read(Err(StoreError::Unavailable("offline".into()))));
        assert_eq!(*detector.settings(), Settings::default());
        assert_eq!(detector.attach(HOME), DetectorState::Active);
    }

    #[test]
    fn test_filter_is_reused_until_snapshot_changes() {
        let mut detector = detector_with(Settings::default());
        detector.attach(HOME);
        let first = detector.filter();
        assert!(Rc::ptr_eq(&first, &detector.filter()));

        detector.on_settings_change(&SettingsPatch {
            mode: Some(true),
            ..Default::default()
        });
        assert!(!Rc::ptr_eq(&first, &detector.filter()));
    }

    #[test]
    fn test_detach_is_idempotent_and_final() {
        let mut detector = detector_with(Settings::default());
        let doc = MemoryDocument::new();
        detector.attach(HOME);
        detector.on_interval();

        assert!(detector.detach());
        assert!(!detector.detach());
        assert_eq!(detector.state(), DetectorState::TornDown);
        assert!(detector.signal().pending().is_empty());

        assert!(!detector.on_interval());
        assert!(!detector.observe_location("https://www.youtube.com/feed"));
        assert!(!detector.on_settings_change(&SettingsPatch {
            mode: Some(true),
            ..Default::default()
        }));
        assert_eq!(detector.attach(HOME), DetectorState::TornDown);
        assert_eq!(
            detector.drain(&doc),
            Err(DetectorError::NotActive(DetectorState::TornDown))
        );
        assert_eq!(doc.query_count(), 0);
    }

    #[test]
    fn test_config_rejects_storm_and_overflowing_timers() {
        assert_eq!(DetectorConfig::default().validate(), Ok(()));

        let zero: DetectorConfig = serde_json::from_str(r#"{"pollIntervalMs": 0, "locationCheckMs": 0}"#).unwrap();
        assert_eq!(
            zero.validate(),
            Err(DetectorError::InvalidConfig {
                field: "pollIntervalMs",
                value: 0
            })
        );

        let huge: DetectorConfig = serde_json::from_str(r#"{"settleDelayMs": 3000000000}"#).unwrap();
        assert!(matches!(
            huge.validate(),
            Err(DetectorError::InvalidConfig {
                field: "settleDelayMs",
                ..
            })
        ));

        let floor = DetectorConfig {
            poll_interval_ms: DetectorConfig::MIN_TIMER_MS,
            location_check_ms: DetectorConfig::MIN_TIMER_MS,
            settle_delay_ms: DetectorConfig::MAX_TIMER_MS,
        };
        assert_eq!(floor.validate(), Ok(()));
    }
}
