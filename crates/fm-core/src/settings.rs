//! Settings model
//!
//! The persisted settings are a small JSON object shared by the popup, the
//! settings page and the content script. The core only ever sees immutable
//! [`Settings`] snapshots; edits produce a new snapshot.
//!
//! All sanitization happens here, at the write boundary. The filter engine
//! relies on keyword lists never containing blank entries.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sites::extract_host;
use crate::store::StoreError;

/// The site the extension targets. It can never be removed from the allow-list.
pub const DEFAULT_SITE: &str = "youtube.com";

const DEFAULT_BLACKLIST: &[&str] = &["clickbait", "drama", "reaction"];
const DEFAULT_FOCUS_KEYWORDS: &[&str] = &["entertainment", "funny", "memes"];

// =============================================================================
// Errors
// =============================================================================

/// Error type for settings edits.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Keyword is empty")]
    EmptyKeyword,
    #[error("Keyword already present: {0}")]
    DuplicateKeyword(String),
    #[error("Keyword not found: {0}")]
    MissingKeyword(String),
    #[error("Site is empty")]
    EmptySite,
    #[error("Site has no host: {0}")]
    InvalidSite(String),
    #[error("Site already allowed: {0}")]
    DuplicateSite(String),
    #[error("Site not found: {0}")]
    MissingSite(String),
    #[error("The default site {0} cannot be removed")]
    DefaultSiteRemoval(String),
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Keys
// =============================================================================

/// Storage keys, one per settings field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsKey {
    Mode,
    Blacklist,
    FocusKeywords,
    AllowedSites,
}

impl SettingsKey {
    pub const ALL: [SettingsKey; 4] = [
        Self::Mode,
        Self::Blacklist,
        Self::FocusKeywords,
        Self::AllowedSites,
    ];

    /// Key name in the persisted store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mode => "isFocusMode",
            Self::Blacklist => "blacklistedKeywords",
            Self::FocusKeywords => "focusKeywords",
            Self::AllowedSites => "allowedWebsites",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == s)
    }
}

/// Which keyword list an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordList {
    Blacklist,
    Focus,
}

// =============================================================================
// Snapshot
// =============================================================================

/// A complete settings snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Focus mode: when on, focus keywords are enforced too
    #[serde(rename = "isFocusMode", default)]
    pub mode: bool,
    /// Always-on keywords
    #[serde(rename = "blacklistedKeywords", default = "default_blacklist")]
    pub blacklist: Vec<String>,
    /// Keywords enforced only in focus mode
    #[serde(rename = "focusKeywords", default = "default_focus_keywords")]
    pub focus_keywords: Vec<String>,
    /// Host substrings on which the content script runs
    #[serde(rename = "allowedWebsites", default = "default_allowed_sites")]
    pub allowed_sites: Vec<String>,
}

fn default_blacklist() -> Vec<String> {
    DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect()
}

fn default_focus_keywords() -> Vec<String> {
    DEFAULT_FOCUS_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

fn default_allowed_sites() -> Vec<String> {
    vec![DEFAULT_SITE.to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: false,
            blacklist: default_blacklist(),
            focus_keywords: default_focus_keywords(),
            allowed_sites: default_allowed_sites(),
        }
    }
}

impl Settings {
    /// Parse a settings object, filling missing keys with defaults and
    /// sanitizing every list.
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        let raw: Settings = serde_json::from_str(text)?;
        Ok(raw.sanitized())
    }

    pub fn to_json_pretty(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Copy with all lists sanitized.
    pub fn sanitized(&self) -> Self {
        Self {
            mode: self.mode,
            blacklist: sanitize_keywords(&self.blacklist),
            focus_keywords: sanitize_keywords(&self.focus_keywords),
            allowed_sites: normalize_sites(&self.allowed_sites),
        }
    }

    /// New snapshot with every present patch field applied.
    pub fn apply(&self, patch: &SettingsPatch) -> Self {
        let mut next = self.clone();
        if let Some(mode) = patch.mode {
            next.mode = mode;
        }
        if let Some(ref list) = patch.blacklist {
            next.blacklist = sanitize_keywords(list);
        }
        if let Some(ref list) = patch.focus_keywords {
            next.focus_keywords = sanitize_keywords(list);
        }
        if let Some(ref sites) = patch.allowed_sites {
            next.allowed_sites = normalize_sites(sites);
        }
        next
    }

    pub fn keywords(&self, list: KeywordList) -> &[String] {
        match list {
            KeywordList::Blacklist => &self.blacklist,
            KeywordList::Focus => &self.focus_keywords,
        }
    }

    /// New snapshot with `keyword` appended to `list`.
    pub fn with_keyword_added(&self, list: KeywordList, keyword: &str) -> Result<Self, SettingsError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(SettingsError::EmptyKeyword);
        }
        let current = self.keywords(list);
        if current.iter().any(|k| k.to_lowercase() == keyword.to_lowercase()) {
            return Err(SettingsError::DuplicateKeyword(keyword.to_string()));
        }

        let mut updated = current.to_vec();
        updated.push(keyword.to_string());
        Ok(self.with_keywords(list, updated))
    }

    /// New snapshot with `keyword` removed from `list` (case-insensitive).
    pub fn with_keyword_removed(&self, list: KeywordList, keyword: &str) -> Result<Self, SettingsError> {
        let target = keyword.trim().to_lowercase();
        let current = self.keywords(list);
        let updated: Vec<String> = current
            .iter()
            .filter(|k| k.to_lowercase() != target)
            .cloned()
            .collect();
        if updated.len() == current.len() {
            return Err(SettingsError::MissingKeyword(keyword.to_string()));
        }
        Ok(self.with_keywords(list, updated))
    }

    fn with_keywords(&self, list: KeywordList, keywords: Vec<String>) -> Self {
        let mut next = self.clone();
        match list {
            KeywordList::Blacklist => next.blacklist = keywords,
            KeywordList::Focus => next.focus_keywords = keywords,
        }
        next
    }

    /// New snapshot with `site` allowed. A full URL is reduced to its host.
    pub fn with_site_added(&self, site: &str) -> Result<Self, SettingsError> {
        let site = site_entry(site)?;
        if self.allowed_sites.contains(&site) {
            return Err(SettingsError::DuplicateSite(site));
        }

        let mut next = self.clone();
        next.allowed_sites.push(site);
        next.allowed_sites = normalize_sites(&next.allowed_sites);
        Ok(next)
    }

    pub fn with_site_removed(&self, site: &str) -> Result<Self, SettingsError> {
        let site = site_entry(site)?;
        if site == DEFAULT_SITE {
            return Err(SettingsError::DefaultSiteRemoval(site));
        }
        if !self.allowed_sites.contains(&site) {
            return Err(SettingsError::MissingSite(site));
        }

        let mut next = self.clone();
        next.allowed_sites.retain(|s| *s != site);
        Ok(next)
    }

    /// Patch carrying every field of this snapshot.
    pub fn to_patch(&self) -> SettingsPatch {
        SettingsPatch {
            mode: Some(self.mode),
            blacklist: Some(self.blacklist.clone()),
            focus_keywords: Some(self.focus_keywords.clone()),
            allowed_sites: Some(self.allowed_sites.clone()),
        }
    }
}

// =============================================================================
// Sanitization
// =============================================================================

/// Trim entries, drop blanks and case-insensitive duplicates.
///
/// The first spelling of a duplicated keyword is kept.
pub fn sanitize_keywords<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(keywords.len());
    let mut out = Vec::with_capacity(keywords.len());

    for keyword in keywords {
        let keyword = keyword.as_ref().trim();
        if keyword.is_empty() {
            continue;
        }
        let lower = keyword.to_lowercase();
        if seen.contains(&lower) {
            continue;
        }
        seen.push(lower);
        out.push(keyword.to_string());
    }

    out
}

/// Allow-list entry for user input: trimmed, lowercased, and reduced to the
/// host when given as a URL. Entries are matched against page hosts only.
pub fn site_entry(raw: &str) -> Result<String, SettingsError> {
    let site = raw.trim().to_ascii_lowercase();
    if site.is_empty() {
        return Err(SettingsError::EmptySite);
    }
    if !site.contains("://") {
        return Ok(site);
    }
    match extract_host(&site) {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(SettingsError::InvalidSite(raw.trim().to_string())),
    }
}

/// Normalize sites with [`site_entry`], drop blanks, hostless URLs and
/// duplicates, and make sure the default site is present (first, if it had
/// to be added).
pub fn normalize_sites<S: AsRef<str>>(sites: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(sites.len() + 1);

    for site in sites {
        let site = match site_entry(site.as_ref()) {
            Ok(site) => site,
            Err(SettingsError::EmptySite) => continue,
            Err(e) => {
                log::warn!("dropping allow-list entry: {}", e);
                continue;
            }
        };
        if out.contains(&site) {
            continue;
        }
        out.push(site);
    }

    if !out.iter().any(|s| s == DEFAULT_SITE) {
        out.insert(0, DEFAULT_SITE.to_string());
    }

    out
}

// =============================================================================
// Patch
// =============================================================================

/// A partial snapshot: reads, writes and change notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(rename = "isFocusMode", default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<bool>,
    #[serde(rename = "blacklistedKeywords", default, skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<Vec<String>>,
    #[serde(rename = "focusKeywords", default, skip_serializing_if = "Option::is_none")]
    pub focus_keywords: Option<Vec<String>>,
    #[serde(rename = "allowedWebsites", default, skip_serializing_if = "Option::is_none")]
    pub allowed_sites: Option<Vec<String>>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Keys present in this patch.
    pub fn keys(&self) -> Vec<SettingsKey> {
        let mut keys = Vec::new();
        if self.mode.is_some() {
            keys.push(SettingsKey::Mode);
        }
        if self.blacklist.is_some() {
            keys.push(SettingsKey::Blacklist);
        }
        if self.focus_keywords.is_some() {
            keys.push(SettingsKey::FocusKeywords);
        }
        if self.allowed_sites.is_some() {
            keys.push(SettingsKey::AllowedSites);
        }
        keys
    }

    /// Fold a later patch into this one; fields present in `newer` win.
    pub fn merge(&mut self, newer: &SettingsPatch) {
        if newer.mode.is_some() {
            self.mode = newer.mode;
        }
        if newer.blacklist.is_some() {
            self.blacklist = newer.blacklist.clone();
        }
        if newer.focus_keywords.is_some() {
            self.focus_keywords = newer.focus_keywords.clone();
        }
        if newer.allowed_sites.is_some() {
            self.allowed_sites = newer.allowed_sites.clone();
        }
    }

    /// Sanitized copy, as it would be persisted.
    pub fn sanitized(&self) -> Self {
        Self {
            mode: self.mode,
            blacklist: self.blacklist.as_deref().map(sanitize_keywords),
            focus_keywords: self.focus_keywords.as_deref().map(sanitize_keywords),
            allowed_sites: self.allowed_sites.as_deref().map(normalize_sites),
        }
    }

    /// Decode a storage object key by key.
    ///
    /// A malformed value only drops its own key; the rejected keys are
    /// returned alongside the patch. Missing and `null` values are absent.
    pub fn from_json(value: &Value) -> (Self, Vec<SettingsKey>) {
        let mut patch = Self::default();
        let mut rejected = Vec::new();

        let object = match value.as_object() {
            Some(object) => object,
            None => {
                log::warn!("settings payload is not an object; ignoring it");
                return (patch, SettingsKey::ALL.to_vec());
            }
        };

        for key in SettingsKey::ALL {
            let raw = match object.get(key.as_str()) {
                Some(Value::Null) | None => continue,
                Some(raw) => raw,
            };

            let ok = match key {
                SettingsKey::Mode => decode_into(raw, &mut patch.mode),
                SettingsKey::Blacklist => decode_into(raw, &mut patch.blacklist),
                SettingsKey::FocusKeywords => decode_into(raw, &mut patch.focus_keywords),
                SettingsKey::AllowedSites => decode_into(raw, &mut patch.allowed_sites),
            };

            if !ok {
                log::warn!("ignoring malformed settings value for {}: {}", key.as_str(), raw);
                rejected.push(key);
            }
        }

        (patch, rejected)
    }

    /// Decode a change notification shaped `{ key: { oldValue, newValue } }`.
    ///
    /// Keys whose `newValue` is missing (deleted from the store) are skipped.
    pub fn from_storage_changes(changes: &Value) -> (Self, Vec<SettingsKey>) {
        let object = match changes.as_object() {
            Some(object) => object,
            None => return (Self::default(), Vec::new()),
        };

        let mut new_values = serde_json::Map::new();
        for (key, change) in object {
            if let Some(new_value) = change.get("newValue") {
                new_values.insert(key.clone(), new_value.clone());
            }
        }

        Self::from_json(&Value::Object(new_values))
    }
}

fn decode_into<T: serde::de::DeserializeOwned>(raw: &Value, slot: &mut Option<T>) -> bool {
    match T::deserialize(raw) {
        Ok(value) => {
            *slot = Some(value);
            true
        }
        Err(_) => false,
    }
}

// =============================================================================
// Mirror
// =============================================================================

/// The core's read-only view of the settings store.
///
/// Holds the last-known-good snapshot. Store failures never clear it; before
/// the first successful read it holds the built-in defaults.
#[derive(Debug, Default)]
pub struct SettingsMirror {
    current: Rc<Settings>,
    loaded: bool,
}

impl SettingsMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(settings: Settings) -> Self {
        Self {
            current: Rc::new(settings.sanitized()),
            loaded: true,
        }
    }

    /// Current snapshot. Cheap to clone; never changes under the caller.
    pub fn snapshot(&self) -> Rc<Settings> {
        Rc::clone(&self.current)
    }

    /// Whether a read has ever succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Apply the result of an initial read. Returns true if the snapshot changed.
    pub fn on_read(&mut self, result: Result<SettingsPatch, StoreError>) -> bool {
        match result {
            Ok(patch) => {
                self.loaded = true;
                self.replace(&patch)
            }
            Err(e) => {
                log::warn!("settings read failed, keeping last-known-good snapshot: {}", e);
                false
            }
        }
    }

    /// Apply a change notification. Returns true if the snapshot changed.
    pub fn on_change(&mut self, patch: &SettingsPatch) -> bool {
        self.replace(patch)
    }

    fn replace(&mut self, patch: &SettingsPatch) -> bool {
        let next = self.current.apply(patch);
        if next == *self.current {
            return false;
        }
        self.current = Rc::new(next);
        true
    }
}
