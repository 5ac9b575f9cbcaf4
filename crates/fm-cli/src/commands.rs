use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use fm_core::detector::{ChangeDetector, DetectorConfig};
use fm_core::filter::CompiledFilter;
use fm_core::scanner::ScanReport;
use fm_core::settings::{KeywordList, Settings, SettingsKey, SettingsMirror};
use fm_core::store::{MemoryStore, SettingsStore};
use fm_core::types::{Decision, DetectorState, HideReason};
use fm_core::variants::{VariantKind, VARIANTS};

use crate::html::{HtmlDocument, HtmlItem};

pub const DEFAULT_PAGE_URL: &str = "https://www.youtube.com/";

/// Read a settings file. Missing keys take their defaults.
pub fn load_settings(path: &str) -> Result<Settings, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    let settings = Settings::from_json_str(&text).map_err(|e| format!("'{}': {}", path, e))?;
    log::debug!(
        "loaded {}: mode {}, {} blacklisted, {} focus keywords, {} sites",
        path,
        settings.mode,
        settings.blacklist.len(),
        settings.focus_keywords.len(),
        settings.allowed_sites.len()
    );
    Ok(settings)
}

pub fn load_settings_or_default(path: Option<&str>) -> Result<Settings, String> {
    match path {
        Some(path) => load_settings(path),
        None => Ok(Settings::default()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub title: String,
    pub hide: Option<(HideReason, String)>,
}

pub fn check_titles<S: AsRef<str>>(settings: &Settings, titles: &[S]) -> Vec<Verdict> {
    let filter = CompiledFilter::from_settings(settings);
    titles
        .iter()
        .map(|title| {
            let title = title.as_ref();
            let hide = match filter.decide(title) {
                Decision::Keep => None,
                Decision::Hide { reason, keyword } => Some((reason, keyword.to_string())),
            };
            Verdict {
                title: title.to_string(),
                hide,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenItem {
    pub kind: Option<VariantKind>,
    pub title: String,
    pub reason: Option<HideReason>,
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub state: DetectorState,
    pub passes: Vec<ScanReport>,
    pub hidden: Vec<HiddenItem>,
}

/// Run `passes` detector passes over a saved page as if it were loaded at
/// `url`. Settings go through an in-memory store the same way the content
/// script reads them from extension storage.
pub fn scan_page(html: &str, settings: &Settings, url: &str, passes: u32) -> Result<ScanOutcome, String> {
    let store = MemoryStore::with_values(settings.to_patch());
    let slot = Rc::new(RefCell::new(None));
    let out = Rc::clone(&slot);
    store.read(&SettingsKey::ALL, Box::new(move |result| *out.borrow_mut() = Some(result)));
    let read = slot
        .borrow_mut()
        .take()
        .ok_or_else(|| "Settings store did not answer".to_string())?;

    let mut detector = ChangeDetector::new(DetectorConfig::default(), SettingsMirror::new());
    detector.on_settings_read(read);
    let state = detector.attach(url);
    if state != DetectorState::Active {
        log::debug!("skipping scan of {}: detector is {}", url, state.as_str());
        return Ok(ScanOutcome {
            state,
            passes: Vec::new(),
            hidden: Vec::new(),
        });
    }

    let doc = HtmlDocument::parse(html);
    let mut reports = Vec::with_capacity(passes as usize);
    for pass in 0..passes {
        // The first pass drains the initial trigger raised by attach.
        if pass > 0 {
            detector.on_interval();
        }
        let report = detector.drain(&doc).map_err(|e| format!("Pass {} failed: {}", pass + 1, e))?;
        log::debug!(
            "pass {}: {} evaluated, {} hidden",
            pass + 1,
            report.evaluated,
            report.hidden()
        );
        reports.push(report);
    }

    let filter = CompiledFilter::from_settings(&detector.settings());
    let hidden = doc
        .hidden_items()
        .iter()
        .map(|item| describe(item, &filter))
        .collect();

    Ok(ScanOutcome {
        state: detector.state(),
        passes: reports,
        hidden,
    })
}

fn describe(item: &HtmlItem, filter: &CompiledFilter) -> HiddenItem {
    let tag = item.tag();
    let variant = VARIANTS.iter().find(|v| v.selector == tag);
    let title = variant
        .and_then(|v| v.extract_title(item).ok())
        .unwrap_or_default();
    let reason = match filter.decide(&title) {
        Decision::Hide { reason, .. } => Some(reason),
        Decision::Keep => None,
    };
    HiddenItem {
        kind: variant.map(|v| v.kind),
        title,
        reason,
    }
}

/// Edits for the `settings` command, applied in field order.
#[derive(Debug, Default)]
pub struct SettingsEdits {
    pub mode: Option<bool>,
    pub add_blacklist: Vec<String>,
    pub remove_blacklist: Vec<String>,
    pub add_focus: Vec<String>,
    pub remove_focus: Vec<String>,
    pub add_sites: Vec<String>,
    pub remove_sites: Vec<String>,
}

pub fn edit_settings(settings: &Settings, edits: &SettingsEdits) -> Result<Settings, String> {
    let mut next = settings.clone();
    if let Some(mode) = edits.mode {
        next.mode = mode;
    }
    for keyword in &edits.add_blacklist {
        next = next
            .with_keyword_added(KeywordList::Blacklist, keyword)
            .map_err(|e| e.to_string())?;
    }
    for keyword in &edits.remove_blacklist {
        next = next
            .with_keyword_removed(KeywordList::Blacklist, keyword)
            .map_err(|e| e.to_string())?;
    }
    for keyword in &edits.add_focus {
        next = next
            .with_keyword_added(KeywordList::Focus, keyword)
            .map_err(|e| e.to_string())?;
    }
    for keyword in &edits.remove_focus {
        next = next
            .with_keyword_removed(KeywordList::Focus, keyword)
            .map_err(|e| e.to_string())?;
    }
    for site in &edits.add_sites {
        next = next.with_site_added(site).map_err(|e| e.to_string())?;
    }
    for site in &edits.remove_sites {
        next = next.with_site_removed(site).map_err(|e| e.to_string())?;
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <ytd-rich-item-renderer><a id="video-title">Drama compilation</a></ytd-rich-item-renderer>
        <ytd-compact-video-renderer><h3><span>Rust borrow checker</span></h3></ytd-compact-video-renderer>
        <ytm-shorts-lockup-view-model><h3><a>funny cats</a></h3></ytm-shorts-lockup-view-model>
    </body></html>"#;

    #[test]
    fn test_check_titles_uses_defaults() {
        let verdicts = check_titles(&Settings::default(), &["Reaction video", "Rust tutorial"]);
        assert_eq!(verdicts[0].hide, Some((HideReason::Blacklisted, "reaction".to_string())));
        assert_eq!(verdicts[1].hide, None);
    }

    #[test]
    fn test_scan_page_runs_passes_and_describes_hidden_items() {
        let settings = Settings {
            mode: true,
            focus_keywords: vec!["rust".to_string()],
            ..Settings::default()
        };
        let outcome = scan_page(PAGE, &settings, DEFAULT_PAGE_URL, 2).unwrap();

        assert_eq!(outcome.state, DetectorState::Active);
        assert_eq!(outcome.passes.len(), 2);
        assert_eq!(outcome.passes[0].evaluated, 3);
        assert_eq!(outcome.passes[0].hidden(), 2);
        assert_eq!(outcome.passes[1].evaluated, 0);

        let drama = &outcome.hidden[0];
        assert_eq!(drama.kind, Some(VariantKind::RichItem));
        assert_eq!(drama.title, "Drama compilation");
        assert_eq!(drama.reason, Some(HideReason::Blacklisted));
        assert_eq!(outcome.hidden[1].reason, Some(HideReason::Distraction));
    }

    #[test]
    fn test_scan_page_off_allowed_sites_is_idle() {
        let outcome = scan_page(PAGE, &Settings::default(), "https://example.com/watch", 3).unwrap();
        assert_eq!(outcome.state, DetectorState::Idle);
        assert!(outcome.passes.is_empty());
        assert!(outcome.hidden.is_empty());
    }

    #[test]
    fn test_edit_settings() {
        let edits = SettingsEdits {
            mode: Some(true),
            add_blacklist: vec!["  Spoilers ".to_string()],
            remove_blacklist: vec!["DRAMA".to_string()],
            add_sites: vec!["Example.com".to_string()],
            ..Default::default()
        };
        let next = edit_settings(&Settings::default(), &edits).unwrap();
        assert!(next.mode);
        assert!(next.blacklist.contains(&"Spoilers".to_string()));
        assert!(!next.blacklist.contains(&"drama".to_string()));
        assert!(next.allowed_sites.contains(&"example.com".to_string()));
    }

    #[test]
    fn test_edit_settings_rejects_default_site_removal() {
        let edits = SettingsEdits {
            remove_sites: vec!["youtube.com".to_string()],
            ..Default::default()
        };
        assert!(edit_settings(&Settings::default(), &edits).is_err());
    }
}
