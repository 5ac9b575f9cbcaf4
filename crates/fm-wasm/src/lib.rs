//! WebAssembly bindings for Focus Mode
//!
//! The extension's content script loads this module on every page and calls
//! [`attach`]. Everything else is exposed for the popup and for debugging
//! from the page console.

pub mod content;
pub mod dom;
pub mod storage;

use fm_core::detector::DetectorConfig;
use fm_core::filter::decide;
use fm_core::types::Decision;
use js_sys::{Array, Object, Reflect, JSON};
use log::LevelFilter;
use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    // The logger passes everything; `log::max_level` is the runtime filter.
    wasm_logger::init(wasm_logger::Config::new(log::Level::Trace));
    log::set_max_level(LevelFilter::Info);
}

fn set(target: &Object, key: &str, value: &JsValue) {
    let _ = Reflect::set(target, &JsValue::from_str(key), value);
}

fn string_list(value: &JsValue, what: &str) -> Result<Vec<String>, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(Vec::new());
    }
    if !Array::is_array(value) {
        return Err(JsValue::from_str(&format!("{} must be an array of strings", what)));
    }
    Array::from(value)
        .iter()
        .map(|item| {
            item.as_string()
                .ok_or_else(|| JsValue::from_str(&format!("{} must contain only strings", what)))
        })
        .collect()
}

fn parse_config(config: &JsValue) -> Result<DetectorConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(DetectorConfig::default());
    }
    let text: String = JSON::stringify(config)
        .map_err(|_| JsValue::from_str("Detector config is not serializable"))?
        .into();
    let config: DetectorConfig = serde_json::from_str(&text)
        .map_err(|e| JsValue::from_str(&format!("Invalid detector config: {}", e)))?;
    config
        .validate()
        .map_err(|e| JsValue::from_str(&format!("Invalid detector config: {}", e)))?;
    Ok(config)
}

/// Start focus mode on this page. `config` may override the timer settings
/// (`pollIntervalMs`, `locationCheckMs`, `settleDelayMs`).
#[wasm_bindgen]
pub fn attach(config: JsValue) -> Result<(), JsValue> {
    let config = parse_config(&config)?;
    content::attach(config)
}

/// Stop observing the page. Items already hidden stay hidden.
#[wasm_bindgen]
pub fn detach() -> bool {
    content::detach()
}

/// 0 = idle, 1 = active, 2 = torn down. Idle if never attached.
#[wasm_bindgen]
pub fn detector_state() -> u8 {
    content::with_instance(|script| script.state() as u8).unwrap_or(0)
}

#[wasm_bindgen]
pub fn detector_stats() -> JsValue {
    let result = Object::new();
    let stats = match content::with_instance(|script| script.stats()) {
        Some(stats) => stats,
        None => {
            set(&result, "attached", &JsValue::from(false));
            return result.into();
        }
    };

    set(&result, "attached", &JsValue::from(true));
    set(&result, "passes", &JsValue::from(stats.passes));
    set(&result, "coalesced", &JsValue::from(stats.coalesced));
    set(&result, "mutationsIgnored", &JsValue::from(stats.mutations_ignored));
    set(&result, "navigations", &JsValue::from(stats.navigations));
    set(&result, "settingsUpdates", &JsValue::from(stats.settings_updates));
    set(&result, "evaluated", &JsValue::from(stats.totals.evaluated as f64));
    set(&result, "hidden", &JsValue::from(stats.totals.hidden() as f64));
    set(&result, "errors", &JsValue::from(stats.totals.errors as f64));
    result.into()
}

/// Evaluate one title without touching the page.
///
/// Returns `{ decision: 0 | 1 | 2, reason?: string, keyword?: string }`.
#[wasm_bindgen]
pub fn should_hide(title: &str, blacklist: JsValue, focus_keywords: JsValue, mode: bool) -> Result<JsValue, JsValue> {
    let blacklist = string_list(&blacklist, "blacklist")?;
    let focus_keywords = string_list(&focus_keywords, "focusKeywords")?;

    let decision = decide(title, &blacklist, &focus_keywords, mode);
    let result = Object::new();
    set(&result, "decision", &JsValue::from(decision.code()));
    if let Decision::Hide { reason, keyword } = decision {
        set(&result, "reason", &JsValue::from_str(reason.as_str()));
        set(&result, "keyword", &JsValue::from_str(keyword));
    }
    Ok(result.into())
}

#[wasm_bindgen(js_name = isSiteAllowed)]
pub fn is_site_allowed(url: &str, sites: JsValue) -> Result<bool, JsValue> {
    let sites = string_list(&sites, "allowedSites")?;
    Ok(fm_core::sites::is_site_allowed(url, &sites))
}

/// Change the console log level (`off`, `error`, `warn`, `info`, `debug`,
/// `trace`).
#[wasm_bindgen]
pub fn set_log_level(level: &str) -> Result<(), JsValue> {
    let level: LevelFilter = level
        .trim()
        .parse()
        .map_err(|_| JsValue::from_str(&format!("Unknown log level: {}", level)))?;
    log::set_max_level(level);
    Ok(())
}
