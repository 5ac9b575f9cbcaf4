//! Browser tests. Run with `wasm-pack test --headless --chrome crates/fm-wasm`.

#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use fm_core::detector::DetectorConfig;
use fm_core::dom::PROCESSED_ATTR;
use fm_core::scanner::Scanner;
use fm_core::settings::{Settings, SettingsPatch};
use fm_core::store::{MemoryStore, SettingsStore, StoreError};
use fm_wasm::content;
use fm_wasm::dom::WebDocument;
use fm_wasm::storage::ChromeStorage;
use js_sys::{Array, Function, Object, Promise, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;
use web_sys::{Document, HtmlElement};

wasm_bindgen_test_configure!(run_in_browser);

fn document() -> Document {
    web_sys::window().unwrap().document().unwrap()
}

fn add_video(doc: &Document, title: &str) -> HtmlElement {
    let item = doc.create_element("ytd-rich-item-renderer").unwrap();
    item.set_inner_html(&format!(r#"<a id="video-title">{}</a>"#, title));
    doc.body().unwrap().append_child(&item).unwrap();
    item.dyn_into::<HtmlElement>().unwrap()
}

fn is_hidden(item: &HtmlElement) -> bool {
    item.style().get_property_value("display").unwrap() == "none"
}

fn clear_body(doc: &Document) {
    doc.body().unwrap().set_inner_html("");
}

fn strings(values: &[&str]) -> JsValue {
    values.iter().map(|v| JsValue::from_str(v)).collect::<Array>().into()
}

async fn sleep(ms: i32) {
    let promise = Promise::new(&mut |resolve, _| {
        web_sys::window()
            .unwrap()
            .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms)
            .unwrap();
    });
    JsFuture::from(promise).await.unwrap();
}

/// Settings that admit the test server and hide "spam".
fn local_store() -> Box<dyn SettingsStore> {
    Box::new(MemoryStore::with_values(SettingsPatch {
        allowed_sites: Some(vec!["127.0.0.1".to_string(), "localhost".to_string()]),
        blacklist: Some(vec!["spam".to_string()]),
        ..Default::default()
    }))
}

/// Polling effectively off, so only mutations and navigation trigger passes.
fn quiet_config() -> DetectorConfig {
    DetectorConfig {
        poll_interval_ms: 60_000,
        location_check_ms: 50,
        settle_delay_ms: 600,
    }
}

fn stat(name: &str) -> f64 {
    Reflect::get(&fm_wasm::detector_stats(), &name.into()).unwrap().as_f64().unwrap()
}

fn push_url(url: &str) {
    let history = web_sys::window().unwrap().history().unwrap();
    history.push_state_with_url(&JsValue::NULL, "", Some(url)).unwrap();
}

#[wasm_bindgen_test]
fn test_scan_hides_blacklisted_items_in_page() {
    let doc = document();
    clear_body(&doc);
    let spam = add_video(&doc, "Cheap SPAM Deals");
    let tutorial = add_video(&doc, "Rust tutorial");

    let settings = Settings {
        blacklist: vec!["spam".to_string()],
        ..Settings::default()
    };
    let report = Scanner::new().scan(&WebDocument::new(doc.clone()), &settings);

    assert_eq!(report.evaluated, 2);
    assert_eq!(report.blacklisted, 1);
    assert!(is_hidden(&spam));
    assert!(!is_hidden(&tutorial));
    assert!(spam.has_attribute(PROCESSED_ATTR));
    assert!(tutorial.has_attribute(PROCESSED_ATTR));
}

#[wasm_bindgen_test]
fn test_second_scan_skips_processed_items() {
    let doc = document();
    clear_body(&doc);
    add_video(&doc, "Cooking show");

    let root = WebDocument::new(doc.clone());
    let settings = Settings {
        mode: true,
        focus_keywords: vec!["cooking".to_string()],
        ..Settings::default()
    };
    let scanner = Scanner::new();
    let first = scanner.scan(&root, &settings);
    let second = scanner.scan(&root, &settings);

    assert_eq!(first.distractions, 1);
    assert_eq!(second.evaluated, 0);
    assert_eq!(second.skipped, 1);
}

#[wasm_bindgen_test]
fn test_should_hide_reports_reason_and_keyword() {
    let result = fm_wasm::should_hide("Cheap spam", strings(&["spam"]), strings(&[]), false).unwrap();
    let decision = Reflect::get(&result, &"decision".into()).unwrap();
    let keyword = Reflect::get(&result, &"keyword".into()).unwrap();
    assert_eq!(decision.as_f64(), Some(1.0));
    assert_eq!(keyword.as_string().as_deref(), Some("spam"));

    let kept = fm_wasm::should_hide("Rust tutorial", strings(&[]), strings(&["memes"]), true).unwrap();
    let decision = Reflect::get(&kept, &"decision".into()).unwrap();
    assert_eq!(decision.as_f64(), Some(0.0));
}

#[wasm_bindgen_test]
fn test_should_hide_rejects_non_string_keywords() {
    let bad: JsValue = [JsValue::from(3)].iter().collect::<Array>().into();
    assert!(fm_wasm::should_hide("x", bad, JsValue::UNDEFINED, false).is_err());
}

#[wasm_bindgen_test]
fn test_attach_stays_idle_off_allowed_sites() {
    // The test page is served from localhost, which is not on the default
    // allow-list, and chrome.storage is absent so defaults apply.
    fm_wasm::attach(JsValue::UNDEFINED).unwrap();
    assert_eq!(fm_wasm::detector_state(), 0);
    assert!(fm_wasm::attach(JsValue::UNDEFINED).is_err());

    assert!(fm_wasm::detach());
    assert!(!fm_wasm::detach());
}

#[wasm_bindgen_test]
fn test_invalid_config_is_rejected() {
    let config = js_sys::Object::new();
    Reflect::set(&config, &"pollIntervalMs".into(), &"soon".into()).unwrap();
    assert!(fm_wasm::attach(config.into()).is_err());
}

#[wasm_bindgen_test]
fn test_zero_poll_interval_is_rejected() {
    let config = js_sys::Object::new();
    Reflect::set(&config, &"pollIntervalMs".into(), &JsValue::from(0)).unwrap();
    assert!(fm_wasm::attach(config.into()).is_err());
    assert!(!fm_wasm::detach());
}

#[wasm_bindgen_test]
async fn test_appended_item_is_hidden_without_manual_scan() {
    let doc = document();
    clear_body(&doc);
    content::attach_with_store(quiet_config(), local_store()).unwrap();
    assert_eq!(fm_wasm::detector_state(), 1);
    sleep(50).await;

    let spam = add_video(&doc, "Cheap spam deal");
    let kept = add_video(&doc, "Rust tutorial");
    sleep(100).await;

    assert!(is_hidden(&spam));
    assert!(spam.has_attribute(PROCESSED_ATTR));
    assert!(!is_hidden(&kept));
    assert!(kept.has_attribute(PROCESSED_ATTR));

    assert!(fm_wasm::detach());
}

#[wasm_bindgen_test]
async fn test_second_navigation_postpones_settled_scan() {
    let doc = document();
    clear_body(&doc);
    let start = web_sys::window().unwrap().location().href().unwrap();
    content::attach_with_store(quiet_config(), local_store()).unwrap();
    sleep(100).await;
    let passes = stat("passes");

    push_url("?first");
    sleep(300).await;
    push_url("?second");
    // Past the first settle deadline but inside the restarted one.
    sleep(500).await;
    assert_eq!(stat("navigations"), 2.0);
    assert_eq!(stat("passes"), passes);

    sleep(500).await;
    assert_eq!(stat("passes"), passes + 1.0);

    push_url(&start);
    assert!(fm_wasm::detach());
}

#[wasm_bindgen_test]
async fn test_detached_script_leaves_new_items_alone() {
    let doc = document();
    clear_body(&doc);
    content::attach_with_store(quiet_config(), local_store()).unwrap();
    sleep(50).await;
    assert!(fm_wasm::detach());

    let spam = add_video(&doc, "Cheap spam deal");
    sleep(150).await;

    assert!(!spam.has_attribute(PROCESSED_ATTR));
    assert!(!is_hidden(&spam));
    assert_eq!(fm_wasm::detector_state(), 0);
}

#[wasm_bindgen_test]
fn test_storage_write_reports_throwing_set() {
    let global = js_sys::global();
    let sync = Object::new();
    Reflect::set(&sync, &"set".into(), &Function::new_no_args("throw new Error('quota')")).unwrap();
    let storage = Object::new();
    Reflect::set(&storage, &"sync".into(), &sync).unwrap();
    let chrome = Object::new();
    Reflect::set(&chrome, &"storage".into(), &storage).unwrap();
    Reflect::set(&chrome, &"runtime".into(), &Object::new()).unwrap();
    Reflect::set(&global, &"chrome".into(), &chrome).unwrap();

    let outcome = Rc::new(RefCell::new(None));
    let out = Rc::clone(&outcome);
    let patch = SettingsPatch {
        mode: Some(true),
        ..Default::default()
    };
    ChromeStorage::new().write(&patch, Box::new(move |result| *out.borrow_mut() = Some(result)));

    Reflect::delete_property(&global, &"chrome".into()).unwrap();
    assert!(matches!(outcome.borrow_mut().take(), Some(Err(StoreError::Rejected(_)))));
}
