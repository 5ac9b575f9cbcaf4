//! `web-sys` implementation of the document traits.
//!
//! Every access checks that the element is still connected: the host page
//! removes nodes at any time and a detached node is skipped, not an error.

use fm_core::dom::{DocumentRoot, DomError, ItemNode, PROCESSED_ATTR};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlElement};

fn host_error(e: JsValue) -> DomError {
    DomError::Host(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

pub struct WebDocument {
    document: Document,
}

impl WebDocument {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl DocumentRoot for WebDocument {
    type Node = WebItem;

    fn query_all(&self, selector: &str) -> Result<Vec<WebItem>, DomError> {
        let list = self
            .document
            .query_selector_all(selector)
            .map_err(|_| DomError::InvalidSelector(selector.to_string()))?;

        let mut items = Vec::with_capacity(list.length() as usize);
        for i in 0..list.length() {
            if let Some(element) = list.item(i).and_then(|node| node.dyn_into::<Element>().ok()) {
                items.push(WebItem(element));
            }
        }
        Ok(items)
    }
}

pub struct WebItem(pub Element);

impl WebItem {
    fn ensure_attached(&self) -> Result<(), DomError> {
        if !self.0.is_connected() {
            return Err(DomError::Detached);
        }
        Ok(())
    }
}

impl ItemNode for WebItem {
    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    fn is_processed(&self) -> bool {
        self.0.has_attribute(PROCESSED_ATTR)
    }

    fn mark_processed(&self) -> Result<(), DomError> {
        self.ensure_attached()?;
        self.0.set_attribute(PROCESSED_ATTR, "").map_err(host_error)
    }

    fn text_at(&self, selector: &str) -> Result<Option<String>, DomError> {
        self.ensure_attached()?;
        let found = self
            .0
            .query_selector(selector)
            .map_err(|_| DomError::InvalidSelector(selector.to_string()))?;
        Ok(found.and_then(|el| el.text_content()))
    }

    fn hide(&self) -> Result<(), DomError> {
        self.ensure_attached()?;
        let element = self
            .0
            .dyn_ref::<HtmlElement>()
            .ok_or_else(|| DomError::Host("item is not an HTML element".to_string()))?;
        element
            .style()
            .set_property("display", "none")
            .map_err(host_error)
    }
}
