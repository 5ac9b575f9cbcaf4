//! Saved pages as a [`DocumentRoot`].
//!
//! The parsed tree is immutable, so the processed marker and hidden state
//! live in side tables keyed by node id. A marker attribute already present
//! in the saved HTML counts as processed.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use ego_tree::NodeId;
use fm_core::dom::{DocumentRoot, DomError, ItemNode, PROCESSED_ATTR};
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};

struct Page {
    html: Html,
    processed: RefCell<HashSet<NodeId>>,
    hidden: RefCell<Vec<NodeId>>,
}

#[derive(Clone)]
pub struct HtmlDocument {
    page: Rc<Page>,
}

impl HtmlDocument {
    pub fn parse(text: &str) -> Self {
        Self {
            page: Rc::new(Page {
                html: Html::parse_document(text),
                processed: RefCell::new(HashSet::new()),
                hidden: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Items hidden so far, in the order they were hidden.
    pub fn hidden_items(&self) -> Vec<HtmlItem> {
        self.page
            .hidden
            .borrow()
            .iter()
            .map(|&id| HtmlItem {
                page: Rc::clone(&self.page),
                id,
            })
            .collect()
    }
}

fn parse_selector(selector: &str) -> Result<Selector, DomError> {
    Selector::parse(selector).map_err(|_| DomError::InvalidSelector(selector.to_string()))
}

impl DocumentRoot for HtmlDocument {
    type Node = HtmlItem;

    fn query_all(&self, selector: &str) -> Result<Vec<HtmlItem>, DomError> {
        let selector = parse_selector(selector)?;
        Ok(self
            .page
            .html
            .select(&selector)
            .map(|element| HtmlItem {
                page: Rc::clone(&self.page),
                id: element.id(),
            })
            .collect())
    }
}

pub struct HtmlItem {
    page: Rc<Page>,
    id: NodeId,
}

impl HtmlItem {
    fn element(&self) -> Result<ElementRef<'_>, DomError> {
        self.page
            .html
            .tree
            .get(self.id)
            .and_then(ElementRef::wrap)
            .ok_or(DomError::Detached)
    }

    fn value(&self) -> Result<&Element, DomError> {
        self.element().map(|el| el.value())
    }

    pub fn tag(&self) -> String {
        self.value().map(|el| el.name().to_string()).unwrap_or_default()
    }
}

impl ItemNode for HtmlItem {
    fn is_connected(&self) -> bool {
        self.element().is_ok()
    }

    fn is_processed(&self) -> bool {
        self.page.processed.borrow().contains(&self.id)
            || self.value().map(|el| el.attr(PROCESSED_ATTR).is_some()).unwrap_or(false)
    }

    fn mark_processed(&self) -> Result<(), DomError> {
        self.element()?;
        self.page.processed.borrow_mut().insert(self.id);
        Ok(())
    }

    fn text_at(&self, selector: &str) -> Result<Option<String>, DomError> {
        let element = self.element()?;
        let selector = parse_selector(selector)?;
        Ok(element
            .select(&selector)
            .next()
            .map(|found| found.text().collect::<String>()))
    }

    fn hide(&self) -> Result<(), DomError> {
        self.element()?;
        let mut hidden = self.page.hidden.borrow_mut();
        if !hidden.contains(&self.id) {
            hidden.push(self.id);
        }
        Ok(())
    }
}
