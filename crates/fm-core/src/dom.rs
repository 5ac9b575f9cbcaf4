//! Document abstraction
//!
//! The scanner only needs a handful of operations on the live document:
//! query by selector, read text below an item, toggle visibility and keep a
//! private marker attribute. The browser implementation lives in the wasm
//! crate; [`memory`] provides an in-process document for tests and benches.

/// Private marker attribute written on every item the scanner has evaluated.
pub const PROCESSED_ATTR: &str = "data-focus-mode-processed";

/// Error type for document access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// The node was removed from the document after it was queried
    #[error("Node is no longer attached to the document")]
    Detached,
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    /// An exception thrown by the host environment
    #[error("Document access failed: {0}")]
    Host(String),
}

/// One candidate item element.
pub trait ItemNode {
    fn is_connected(&self) -> bool;

    /// Whether the processed marker is already set.
    fn is_processed(&self) -> bool;

    fn mark_processed(&self) -> Result<(), DomError>;

    /// Text content of the first descendant matching `selector`.
    fn text_at(&self, selector: &str) -> Result<Option<String>, DomError>;

    /// Hide the element. Hiding an already hidden element is a no-op.
    fn hide(&self) -> Result<(), DomError>;
}

/// Root of a live document.
pub trait DocumentRoot {
    type Node: ItemNode;

    fn query_all(&self, selector: &str) -> Result<Vec<Self::Node>, DomError>;
}

pub mod memory {
    //! In-memory document.
    //!
    //! Items are matched by tag name only and title lookups are keyed by the
    //! exact selector string. Counters record how often the scanner touched
    //! each item.

    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::{DocumentRoot, DomError, ItemNode};

    #[derive(Default)]
    struct ItemState {
        tag: String,
        texts: RefCell<HashMap<String, String>>,
        processed: Cell<bool>,
        hidden: Cell<bool>,
        detached: Cell<bool>,
        broken_lookups: Cell<bool>,
        broken_marker: Cell<bool>,
        lookups: Cell<usize>,
        hide_calls: Cell<usize>,
    }

    /// Shared handle to an in-memory item.
    #[derive(Clone)]
    pub struct MemoryItem(Rc<ItemState>);

    impl MemoryItem {
        pub fn new(tag: &str) -> Self {
            Self(Rc::new(ItemState {
                tag: tag.to_ascii_lowercase(),
                ..Default::default()
            }))
        }

        pub fn with_text(self, selector: &str, text: &str) -> Self {
            self.0
                .texts
                .borrow_mut()
                .insert(selector.to_string(), text.to_string());
            self
        }

        /// Every title lookup fails with a host error.
        pub fn with_broken_lookups(self) -> Self {
            self.0.broken_lookups.set(true);
            self
        }

        /// Writing the processed marker fails with a host error.
        pub fn with_broken_marker(self) -> Self {
            self.0.broken_marker.set(true);
            self
        }

        pub fn tag(&self) -> &str {
            &self.0.tag
        }

        pub fn is_hidden(&self) -> bool {
            self.0.hidden.get()
        }

        /// Number of title lookups performed on this item.
        pub fn lookups(&self) -> usize {
            self.0.lookups.get()
        }

        pub fn hide_calls(&self) -> usize {
            self.0.hide_calls.get()
        }

        /// Remove the item from its document.
        pub fn detach(&self) {
            self.0.detached.set(true);
        }

        fn ensure_attached(&self) -> Result<(), DomError> {
            if self.0.detached.get() {
                return Err(DomError::Detached);
            }
            Ok(())
        }
    }

    impl ItemNode for MemoryItem {
        fn is_connected(&self) -> bool {
            !self.0.detached.get()
        }

        fn is_processed(&self) -> bool {
            self.0.processed.get()
        }

        fn mark_processed(&self) -> Result<(), DomError> {
            self.ensure_attached()?;
            if self.0.broken_marker.get() {
                return Err(DomError::Host("setAttribute denied".to_string()));
            }
            self.0.processed.set(true);
            Ok(())
        }

        fn text_at(&self, selector: &str) -> Result<Option<String>, DomError> {
            self.ensure_attached()?;
            self.0.lookups.set(self.0.lookups.get() + 1);
            if self.0.broken_lookups.get() {
                return Err(DomError::Host(format!("querySelector({selector}) threw")));
            }
            Ok(self.0.texts.borrow().get(selector).cloned())
        }

        fn hide(&self) -> Result<(), DomError> {
            self.ensure_attached()?;
            self.0.hide_calls.set(self.0.hide_calls.get() + 1);
            self.0.hidden.set(true);
            Ok(())
        }
    }

    /// In-memory document root.
    #[derive(Default)]
    pub struct MemoryDocument {
        items: RefCell<Vec<MemoryItem>>,
        broken_selectors: RefCell<Vec<String>>,
        queries: Cell<usize>,
    }

    impl MemoryDocument {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, item: MemoryItem) -> MemoryItem {
            self.items.borrow_mut().push(item.clone());
            item
        }

        /// Make queries for `selector` fail.
        pub fn break_selector(&self, selector: &str) {
            self.broken_selectors.borrow_mut().push(selector.to_string());
        }

        pub fn query_count(&self) -> usize {
            self.queries.get()
        }

        pub fn hidden_count(&self) -> usize {
            self.items.borrow().iter().filter(|i| i.is_hidden()).count()
        }
    }

    impl DocumentRoot for MemoryDocument {
        type Node = MemoryItem;

        fn query_all(&self, selector: &str) -> Result<Vec<MemoryItem>, DomError> {
            self.queries.set(self.queries.get() + 1);
            if self.broken_selectors.borrow().iter().any(|s| s == selector) {
                return Err(DomError::InvalidSelector(selector.to_string()));
            }
            Ok(self
                .items
                .borrow()
                .iter()
                .filter(|item| item.is_connected() && item.tag() == selector)
                .cloned()
                .collect())
        }
    }
}
