//! Item variant catalog
//!
//! The host page renders a video entry in several structural shapes. Each
//! shape is one [`Variant`] entry: the selector that finds its container
//! and the ordered lookup paths for its title text. Supporting a new layout
//! means adding an entry here.

use crate::dom::{DomError, ItemNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    /// Home feed grid entry
    RichItem,
    /// Search result row
    VideoResult,
    /// Watch page sidebar suggestion
    CompactVideo,
    /// Channel page grid entry
    GridVideo,
    /// Short-form shelf entry
    ReelItem,
    /// Newer short-form lockup
    ShortsLockup,
}

impl VariantKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RichItem => "rich-item",
            Self::VideoResult => "video-result",
            Self::CompactVideo => "compact-video",
            Self::GridVideo => "grid-video",
            Self::ReelItem => "reel-item",
            Self::ShortsLockup => "shorts-lockup",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Variant {
    pub kind: VariantKind,
    /// Container selector (a bare tag name for every current variant)
    pub selector: &'static str,
    /// Title lookup paths, tried in order
    pub title_selectors: &'static [&'static str],
}

pub const VARIANTS: &[Variant] = &[
    Variant {
        kind: VariantKind::RichItem,
        selector: "ytd-rich-item-renderer",
        title_selectors: &["#video-title", "#video-title-link", "h3 a"],
    },
    Variant {
        kind: VariantKind::VideoResult,
        selector: "ytd-video-renderer",
        title_selectors: &["#video-title", "h3 a"],
    },
    Variant {
        kind: VariantKind::CompactVideo,
        selector: "ytd-compact-video-renderer",
        title_selectors: &["#video-title", "h3 span"],
    },
    Variant {
        kind: VariantKind::GridVideo,
        selector: "ytd-grid-video-renderer",
        title_selectors: &["#video-title", "h3 a"],
    },
    Variant {
        kind: VariantKind::ReelItem,
        selector: "ytd-reel-item-renderer",
        title_selectors: &["#video-title", "h3 span"],
    },
    Variant {
        kind: VariantKind::ShortsLockup,
        selector: "ytm-shorts-lockup-view-model",
        title_selectors: &["h3 span", "h3 a", "h3"],
    },
];

/// Custom-element prefixes the host page uses for anything that can hold items.
const CONTAINER_PREFIXES: &[&str] = &["ytd-", "ytm-", "yt-"];

impl Variant {
    pub fn by_kind(kind: VariantKind) -> &'static Variant {
        VARIANTS
            .iter()
            .find(|v| v.kind == kind)
            .unwrap_or(&VARIANTS[0])
    }

    /// Extract the title text of an item of this variant.
    ///
    /// Tries each lookup path in order and returns the first non-blank text,
    /// trimmed. No match yields an empty title; a failing lookup path is
    /// skipped so a later path can still match.
    pub fn extract_title<N: ItemNode>(&self, node: &N) -> Result<String, DomError> {
        let mut last_error = None;

        for selector in self.title_selectors {
            match node.text_at(selector) {
                Ok(Some(text)) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Ok(text.to_string());
                    }
                }
                Ok(None) => {}
                Err(DomError::Detached) => return Err(DomError::Detached),
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => {
                log::warn!("title lookup failed for {} item: {}", self.kind.as_str(), e);
                Ok(String::new())
            }
            None => Ok(String::new()),
        }
    }
}

/// Cheap check on an added node's tag before asking for a full scan.
///
/// Matches any variant container and any host-page custom element that may
/// wrap one. Plain markup (`div`, `span`, `script`, text) never passes.
pub fn mutation_may_contain_item(tag: &str) -> bool {
    let tag = tag.trim();
    if tag.is_empty() {
        return false;
    }
    let tag = tag.to_ascii_lowercase();

    VARIANTS.iter().any(|v| v.selector == tag)
        || CONTAINER_PREFIXES.iter().any(|prefix| tag.starts_with(prefix))
}
