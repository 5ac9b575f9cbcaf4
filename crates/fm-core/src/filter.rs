//! Keyword Filter Engine
//!
//! Pure keep/hide decision for a single title. Blacklist keywords always
//! apply and are checked first; focus keywords apply only in focus mode.
//! Matching is case-insensitive literal substring search.
//!
//! Keyword lists are expected to be sanitized already (no empty entries):
//! an empty keyword would match every title.

use crate::settings::Settings;
use crate::types::{Decision, HideReason};

// =============================================================================
// Free-standing decision
// =============================================================================

/// Decide whether a title should be hidden.
///
/// Lowercases the title once; keywords are lowercased per comparison.
/// Use [`CompiledFilter`] when the same lists are applied to many titles.
pub fn decide<'k, S: AsRef<str>>(
    title: &str,
    blacklist: &'k [S],
    focus_keywords: &'k [S],
    mode: bool,
) -> Decision<'k> {
    let title = title.to_lowercase();

    if let Some(keyword) = first_match(&title, blacklist) {
        return Decision::Hide {
            reason: HideReason::Blacklisted,
            keyword,
        };
    }

    if !mode {
        return Decision::Keep;
    }

    match first_match(&title, focus_keywords) {
        Some(keyword) => Decision::Hide {
            reason: HideReason::Distraction,
            keyword,
        },
        None => Decision::Keep,
    }
}

fn first_match<'k, S: AsRef<str>>(lower_title: &str, keywords: &'k [S]) -> Option<&'k str> {
    keywords
        .iter()
        .map(AsRef::as_ref)
        .find(|keyword| lower_title.contains(&keyword.to_lowercase()))
}

// =============================================================================
// Compiled filter
// =============================================================================

struct Keyword {
    original: String,
    lower: String,
}

/// Keyword lists with their lowercase forms computed up front.
///
/// Built once per settings snapshot and reused for every item of a pass.
/// Produces exactly the same decisions as [`decide`].
pub struct CompiledFilter {
    blacklist: Vec<Keyword>,
    focus_keywords: Vec<Keyword>,
    mode: bool,
}

impl CompiledFilter {
    pub fn new<S: AsRef<str>>(blacklist: &[S], focus_keywords: &[S], mode: bool) -> Self {
        Self {
            blacklist: compile(blacklist),
            focus_keywords: compile(focus_keywords),
            mode,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.blacklist, &settings.focus_keywords, settings.mode)
    }

    pub fn is_empty(&self) -> bool {
        self.blacklist.is_empty() && (!self.mode || self.focus_keywords.is_empty())
    }

    pub fn decide(&self, title: &str) -> Decision<'_> {
        let title = title.to_lowercase();

        if let Some(keyword) = compiled_match(&title, &self.blacklist) {
            return Decision::Hide {
                reason: HideReason::Blacklisted,
                keyword,
            };
        }

        if !self.mode {
            return Decision::Keep;
        }

        match compiled_match(&title, &self.focus_keywords) {
            Some(keyword) => Decision::Hide {
                reason: HideReason::Distraction,
                keyword,
            },
            None => Decision::Keep,
        }
    }
}

fn compile<S: AsRef<str>>(keywords: &[S]) -> Vec<Keyword> {
    keywords
        .iter()
        .map(|k| Keyword {
            original: k.as_ref().to_string(),
            lower: k.as_ref().to_lowercase(),
        })
        .collect()
}

#[inline]
fn compiled_match<'k>(lower_title: &str, keywords: &'k [Keyword]) -> Option<&'k str> {
    keywords
        .iter()
        .find(|k| lower_title.contains(k.lower.as_str()))
        .map(|k| k.original.as_str())
}
