//! Page Scanner
//!
//! One pass over the live document: find candidate items of every known
//! variant, skip the ones already carrying the processed marker, extract
//! titles for the rest, mark them, and hide those the filter rejects.
//!
//! The marker is set once per element and never cleared, so a pass costs
//! O(new items). A kept item is not reconsidered when keywords change later;
//! only elements that appear after the change see the new keywords.

use crate::dom::{DocumentRoot, DomError, ItemNode};
use crate::filter::CompiledFilter;
use crate::settings::Settings;
use crate::types::{Decision, HideReason};
use crate::variants::{Variant, VARIANTS};

/// Counters for one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Elements returned by the variant queries
    pub candidates: usize,
    /// Already processed on an earlier pass
    pub skipped: usize,
    /// Titles extracted and evaluated this pass
    pub evaluated: usize,
    pub blacklisted: usize,
    pub distractions: usize,
    /// Nodes that left the document mid-pass
    pub detached: usize,
    /// Per-item or per-variant failures that were logged and skipped
    pub errors: usize,
}

impl ScanReport {
    pub fn hidden(&self) -> usize {
        self.blacklisted.saturating_add(self.distractions)
    }

    /// Accumulate another report. Totals kept for the life of a page
    /// saturate instead of wrapping.
    pub fn merge(&mut self, other: &ScanReport) {
        self.candidates = self.candidates.saturating_add(other.candidates);
        self.skipped = self.skipped.saturating_add(other.skipped);
        self.evaluated = self.evaluated.saturating_add(other.evaluated);
        self.blacklisted = self.blacklisted.saturating_add(other.blacklisted);
        self.distractions = self.distractions.saturating_add(other.distractions);
        self.detached = self.detached.saturating_add(other.detached);
        self.errors = self.errors.saturating_add(other.errors);
    }
}

enum Outcome {
    Skipped,
    Kept,
    Hidden(HideReason),
}

/// Scans a document for items of a fixed variant catalog.
pub struct Scanner {
    variants: &'static [Variant],
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self { variants: VARIANTS }
    }

    pub fn with_variants(variants: &'static [Variant]) -> Self {
        Self { variants }
    }

    /// Run one pass using the given settings snapshot.
    pub fn scan<D: DocumentRoot>(&self, root: &D, settings: &Settings) -> ScanReport {
        self.scan_with(root, &CompiledFilter::from_settings(settings))
    }

    /// Run one pass with an already compiled filter.
    pub fn scan_with<D: DocumentRoot>(&self, root: &D, filter: &CompiledFilter) -> ScanReport {
        let mut report = ScanReport::default();

        for variant in self.variants {
            let nodes = match root.query_all(variant.selector) {
                Ok(nodes) => nodes,
                Err(e) => {
                    log::warn!("query for {} items failed: {}", variant.kind.as_str(), e);
                    report.errors += 1;
                    continue;
                }
            };

            report.candidates += nodes.len();

            for node in &nodes {
                match process_item(variant, node, filter) {
                    Ok(Outcome::Skipped) => report.skipped += 1,
                    Ok(Outcome::Kept) => report.evaluated += 1,
                    Ok(Outcome::Hidden(reason)) => {
                        report.evaluated += 1;
                        match reason {
                            HideReason::Blacklisted => report.blacklisted += 1,
                            HideReason::Distraction => report.distractions += 1,
                        }
                    }
                    Err(DomError::Detached) => report.detached += 1,
                    Err(e) => {
                        log::warn!("skipping {} item: {}", variant.kind.as_str(), e);
                        report.errors += 1;
                    }
                }
            }
        }

        if report.hidden() > 0 || report.errors > 0 {
            log::debug!(
                "scan pass: {} candidates, {} new, {} hidden, {} errors",
                report.candidates,
                report.evaluated,
                report.hidden(),
                report.errors
            );
        }

        report
    }
}

fn process_item<N: ItemNode>(
    variant: &Variant,
    node: &N,
    filter: &CompiledFilter,
) -> Result<Outcome, DomError> {
    if !node.is_connected() {
        return Err(DomError::Detached);
    }
    if node.is_processed() {
        return Ok(Outcome::Skipped);
    }

    let title = variant.extract_title(node)?;

    // Marking failed means a later pass would evaluate the item again.
    node.mark_processed()?;

    match filter.decide(&title) {
        Decision::Keep => Ok(Outcome::Kept),
        Decision::Hide { reason, keyword } => {
            log::debug!(
                "hiding {:?} ({} keyword {:?})",
                title,
                reason.as_str(),
                keyword
            );
            node.hide()?;
            Ok(Outcome::Hidden(reason))
        }
    }
}
