//! Focus Mode Core Library
//!
//! This crate decides which video entries on a continuously mutating page
//! should be hidden, based on keyword lists and a focus-mode flag. It has no
//! browser dependency: the document is reached through the traits in `dom`,
//! and the settings backend through the `SettingsStore` trait.
//!
//! # Architecture
//!
//! Settings changes flow into the change detector's mirror and replace its
//! immutable snapshot. Page mutations, a polling tick and location changes
//! raise a shared rescan signal; a drain runs one scanner pass, which asks
//! the filter engine about every newly seen item and hides the rejected ones.
//!
//! # Modules
//!
//! - `filter`: Pure keep/hide decision for a title
//! - `variants`: Catalog of item shapes and their title lookup paths
//! - `scanner`: One marking-and-hiding pass over the document
//! - `detector`: Trigger coalescing and the Idle/Active/TornDown lifecycle
//! - `settings`: Settings snapshot, patches, sanitization and the mirror
//! - `store`: Settings store interface and in-memory implementation
//! - `sites`: Host extraction and the site allow-list gate
//! - `dom`: Document abstraction and in-memory document
//! - `types`: Shared type definitions

pub mod detector;
pub mod dom;
pub mod filter;
pub mod scanner;
pub mod settings;
pub mod sites;
pub mod store;
pub mod types;
pub mod variants;

// Re-export commonly used types
pub use detector::{ChangeDetector, DetectorConfig, DetectorError, DetectorStats, RescanSignal};
pub use dom::{DocumentRoot, DomError, ItemNode, PROCESSED_ATTR};
pub use filter::{decide, CompiledFilter};
pub use scanner::{ScanReport, Scanner};
pub use settings::{Settings, SettingsError, SettingsKey, SettingsMirror, SettingsPatch, DEFAULT_SITE};
pub use sites::{extract_host, is_site_allowed};
pub use store::{MemoryStore, SettingsStore, StoreError};
pub use types::{Decision, DetectorState, HideReason, Trigger};
pub use variants::{Variant, VariantKind, VARIANTS};
