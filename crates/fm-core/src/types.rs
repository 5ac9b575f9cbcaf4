//! Core type definitions for Focus Mode
//!
//! These types are shared by the filter engine, the page scanner and the
//! change detector, and cross the wasm boundary as plain integers.

// =============================================================================
// Hide Reasons
// =============================================================================

/// Why an item was hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HideReason {
    /// Title matched an always-on blacklist keyword
    Blacklisted = 1,
    /// Title matched a focus keyword while focus mode was on
    Distraction = 2,
}

impl HideReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blacklisted => "blacklisted",
            Self::Distraction => "distraction",
        }
    }
}

impl TryFrom<u8> for HideReason {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Blacklisted),
            2 => Ok(Self::Distraction),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Decision
// =============================================================================

/// Outcome of evaluating one title.
///
/// The matched keyword borrows from the keyword list it came from, so the
/// hot path does not allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision<'a> {
    Keep,
    Hide {
        reason: HideReason,
        keyword: &'a str,
    },
}

impl<'a> Decision<'a> {
    #[inline]
    pub fn is_hide(&self) -> bool {
        matches!(self, Self::Hide { .. })
    }

    /// Numeric code for the wasm boundary: 0 = keep, otherwise the reason.
    pub fn code(&self) -> u8 {
        match self {
            Self::Keep => 0,
            Self::Hide { reason, .. } => *reason as u8,
        }
    }
}

// =============================================================================
// Triggers
// =============================================================================

bitflags::bitflags! {
    /// Sources that asked for a rescan since the last pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Trigger: u8 {
        /// Added subtree passed the mutation pre-filter
        const MUTATION = 1 << 0;
        /// Fallback polling tick
        const INTERVAL = 1 << 1;
        /// Location changed and the settle delay elapsed
        const NAVIGATION = 1 << 2;
        /// Settings snapshot was replaced
        const SETTINGS = 1 << 3;
        /// First pass after attach
        const INITIAL = 1 << 4;
    }
}

// =============================================================================
// Detector State
// =============================================================================

/// Lifecycle of a change detector for one page instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DetectorState {
    /// Not attached (page not eligible, or attach not called yet)
    Idle = 0,
    /// Attached and watching
    Active = 1,
    /// Cleanup complete; terminal for this page instance
    TornDown = 2,
}

impl DetectorState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::TornDown => "torn-down",
        }
    }
}
