//! The active suggestion chip.

use super::{ActiveChipSnapshot, Suggestion, TechniqueId};
use serde::Serialize;

/// Display status of the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipStatus {
    /// The suggestion is live and waiting for the user.
    Active,
    /// The technique was applied; the chip is shown briefly before retiring.
    Satisfied,
}

impl ChipStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Satisfied => "satisfied",
        }
    }
}

/// Identity of one surfaced chip instance.
///
/// The serial distinguishes two chips for the same technique (or two custom
/// chips, which have no technique id) surfaced at different times.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChipKey {
    /// Per-session surface counter.
    pub serial: u64,
    /// Catalog technique, `None` for custom suggestions.
    pub technique_id: Option<TechniqueId>,
}

/// The single suggestion currently owned by an editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveChip {
    /// Per-session surface counter.
    pub serial: u64,
    /// Current display status.
    pub status: ChipStatus,
    /// What the analyzer suggested.
    pub suggestion: Suggestion,
    /// When the chip surfaced (Unix epoch milliseconds).
    pub surfaced_at: u64,
}

impl ActiveChip {
    /// Returns the catalog technique backing this chip, if any.
    #[must_use]
    pub const fn technique_id(&self) -> Option<&TechniqueId> {
        self.suggestion.technique_id.as_ref()
    }

    /// Returns true for catalog-independent suggestions.
    #[must_use]
    pub const fn is_custom(&self) -> bool {
        self.suggestion.technique_id.is_none()
    }

    /// Returns the identity used for stale-result checks.
    #[must_use]
    pub fn key(&self) -> ChipKey {
        ChipKey {
            serial: self.serial,
            technique_id: self.suggestion.technique_id.clone(),
        }
    }

    /// Builds the payload sent to the analyzer for satisfaction detection.
    #[must_use]
    pub fn snapshot(&self) -> ActiveChipSnapshot {
        ActiveChipSnapshot {
            technique_id: self.suggestion.technique_id.clone(),
            suggestion_text: self.suggestion.suggestion_text.clone(),
            suggestion_description: self.suggestion.suggestion_description.clone(),
            suggestion_examples: self.suggestion.suggestion_examples.clone(),
        }
    }
}
