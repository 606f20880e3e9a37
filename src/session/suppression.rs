//! Session-scoped suppression of techniques.

use crate::models::TechniqueId;
use std::collections::BTreeSet;

/// Technique ids excluded from surfacing for the rest of an editing session.
///
/// Populated by dismissals and satisfactions, cleared when the prompt is
/// submitted. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct SuppressionTracker {
    ids: BTreeSet<TechniqueId>,
}

impl SuppressionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses a technique. Returns true if it was not already suppressed.
    pub fn suppress(&mut self, id: &TechniqueId) -> bool {
        self.ids.insert(id.clone())
    }

    /// Returns true if the technique is suppressed.
    #[must_use]
    pub fn is_suppressed(&self, id: &TechniqueId) -> bool {
        self.ids.contains(id)
    }

    /// Lifts the suppression of one technique.
    ///
    /// Used when the user explicitly asks for help and the analyzer picks a
    /// technique they dismissed earlier.
    pub fn lift(&mut self, id: &TechniqueId) -> bool {
        self.ids.remove(id)
    }

    /// Clears the set. Called once per successful submission.
    pub fn reset_session(&mut self) {
        if !self.ids.is_empty() {
            tracing::debug!(count = self.ids.len(), "Resetting session suppression");
        }
        self.ids.clear();
    }

    /// Suppressed ids in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<TechniqueId> {
        self.ids.iter().cloned().collect()
    }

    /// Number of suppressed techniques.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing is suppressed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
