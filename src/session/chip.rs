//! The single-chip state machine.
//!
//! ```text
//! NoChip --surface--> Active --satisfied--> Satisfied --display elapsed--> NoChip
//!                       |  \--maintained--> Active
//!                       \----dismiss-----> NoChip
//! any --clear--> NoChip
//! ```
//!
//! The machine is the only writer of the [`ProgressStore`] and the
//! [`SuppressionTracker`] for a session.

use super::SuppressionTracker;
use crate::catalog::Catalog;
use crate::current_timestamp_ms;
use crate::models::{ActiveChip, AnalysisRequest, AnalysisResponse, ChipKey, ChipStatus, Suggestion};
use crate::services::ProgressStore;
use std::sync::Arc;

/// Chip state of one editing session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChipState {
    /// No suggestion is shown.
    #[default]
    NoChip,
    /// A live suggestion.
    Active(ActiveChip),
    /// A satisfied suggestion, shown briefly before it retires.
    Satisfied(ActiveChip),
}

/// Outcome of applying an analyzer response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed.
    Unchanged,
    /// The active chip stays.
    Maintained,
    /// A new chip became active, replacing any previous one.
    Surfaced(ChipKey),
    /// The active chip was satisfied and must retire after the display time.
    Satisfied(ChipKey),
}

/// Owns the active chip and applies analyzer results and user actions.
pub struct ChipStateMachine {
    state: ChipState,
    next_serial: u64,
    suppression: SuppressionTracker,
    catalog: Arc<Catalog>,
    progress: Arc<ProgressStore>,
}

impl ChipStateMachine {
    /// Creates a machine with no chip.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, progress: Arc<ProgressStore>) -> Self {
        Self {
            state: ChipState::NoChip,
            next_serial: 1,
            suppression: SuppressionTracker::new(),
            catalog,
            progress,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &ChipState {
        &self.state
    }

    /// The chip being shown, active or satisfied.
    #[must_use]
    pub const fn chip(&self) -> Option<&ActiveChip> {
        match &self.state {
            ChipState::NoChip => None,
            ChipState::Active(chip) | ChipState::Satisfied(chip) => Some(chip),
        }
    }

    /// The chip if it is active.
    #[must_use]
    pub const fn active(&self) -> Option<&ActiveChip> {
        match &self.state {
            ChipState::Active(chip) => Some(chip),
            _ => None,
        }
    }

    /// Identity of the active chip, captured by analyses at dispatch time.
    #[must_use]
    pub fn reference(&self) -> Option<ChipKey> {
        self.active().map(ActiveChip::key)
    }

    /// Returns true while a satisfied chip is on display.
    #[must_use]
    pub const fn is_satisfied_displayed(&self) -> bool {
        matches!(self.state, ChipState::Satisfied(_))
    }

    /// Session suppression set.
    #[must_use]
    pub const fn suppression(&self) -> &SuppressionTracker {
        &self.suppression
    }

    /// Technique catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Builds the analyzer request for the given prompt.
    ///
    /// Manual requests never carry the active chip: the caller dismisses it
    /// before asking for help.
    #[must_use]
    pub fn build_request(&self, prompt: &str, manual_mode: bool) -> AnalysisRequest {
        AnalysisRequest {
            partial_prompt: prompt.to_string(),
            active_chip: if manual_mode {
                None
            } else {
                self.active().map(ActiveChip::snapshot)
            },
            learned_technique_ids: self.progress.learned_ids(),
            suppressed_technique_ids: self.suppression.ids(),
            manual_mode,
        }
    }

    /// Applies a validated analyzer response.
    ///
    /// Maintain wins over everything else; a satisfaction of the active chip
    /// is applied before any surface in the same response.
    pub fn apply(&mut self, response: AnalysisResponse, manual_mode: bool) -> Transition {
        let active_key = self.reference();
        let active_id = active_key.as_ref().and_then(|k| k.technique_id.as_ref());

        if let (Some(maintained), Some(active)) = (&response.maintained_id, active_id) {
            if maintained == active {
                tracing::debug!(technique_id = %active, "Chip maintained");
                return Transition::Maintained;
            }
        }

        let mut transition = Transition::Unchanged;

        if let (Some(satisfied), Some(key)) = (&response.satisfied_id, &active_key) {
            if key.technique_id.as_ref() == Some(satisfied) && self.satisfy(key) {
                transition = Transition::Satisfied(key.clone());
            }
        }

        if let Some(suggestion) = response.surface {
            if let Some(key) = self.surface(suggestion, manual_mode) {
                transition = Transition::Surfaced(key);
            }
        }

        transition
    }

    /// Surfaces a suggestion, replacing any current chip.
    ///
    /// Automatic mode drops suggestions for suppressed, learned, or unknown
    /// techniques. Manual mode turns unknown ids into custom suggestions and
    /// lifts the suppression of the chosen technique.
    pub fn surface(&mut self, mut suggestion: Suggestion, manual_mode: bool) -> Option<ChipKey> {
        if let Some(id) = suggestion.technique_id.clone() {
            if !self.catalog.contains(&id) {
                if !manual_mode {
                    tracing::debug!(technique_id = %id, "Dropping surface for unknown technique");
                    return None;
                }
                tracing::debug!(technique_id = %id, "Unknown technique, surfacing as custom");
                suggestion.technique_id = None;
            } else if manual_mode {
                if self.suppression.lift(&id) {
                    tracing::debug!(technique_id = %id, "Lifted suppression for manual request");
                }
            } else if self.suppression.is_suppressed(&id) {
                tracing::debug!(technique_id = %id, "Dropping surface for suppressed technique");
                return None;
            } else if self.progress.is_learned(&id) {
                tracing::debug!(technique_id = %id, "Dropping surface for learned technique");
                return None;
            }
        }

        let chip = ActiveChip {
            serial: self.next_serial,
            status: ChipStatus::Active,
            suggestion,
            surfaced_at: current_timestamp_ms(),
        };
        self.next_serial += 1;

        let key = chip.key();
        tracing::debug!(
            serial = key.serial,
            technique_id = ?key.technique_id.as_ref().map(ToString::to_string),
            manual_mode,
            "Chip surfaced"
        );
        metrics::counter!(
            "chips_surfaced_total",
            "kind" => if key.technique_id.is_some() { "catalog" } else { "custom" }
        )
        .increment(1);
        self.state = ChipState::Active(chip);
        Some(key)
    }

    /// Satisfies the active chip if it is still the expected one.
    ///
    /// Records the satisfaction and suppresses the technique. Returns false
    /// (and does nothing) when the chip changed or was already satisfied,
    /// which keeps the analyzer and demonstration paths from crediting a
    /// technique twice.
    pub fn satisfy(&mut self, expected: &ChipKey) -> bool {
        let ChipState::Active(chip) = &self.state else {
            return false;
        };
        if chip.key() != *expected {
            return false;
        }

        let mut chip = chip.clone();
        chip.status = ChipStatus::Satisfied;

        if let Some(id) = chip.technique_id() {
            match self.catalog.threshold_for(id) {
                Some(threshold) => {
                    let record = self.progress.record_satisfaction(id, threshold);
                    tracing::info!(
                        technique_id = %id,
                        count = record.satisfaction_count,
                        learned = record.learned,
                        "Technique satisfied"
                    );
                },
                None => {
                    tracing::warn!(technique_id = %id, "Satisfied technique missing from catalog");
                },
            }
            self.suppression.suppress(id);
        } else {
            tracing::debug!(serial = chip.serial, "Custom chip satisfied");
        }

        self.state = ChipState::Satisfied(chip);
        true
    }

    /// Dismisses the chip being shown.
    ///
    /// An active catalog chip is suppressed for the rest of the session; no
    /// satisfaction is recorded. Returns the removed chip.
    pub fn dismiss(&mut self) -> Option<ActiveChip> {
        match std::mem::take(&mut self.state) {
            ChipState::NoChip => None,
            ChipState::Active(chip) => {
                if let Some(id) = chip.technique_id() {
                    self.suppression.suppress(id);
                }
                tracing::debug!(
                    serial = chip.serial,
                    technique_id = ?chip.technique_id().map(ToString::to_string),
                    "Chip dismissed"
                );
                metrics::counter!("chips_dismissed_total").increment(1);
                Some(chip)
            },
            ChipState::Satisfied(chip) => Some(chip),
        }
    }

    /// Retires a satisfied chip once its display time has elapsed.
    ///
    /// Ignored unless the satisfied chip still has the given serial.
    pub fn retire(&mut self, serial: u64) -> bool {
        if matches!(&self.state, ChipState::Satisfied(chip) if chip.serial == serial) {
            self.state = ChipState::NoChip;
            true
        } else {
            false
        }
    }

    /// Drops the chip without side effects (prompt cleared).
    pub fn clear(&mut self) {
        self.state = ChipState::NoChip;
    }

    /// Drops the chip and resets suppression (prompt submitted).
    pub fn reset_session(&mut self) {
        self.state = ChipState::NoChip;
        self.suppression.reset_session();
    }
}

impl std::fmt::Debug for ChipStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChipStateMachine")
            .field("state", &self.state)
            .field("suppressed", &self.suppression.ids())
            .finish_non_exhaustive()
    }
}
