//! Prompt sessions: the suggestion lifecycle of one composer.
//!
//! A [`PromptSession`] owns the prompt text, the chip state machine, the
//! analysis scheduler, and the demonstration controller. Background tasks
//! report back through an event channel that only the session drains, so
//! every state change happens on the task that owns the session.

mod chip;
mod demonstration;
mod events;
mod scheduler;
mod suppression;
mod traits;

pub use chip::{ChipState, ChipStateMachine, Transition};
pub use demonstration::{DemonstrationController, DemonstrationState};
pub use events::SessionEvent;
pub use scheduler::{AnalysisScheduler, SchedulerSettings, SchedulerState};
pub use suppression::SuppressionTracker;
pub use traits::{Analyzer, Rewriter};

use crate::catalog::Catalog;
use crate::config::SessionSettings;
use crate::models::{ActiveChip, ChipStatus, RewriteRequest, TechniqueId};
use crate::services::ProgressStore;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::instrument;

/// The chip as the UI layer renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChipView {
    /// Per-session chip serial.
    pub serial: u64,
    /// Catalog technique, `None` for a custom suggestion.
    pub technique_id: Option<TechniqueId>,
    /// Catalog title of the technique.
    pub title: Option<String>,
    /// Icon name of the technique.
    pub icon: Option<String>,
    /// Display status.
    pub status: ChipStatus,
    /// Chip label.
    pub suggestion_text: String,
    /// Chip explanation.
    pub suggestion_description: String,
    /// Example snippets.
    pub suggestion_examples: Vec<String>,
}

/// Snapshot of a session for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    /// Prompt text to display. Includes streamed text during a
    /// demonstration.
    pub prompt: String,
    /// The chip, if one is shown.
    pub chip: Option<ChipView>,
    /// An analyzer call is running.
    pub is_analyzing: bool,
    /// A demonstration is streaming; the prompt is read-only.
    pub is_streaming: bool,
    /// The pre-demonstration prompt can be restored.
    pub can_revert: bool,
    /// "Show me" is offered for the current chip.
    pub can_show_me: bool,
}

/// Builder for [`PromptSession`].
pub struct PromptSessionBuilder {
    settings: SessionSettings,
    catalog: Option<Arc<Catalog>>,
    progress: Option<Arc<ProgressStore>>,
    analyzer: Option<Arc<dyn Analyzer>>,
    rewriter: Option<Arc<dyn Rewriter>>,
}

impl PromptSessionBuilder {
    /// Sets the technique catalog. Defaults to the built-in catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Sets the progress store. Defaults to an in-memory store.
    #[must_use]
    pub fn progress(mut self, progress: Arc<ProgressStore>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sets the analyzer. Required.
    #[must_use]
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Sets the rewriter. Without one, "show me" is unavailable.
    #[must_use]
    pub fn rewriter(mut self, rewriter: Arc<dyn Rewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Builds the session.
    ///
    /// Must be called inside a Tokio runtime; the session spawns its timers
    /// and calls there.
    ///
    /// # Errors
    ///
    /// Returns an error if no analyzer was set or the built-in catalog
    /// cannot be loaded.
    pub fn build(self) -> Result<PromptSession> {
        let analyzer = self
            .analyzer
            .ok_or_else(|| Error::InvalidInput("a prompt session needs an analyzer".to_string()))?;
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(Catalog::builtin()?),
        };
        let progress = self
            .progress
            .unwrap_or_else(|| Arc::new(ProgressStore::in_memory()));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let scheduler = AnalysisScheduler::new(
            SchedulerSettings {
                debounce: self.settings.debounce,
                min_prompt_length: self.settings.min_prompt_length,
                analysis_timeout: self.settings.analysis_timeout,
            },
            analyzer,
            events_tx.clone(),
        );

        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(session_id = %id, techniques = catalog.len(), "Prompt session created");

        Ok(PromptSession {
            id,
            settings: self.settings,
            prompt: String::new(),
            chips: ChipStateMachine::new(catalog, progress),
            scheduler,
            demonstration: DemonstrationController::new(events_tx.clone()),
            rewriter: self.rewriter,
            events_tx,
            events_rx,
        })
    }
}

/// The suggestion lifecycle of one prompt composer.
pub struct PromptSession {
    id: String,
    settings: SessionSettings,
    prompt: String,
    chips: ChipStateMachine,
    scheduler: AnalysisScheduler,
    demonstration: DemonstrationController,
    rewriter: Option<Arc<dyn Rewriter>>,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
}

impl PromptSession {
    /// Starts building a session.
    #[must_use]
    pub const fn builder(settings: SessionSettings) -> PromptSessionBuilder {
        PromptSessionBuilder {
            settings,
            catalog: None,
            progress: None,
            analyzer: None,
            rewriter: None,
        }
    }

    /// Session identifier used in logs.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current prompt text (excluding in-progress streamed text).
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The chip state machine.
    #[must_use]
    pub const fn chips(&self) -> &ChipStateMachine {
        &self.chips
    }

    /// Scheduler state.
    #[must_use]
    pub const fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Replaces the prompt text after a user edit.
    ///
    /// Rejected (returns false) while a demonstration is streaming. An empty
    /// prompt ends the editing session's chip and forgets the last analyzed
    /// text.
    #[instrument(skip(self, text), fields(session_id = %self.id, len = text.len()))]
    pub fn handle_input(&mut self, text: &str) -> bool {
        if self.demonstration.is_streaming() {
            tracing::debug!("Ignoring input while a demonstration is streaming");
            return false;
        }

        self.prompt = text.to_string();
        self.demonstration.on_user_edit();

        if text.trim().is_empty() {
            self.clear_state();
            return true;
        }

        if self.settings.features.auto_suggestions {
            self.scheduler.on_input_changed(text);
        }
        true
    }

    /// Clears the prompt, cancelling any demonstration.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn clear(&mut self) {
        self.demonstration.cancel();
        self.demonstration.on_user_edit();
        self.prompt.clear();
        self.clear_state();
    }

    /// Explicitly asks for help with the current prompt.
    ///
    /// Dismisses the current chip, then analyzes the prompt against the full
    /// catalog without waiting for the debounce.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] while streaming or when the prompt is
    /// shorter than the minimum length.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn request_help(&mut self) -> Result<u64> {
        if self.demonstration.is_streaming() {
            return Err(Error::InvalidInput(
                "cannot ask for help while a demonstration is streaming".to_string(),
            ));
        }
        if !self.scheduler.meets_min_length(&self.prompt) {
            return Err(Error::InvalidInput(format!(
                "prompt must be at least {} characters",
                self.settings.min_prompt_length
            )));
        }

        self.scheduler.cancel();
        self.chips.dismiss();
        let request = self.chips.build_request(&self.prompt, true);
        let generation = self.scheduler.dispatch(request, None);
        tracing::debug!(generation, "Manual analysis dispatched");
        Ok(generation)
    }

    /// Dismisses the chip. Returns false if no chip was shown.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn dismiss_chip(&mut self) -> bool {
        self.chips.dismiss().is_some()
    }

    /// Starts a "show me" demonstration for the active chip.
    ///
    /// The chip is satisfied immediately. Pending and running analyses are
    /// cancelled; analysis stays off until the stream ends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the feature is disabled, no rewriter
    /// is configured, no chip is active, or a stream is already running.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn show_me(&mut self) -> Result<u64> {
        if !self.settings.features.show_me {
            return Err(Error::InvalidInput("show me is disabled".to_string()));
        }
        let Some(rewriter) = self.rewriter.clone() else {
            return Err(Error::InvalidInput("no rewriter configured".to_string()));
        };
        if self.demonstration.is_streaming() {
            return Err(Error::InvalidInput(
                "a demonstration is already streaming".to_string(),
            ));
        }
        let Some(chip) = self.chips.active().cloned() else {
            return Err(Error::InvalidInput("no active chip".to_string()));
        };

        self.scheduler.cancel();

        let key = chip.key();
        if self.chips.satisfy(&key) {
            self.schedule_retire(key.serial);
        }

        let request = RewriteRequest {
            prompt: self.prompt.clone(),
            technique_id: chip.suggestion.technique_id,
            suggestion_text: chip.suggestion.suggestion_text,
            suggestion_description: chip.suggestion.suggestion_description,
        };
        let generation = self.demonstration.start(rewriter, request);
        tracing::debug!(generation, "Demonstration started");
        Ok(generation)
    }

    /// Restores the prompt from before the last demonstration.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn revert(&mut self) -> bool {
        match self.demonstration.revert() {
            Some(original) => {
                self.prompt = original;
                true
            },
            None => false,
        }
    }

    /// Submits the prompt.
    ///
    /// Returns the trimmed prompt, or `None` if it is blank. The chip, the
    /// suppression set, scheduled analyses, and any demonstration are reset
    /// before this returns. Submitting during a demonstration sends the
    /// prompt as it was before the stream started.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn submit(&mut self) -> Option<String> {
        let original = self.demonstration.cancel();
        let text = original.unwrap_or_else(|| std::mem::take(&mut self.prompt));
        let submitted = text.trim().to_string();
        if submitted.is_empty() {
            self.prompt = text;
            return None;
        }

        self.demonstration.on_user_edit();
        self.scheduler.cancel();
        self.scheduler.reset_last_dispatched();
        self.chips.reset_session();
        self.prompt.clear();
        metrics::counter!("prompts_submitted_total").increment(1);
        Some(submitted)
    }

    /// Waits for the next background event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Applies a background event.
    #[instrument(skip(self, event), fields(session_id = %self.id, event = event.kind()))]
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::DebounceElapsed { ticket } => self.on_debounce_elapsed(ticket),
            SessionEvent::AnalysisFinished {
                generation,
                reference,
                manual_mode,
                outcome,
            } => {
                if !self.scheduler.accept(generation) {
                    tracing::debug!(generation, "Dropping superseded analysis result");
                    return;
                }
                let response = match outcome {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::debug!(generation, error = %e, "Analysis produced no change");
                        return;
                    },
                };
                if reference != self.chips.reference() {
                    tracing::debug!(generation, "Dropping analysis result for a changed chip");
                    return;
                }
                if let Transition::Satisfied(key) = self.chips.apply(response, manual_mode) {
                    self.schedule_retire(key.serial);
                }
            },
            SessionEvent::SatisfiedDisplayElapsed { serial } => {
                self.chips.retire(serial);
            },
            SessionEvent::StreamChunk { generation, text } => {
                self.demonstration.on_chunk(generation, &text);
            },
            SessionEvent::StreamFinished {
                generation,
                outcome,
            } => {
                if let Some(prompt) = self.demonstration.on_finished(generation, &outcome) {
                    self.prompt = prompt;
                }
            },
        }
    }

    /// Processes events until no timer, analysis, stream, or satisfied
    /// display is outstanding.
    pub async fn run_until_idle(&mut self) {
        while self.has_pending_work() {
            let Some(event) = self.next_event().await else {
                break;
            };
            self.handle_event(event);
        }
    }

    /// Returns true while background work may still post events.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.scheduler.is_busy()
            || self.demonstration.is_streaming()
            || self.chips.is_satisfied_displayed()
            || !self.events_rx.is_empty()
    }

    /// Snapshot for rendering.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let chip = self.chips.chip().map(|chip| self.chip_view(chip));
        let can_show_me = self.settings.features.show_me
            && self.rewriter.is_some()
            && !self.demonstration.is_streaming()
            && self.chips.active().is_some();

        SessionView {
            prompt: self
                .demonstration
                .streaming_prompt()
                .unwrap_or_else(|| self.prompt.clone()),
            chip,
            is_analyzing: self.scheduler.is_in_flight(),
            is_streaming: self.demonstration.is_streaming(),
            can_revert: self.demonstration.can_revert(),
            can_show_me,
        }
    }

    fn chip_view(&self, chip: &ActiveChip) -> ChipView {
        let technique = chip.technique_id().and_then(|id| self.chips.catalog().get(id));
        ChipView {
            serial: chip.serial,
            technique_id: chip.suggestion.technique_id.clone(),
            title: technique.map(|t| t.title.clone()),
            icon: technique.and_then(|t| t.icon.clone()),
            status: chip.status,
            suggestion_text: chip.suggestion.suggestion_text.clone(),
            suggestion_description: chip.suggestion.suggestion_description.clone(),
            suggestion_examples: chip.suggestion.suggestion_examples.clone(),
        }
    }

    fn on_debounce_elapsed(&mut self, ticket: u64) {
        if self.demonstration.is_streaming() {
            return;
        }
        if !self.scheduler.on_debounce_elapsed(ticket, &self.prompt) {
            return;
        }
        let request = self.chips.build_request(&self.prompt, false);
        let reference = self.chips.reference();
        let generation = self.scheduler.dispatch(request, reference);
        tracing::debug!(generation, "Analysis dispatched");
    }

    fn schedule_retire(&self, serial: u64) {
        let display = self.settings.satisfied_display;
        if display == Duration::ZERO {
            let _ = self
                .events_tx
                .send(SessionEvent::SatisfiedDisplayElapsed { serial });
            return;
        }
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(display).await;
            let _ = events.send(SessionEvent::SatisfiedDisplayElapsed { serial });
        });
    }

    fn clear_state(&mut self) {
        self.scheduler.cancel();
        self.scheduler.reset_last_dispatched();
        self.chips.clear();
    }
}

impl std::fmt::Debug for PromptSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptSession")
            .field("id", &self.id)
            .field("chips", &self.chips)
            .field("scheduler", &self.scheduler)
            .field("demonstration", &self.demonstration)
            .finish_non_exhaustive()
    }
}
