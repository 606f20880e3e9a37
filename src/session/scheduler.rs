//! Debounced, cancellable analysis scheduling.

use super::{Analyzer, SessionEvent};
use crate::models::{AnalysisRequest, AnalysisResponse, ChipKey};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Observable scheduler state.
///
/// A debounce timer can be armed while an earlier analysis is still in
/// flight; the timer takes precedence in the reported state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing scheduled.
    Idle,
    /// Waiting for the quiet interval to elapse.
    Pending,
    /// An analyzer call is running.
    InFlight,
}

/// Scheduler timing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Quiet interval after the last input change.
    pub debounce: Duration,
    /// Minimum trimmed prompt length, in characters.
    pub min_prompt_length: usize,
    /// Analyzer time budget.
    pub analysis_timeout: Duration,
}

struct PendingTimer {
    ticket: u64,
    handle: JoinHandle<()>,
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

/// Debounces input changes and runs at most one analysis at a time.
///
/// Timers and analyzer calls run as spawned tasks that report back through
/// the session's event channel. Results are accepted only for the current
/// generation.
pub struct AnalysisScheduler {
    settings: SchedulerSettings,
    analyzer: Arc<dyn Analyzer>,
    events: UnboundedSender<SessionEvent>,
    pending: Option<PendingTimer>,
    in_flight: Option<InFlight>,
    next_ticket: u64,
    generation: u64,
    last_dispatched: Option<String>,
}

impl AnalysisScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new(
        settings: SchedulerSettings,
        analyzer: Arc<dyn Analyzer>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            settings,
            analyzer,
            events,
            pending: None,
            in_flight: None,
            next_ticket: 0,
            generation: 0,
            last_dispatched: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        if self.pending.is_some() {
            SchedulerState::Pending
        } else if self.in_flight.is_some() {
            SchedulerState::InFlight
        } else {
            SchedulerState::Idle
        }
    }

    /// Returns true while an analyzer call is running.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Returns true while a timer is armed or a call is running.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.pending.is_some() || self.in_flight.is_some()
    }

    /// Generation of the most recent dispatch.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if `text` is long enough to analyze.
    #[must_use]
    pub fn meets_min_length(&self, text: &str) -> bool {
        text.trim().chars().count() >= self.settings.min_prompt_length
    }

    /// Re-arms the debounce timer after an input change.
    ///
    /// Any armed timer is cancelled. Prompts below the minimum length arm
    /// nothing. A running analysis is left alone; it is superseded only when
    /// the next dispatch happens.
    pub fn on_input_changed(&mut self, text: &str) {
        self.cancel_pending();
        if !self.meets_min_length(text) {
            return;
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let debounce = self.settings.debounce;
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = events.send(SessionEvent::DebounceElapsed { ticket });
        });
        self.pending = Some(PendingTimer { ticket, handle });
    }

    /// Handles an elapsed debounce timer.
    ///
    /// Returns true if `text` should be analyzed now: the ticket is current,
    /// the text is long enough, and it differs from the last dispatched text.
    pub fn on_debounce_elapsed(&mut self, ticket: u64, text: &str) -> bool {
        match &self.pending {
            Some(pending) if pending.ticket == ticket => self.pending = None,
            _ => {
                tracing::trace!(ticket, "Ignoring superseded debounce timer");
                return false;
            },
        }

        if !self.meets_min_length(text) {
            return false;
        }
        if self.last_dispatched.as_deref() == Some(text) {
            tracing::debug!("Prompt unchanged since last analysis, skipping");
            return false;
        }
        true
    }

    /// Dispatches an analysis, cancelling any running one.
    ///
    /// Returns the generation assigned to the call. Automatic dispatches
    /// update the skip-if-unchanged memory; manual ones do not.
    pub fn dispatch(&mut self, request: AnalysisRequest, reference: Option<ChipKey>) -> u64 {
        self.cancel_in_flight();

        self.generation += 1;
        let generation = self.generation;
        let manual_mode = request.manual_mode;
        if !manual_mode {
            self.last_dispatched = Some(request.partial_prompt.clone());
        }

        let token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            generation,
            token: token.clone(),
        });

        metrics::counter!(
            "analysis_dispatched_total",
            "mode" => if manual_mode { "manual" } else { "auto" }
        )
        .increment(1);

        let analyzer = Arc::clone(&self.analyzer);
        let events = self.events.clone();
        let timeout = self.settings.analysis_timeout;
        let span = tracing::debug_span!(
            "analysis",
            generation,
            manual_mode,
            analyzer = analyzer.name()
        );

        tokio::spawn(
            async move {
                let start = tokio::time::Instant::now();
                let outcome = tokio::select! {
                    () = token.cancelled() => Err(Error::Cancelled("analysis superseded".to_string())),
                    result = run_with_timeout(analyzer.as_ref(), &request, timeout) => result,
                };
                let status = outcome_status(&outcome);
                metrics::counter!("analysis_completed_total", "status" => status).increment(1);

                match &outcome {
                    Ok(_) => tracing::debug!(
                        elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Analysis completed"
                    ),
                    Err(e) if e.is_cancellation() => {
                        tracing::debug!("Analysis cancelled");
                        return;
                    },
                    Err(e) => tracing::warn!(error = %e, status, "Analysis failed"),
                }

                let _ = events.send(SessionEvent::AnalysisFinished {
                    generation,
                    reference,
                    manual_mode,
                    outcome,
                });
            }
            .instrument(span),
        );

        generation
    }

    /// Claims the result of `generation`.
    ///
    /// Returns false for superseded or cancelled dispatches, whose results
    /// must be discarded.
    pub fn accept(&mut self, generation: u64) -> bool {
        match &self.in_flight {
            Some(flight) if flight.generation == generation && !flight.token.is_cancelled() => {
                self.in_flight = None;
                true
            },
            _ => false,
        }
    }

    /// Cancels the armed timer and any running analysis.
    pub fn cancel(&mut self) {
        self.cancel_pending();
        self.cancel_in_flight();
    }

    /// Forgets the last dispatched text so the same prompt is analyzed again.
    pub fn reset_last_dispatched(&mut self) {
        self.last_dispatched = None;
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            tracing::debug!(generation = flight.generation, "Cancelling in-flight analysis");
            flight.token.cancel();
        }
    }
}

impl Drop for AnalysisScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for AnalysisScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisScheduler")
            .field("state", &self.state())
            .field("generation", &self.generation)
            .field("analyzer", &self.analyzer.name())
            .finish_non_exhaustive()
    }
}

async fn run_with_timeout(
    analyzer: &dyn Analyzer,
    request: &AnalysisRequest,
    timeout: Duration,
) -> Result<AnalysisResponse> {
    match tokio::time::timeout(timeout, analyzer.analyze(request)).await {
        Ok(result) => result.and_then(AnalysisResponse::validated),
        Err(_) => Err(Error::Timeout {
            operation: "analyze_prompt".to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

const fn outcome_status(outcome: &Result<AnalysisResponse>) -> &'static str {
    match outcome {
        Ok(_) => "success",
        Err(Error::Cancelled(_)) => "cancelled",
        Err(Error::Timeout { .. }) => "timeout",
        Err(Error::Validation(_)) => "invalid",
        Err(_) => "error",
    }
}
