//! "Show me" demonstrations.
//!
//! A demonstration streams text that applies the active chip's technique and
//! appends it to the prompt. While streaming the prompt is read-only; on
//! success the user can revert to the original until they edit again.

use super::{Rewriter, SessionEvent};
use crate::models::RewriteRequest;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Chunks buffered between the rewriter and the forwarding task.
const STREAM_BUFFER: usize = 64;

/// Demonstration state.
#[derive(Debug, Default)]
pub enum DemonstrationState {
    /// No demonstration.
    #[default]
    Idle,
    /// Text is streaming into the prompt.
    Streaming {
        /// Prompt before the demonstration.
        original: String,
        /// Text received so far.
        appended: String,
        /// Generation of this stream.
        generation: u64,
        /// Cancels the stream.
        token: CancellationToken,
    },
    /// The demonstration finished; the original can be restored.
    Completed {
        /// Prompt before the demonstration.
        original: String,
    },
}

/// Runs at most one demonstration stream per session.
pub struct DemonstrationController {
    state: DemonstrationState,
    generation: u64,
    events: UnboundedSender<SessionEvent>,
}

impl DemonstrationController {
    /// Creates an idle controller.
    #[must_use]
    pub fn new(events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            state: DemonstrationState::Idle,
            generation: 0,
            events,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &DemonstrationState {
        &self.state
    }

    /// Returns true while a stream is running.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self.state, DemonstrationState::Streaming { .. })
    }

    /// Returns true if the pre-demonstration prompt can be restored.
    #[must_use]
    pub const fn can_revert(&self) -> bool {
        matches!(self.state, DemonstrationState::Completed { .. })
    }

    /// The prompt to display while streaming: original plus received text.
    #[must_use]
    pub fn streaming_prompt(&self) -> Option<String> {
        match &self.state {
            DemonstrationState::Streaming {
                original, appended, ..
            } => Some(format!("{original}{appended}")),
            _ => None,
        }
    }

    /// The prompt captured when the running stream started.
    #[must_use]
    pub fn original(&self) -> Option<&str> {
        match &self.state {
            DemonstrationState::Streaming { original, .. }
            | DemonstrationState::Completed { original } => Some(original),
            DemonstrationState::Idle => None,
        }
    }

    /// Starts streaming a rewrite of `request.prompt`.
    ///
    /// Cancels any running stream. Returns the generation of the new stream.
    pub fn start(&mut self, rewriter: Arc<dyn Rewriter>, request: RewriteRequest) -> u64 {
        self.cancel();

        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        self.state = DemonstrationState::Streaming {
            original: request.prompt.clone(),
            appended: String::new(),
            generation,
            token: token.clone(),
        };

        metrics::counter!("demonstrations_started_total").increment(1);
        let span = tracing::debug_span!(
            "demonstration",
            generation,
            rewriter = rewriter.name(),
            technique_id = ?request.technique_id.as_ref().map(ToString::to_string)
        );
        let events = self.events.clone();
        tokio::spawn(forward_stream(rewriter, request, generation, token, events).instrument(span));

        generation
    }

    /// Appends streamed text. Chunks of other generations are dropped.
    pub fn on_chunk(&mut self, chunk_generation: u64, text: &str) -> bool {
        match &mut self.state {
            DemonstrationState::Streaming {
                appended,
                generation,
                ..
            } if *generation == chunk_generation => {
                appended.push_str(text);
                true
            },
            _ => false,
        }
    }

    /// Ends the stream of `finished_generation`.
    ///
    /// Returns the prompt to install: original plus appended text on success,
    /// the original on failure. `None` for stale generations.
    pub fn on_finished(&mut self, finished_generation: u64, outcome: &Result<()>) -> Option<String> {
        let is_current = matches!(
            &self.state,
            DemonstrationState::Streaming { generation, .. } if *generation == finished_generation
        );
        if !is_current {
            return None;
        }

        let DemonstrationState::Streaming {
            original, appended, ..
        } = std::mem::take(&mut self.state)
        else {
            return None;
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(appended_len = appended.len(), "Demonstration completed");
                metrics::counter!("demonstrations_completed_total", "status" => "success")
                    .increment(1);
                let prompt = format!("{original}{appended}");
                self.state = DemonstrationState::Completed { original };
                Some(prompt)
            },
            Err(e) => {
                tracing::warn!(error = %e, "Demonstration failed, restoring prompt");
                metrics::counter!("demonstrations_completed_total", "status" => "error")
                    .increment(1);
                Some(original)
            },
        }
    }

    /// Restores the pre-demonstration prompt, if available.
    pub fn revert(&mut self) -> Option<String> {
        if !self.can_revert() {
            return None;
        }
        match std::mem::take(&mut self.state) {
            DemonstrationState::Completed { original } => Some(original),
            _ => None,
        }
    }

    /// Drops the revert option after a user edit.
    pub fn on_user_edit(&mut self) {
        if self.can_revert() {
            self.state = DemonstrationState::Idle;
        }
    }

    /// Cancels a running stream and returns its original prompt.
    pub fn cancel(&mut self) -> Option<String> {
        match std::mem::take(&mut self.state) {
            DemonstrationState::Streaming {
                original,
                generation,
                token,
                ..
            } => {
                tracing::debug!(generation, "Cancelling demonstration");
                token.cancel();
                Some(original)
            },
            DemonstrationState::Completed { .. } | DemonstrationState::Idle => None,
        }
    }
}

impl std::fmt::Debug for DemonstrationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemonstrationController")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Runs the rewriter and forwards its chunks as session events.
async fn forward_stream(
    rewriter: Arc<dyn Rewriter>,
    request: RewriteRequest,
    generation: u64,
    token: CancellationToken,
    events: UnboundedSender<SessionEvent>,
) {
    let (tx, mut rx) = mpsc::channel::<String>(STREAM_BUFFER);
    let mut producer = tokio::spawn(async move { rewriter.rewrite(&request, tx).await });

    let outcome = loop {
        tokio::select! {
            () = token.cancelled() => {
                producer.abort();
                tracing::debug!("Demonstration stream cancelled");
                return;
            }
            chunk = rx.recv() => match chunk {
                Some(text) => {
                    if events.send(SessionEvent::StreamChunk { generation, text }).is_err() {
                        producer.abort();
                        return;
                    }
                },
                None => {
                    break match (&mut producer).await {
                        Ok(result) => result,
                        Err(e) => Err(Error::OperationFailed {
                            operation: "rewrite_stream".to_string(),
                            cause: e.to_string(),
                        }),
                    };
                },
            },
        }
    };

    if token.is_cancelled() {
        return;
    }
    let _ = events.send(SessionEvent::StreamFinished {
        generation,
        outcome,
    });
}
