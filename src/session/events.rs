//! Events posted by background tasks to the owning session.

use crate::Result;
use crate::models::{AnalysisResponse, ChipKey};

/// A message from a background task to its [`PromptSession`].
///
/// Timers, analyzer calls, and rewrite streams never touch session state;
/// they post one of these and the session applies it on its own task.
///
/// [`PromptSession`]: super::PromptSession
#[derive(Debug)]
pub enum SessionEvent {
    /// The debounce quiet interval for `ticket` elapsed.
    DebounceElapsed {
        /// Ticket issued when the timer was armed.
        ticket: u64,
    },
    /// An analyzer call completed, failed, or timed out.
    AnalysisFinished {
        /// Generation of the dispatch.
        generation: u64,
        /// Active chip at dispatch time.
        reference: Option<ChipKey>,
        /// Whether this was an explicit help request.
        manual_mode: bool,
        /// The validated response or the failure.
        outcome: Result<AnalysisResponse>,
    },
    /// The satisfied chip with `serial` has been displayed long enough.
    SatisfiedDisplayElapsed {
        /// Serial of the satisfied chip.
        serial: u64,
    },
    /// A piece of demonstration text arrived.
    StreamChunk {
        /// Generation of the demonstration.
        generation: u64,
        /// Text to append.
        text: String,
    },
    /// A demonstration stream ended.
    StreamFinished {
        /// Generation of the demonstration.
        generation: u64,
        /// Success or the failure that ended the stream.
        outcome: Result<()>,
    },
}

impl SessionEvent {
    /// Short event name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DebounceElapsed { .. } => "debounce_elapsed",
            Self::AnalysisFinished { .. } => "analysis_finished",
            Self::SatisfiedDisplayElapsed { .. } => "satisfied_display_elapsed",
            Self::StreamChunk { .. } => "stream_chunk",
            Self::StreamFinished { .. } => "stream_finished",
        }
    }
}
