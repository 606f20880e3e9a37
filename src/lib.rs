//! # Promptcoach
//!
//! Contextual prompting-technique suggestions for LLM chat composers.
//!
//! Promptcoach watches a prompt while it is being written, periodically asks
//! an analyzer (an LLM call) whether a prompting technique from the catalog
//! is relevant or has already been applied, and surfaces at most one
//! suggestion ("chip") at a time. Satisfied techniques are credited to a
//! durable progress store until they are learned.
//!
//! ## Features
//!
//! - Debounced, cancellable prompt analysis with stale-result protection
//! - Single-chip state machine (surface, maintain, satisfy, dismiss, retire)
//! - Session-scoped suppression of dismissed and satisfied techniques
//! - Durable per-technique mastery progress with learning thresholds
//! - "Show me" demonstrations that stream a technique into the prompt
//!
//! ## Example
//!
//! ```rust,ignore
//! use promptcoach::{Catalog, CoachConfig, ProgressStore, PromptSession};
//!
//! let session = PromptSession::builder(config.session_settings())
//!     .catalog(Arc::new(Catalog::builtin()?))
//!     .progress(Arc::new(ProgressStore::open(backend)))
//!     .analyzer(analyzer)
//!     .rewriter(rewriter)
//!     .build()?;
//!
//! session.handle_input("Write a cover letter for a data engineering role at a startup");
//! session.run_until_idle().await;
//! if let Some(chip) = session.view().chip {
//!     println!("{}", chip.suggestion_text);
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod catalog;
pub mod config;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod session;
pub mod storage;

// Re-exports for convenience
pub use catalog::Catalog;
pub use config::{CoachConfig, FeatureFlags, SessionSettings};
pub use models::{
    ActiveChip, AnalysisRequest, AnalysisResponse, ChipStatus, ProgressRecord, Suggestion,
    Technique, TechniqueId,
};
pub use services::ProgressStore;
pub use session::{Analyzer, PromptSession, Rewriter, SessionEvent, SessionView};
pub use storage::{FilesystemBackend, MemoryBackend, ProgressBackend};

/// Error type for promptcoach operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed catalog entries, bad technique ids, bad CLI arguments |
/// | `OperationFailed` | I/O errors, HTTP failures, unparsable LLM output |
/// | `Validation` | Analyzer responses that violate the response schema |
/// | `Timeout` | An analyzer call exceeded its time budget |
/// | `Cancelled` | A request was superseded or explicitly aborted |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Progress or configuration files cannot be read or written
    /// - The LLM endpoint is unreachable or returns an error status
    /// - An LLM reply contains no parsable JSON
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An analyzer response failed schema validation.
    #[error("invalid analyzer response: {0}")]
    Validation(String),

    /// An operation exceeded its time budget.
    #[error("'{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The budget that was exceeded.
        timeout_ms: u64,
    },

    /// The operation was cancelled before it completed.
    ///
    /// Cancellation is expected control flow (a newer request superseded
    /// this one) and is never reported to the user.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Returns true if this error represents expected cancellation rather
    /// than a genuine failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Result type alias for promptcoach operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use promptcoach::current_timestamp_ms;
///
/// assert!(current_timestamp_ms() > 0);
/// ```
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
