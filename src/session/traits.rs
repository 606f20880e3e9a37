//! Seams to the external collaborators: the analyzer and the rewriter.

use crate::Result;
use crate::models::{AnalysisRequest, AnalysisResponse, RewriteRequest};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Decides whether a technique is relevant to, or applied in, a prompt.
///
/// Implementations are black boxes to the session: they receive the current
/// prompt and chip and answer with one [`AnalysisResponse`]. The session
/// applies its own timeout and cancellation around every call.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyzer name for diagnostics.
    fn name(&self) -> &'static str;

    /// Analyzes a prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the analysis cannot be completed. Errors never
    /// change chip state.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse>;
}

/// Streams a rewrite that demonstrates a technique in the prompt.
#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Rewriter name for diagnostics.
    fn name(&self) -> &'static str;

    /// Streams the text to append to `request.prompt` through `tx`.
    ///
    /// Returns once the stream is complete. A closed receiver means the
    /// demonstration was cancelled; implementations should stop early.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails before completing.
    async fn rewrite(&self, request: &RewriteRequest, tx: mpsc::Sender<String>) -> Result<()>;
}
