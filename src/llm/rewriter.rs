//! Rewriter that streams a demonstration from the LLM.

use super::AnthropicClient;
use super::system_prompt::{OperationMode, build_demonstration_prompt, build_system_prompt};
use crate::Result;
use crate::catalog::Catalog;
use crate::models::RewriteRequest;
use crate::session::Rewriter;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Maximum tokens for a demonstration; the reply is one or two sentences.
const DEMONSTRATION_MAX_TOKENS: u32 = 256;

/// Streams "show me" demonstrations through the Anthropic Messages API.
pub struct LlmRewriter {
    client: Arc<AnthropicClient>,
    catalog: Arc<Catalog>,
}

impl LlmRewriter {
    /// Creates a rewriter over a client and the technique catalog.
    #[must_use]
    pub const fn new(client: Arc<AnthropicClient>, catalog: Arc<Catalog>) -> Self {
        Self { client, catalog }
    }
}

#[async_trait]
impl Rewriter for LlmRewriter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn rewrite(&self, request: &RewriteRequest, tx: mpsc::Sender<String>) -> Result<()> {
        let technique = request
            .technique_id
            .as_ref()
            .and_then(|id| self.catalog.get(id));

        let system = build_system_prompt(OperationMode::Demonstration, false);
        let user = build_demonstration_prompt(request, technique);

        self.client
            .stream(&system, &user, DEMONSTRATION_MAX_TOKENS, tx)
            .await
    }
}
