//! Analyzer backed by an LLM completion.

use super::system_prompt::{OperationMode, build_analysis_prompt, build_system_prompt};
use super::{AnthropicClient, extract_json_from_response};
use crate::catalog::Catalog;
use crate::models::{AnalysisRequest, AnalysisResponse, LlmVerdict};
use crate::session::Analyzer;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Maximum tokens for an analysis verdict.
const ANALYSIS_MAX_TOKENS: u32 = 1024;

/// Analyzes prompts through the Anthropic Messages API.
pub struct LlmAnalyzer {
    client: Arc<AnthropicClient>,
    catalog: Arc<Catalog>,
}

impl LlmAnalyzer {
    /// Creates an analyzer over a client and the technique catalog.
    #[must_use]
    pub const fn new(client: Arc<AnthropicClient>, catalog: Arc<Catalog>) -> Self {
        Self { client, catalog }
    }

    /// Parses a raw model reply into a response for `request`.
    fn parse_reply(request: &AnalysisRequest, reply: &str) -> Result<AnalysisResponse> {
        let json = extract_json_from_response(reply);
        let verdict: LlmVerdict = serde_json::from_str(json).map_err(|e| {
            tracing::warn!(error = %e, "Analyzer reply is not a valid verdict");
            Error::OperationFailed {
                operation: "parse_analysis".to_string(),
                cause: e.to_string(),
            }
        })?;

        let response = verdict
            .into_response(request.active_technique_id())
            .validated()?;

        if request.manual_mode && response.surface.is_none() {
            return Err(Error::Validation(
                "manual analysis returned no suggestion".to_string(),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let eligible = self.catalog.eligible(
            &request.learned_technique_ids,
            &request.suppressed_technique_ids,
            request.manual_mode,
        );
        let active = request
            .active_technique_id()
            .and_then(|id| self.catalog.get(id));

        if !request.manual_mode && eligible.is_empty() && active.is_none() {
            tracing::debug!("No eligible techniques, skipping analysis call");
            return Ok(AnalysisResponse::noop());
        }

        let system = build_system_prompt(OperationMode::Analysis, request.manual_mode);
        let user = build_analysis_prompt(request, &eligible, active);
        let reply = self
            .client
            .complete(&system, &user, ANALYSIS_MAX_TOKENS)
            .await?;

        Self::parse_reply(request, &reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::models::{ActiveChipSnapshot, TechniqueId};

    fn request(manual_mode: bool, active: Option<&str>) -> AnalysisRequest {
        AnalysisRequest {
            partial_prompt: "Write a cover letter for a data role".to_string(),
            active_chip: active.map(|id| ActiveChipSnapshot {
                technique_id: Some(TechniqueId::new(id)),
                suggestion_text: "Show an example".to_string(),
                suggestion_description: String::new(),
                suggestion_examples: Vec::new(),
            }),
            learned_technique_ids: Vec::new(),
            suppressed_technique_ids: Vec::new(),
            manual_mode,
        }
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "```json\n{\"surface\": {\"technique_id\": \"clarity/examples\", \"suggestion_text\": \"Paste a past letter\", \"suggestion_examples\": [\"a\", \"b\"]}, \"maintained\": false, \"satisfied\": false}\n```";
        let response = LlmAnalyzer::parse_reply(&request(false, None), reply).unwrap();
        let surface = response.surface.unwrap();
        assert_eq!(surface.technique_id, Some(TechniqueId::new("clarity/examples")));
        assert_eq!(surface.suggestion_examples.len(), 2);
    }

    #[test]
    fn test_parse_maps_satisfied_to_active_chip() {
        let reply = r#"{"surface": null, "maintained": false, "satisfied": true}"#;
        let response =
            LlmAnalyzer::parse_reply(&request(false, Some("clarity/examples")), reply).unwrap();
        assert_eq!(
            response.satisfied_id,
            Some(TechniqueId::new("clarity/examples"))
        );
    }

    #[test]
    fn test_manual_reply_without_surface_is_invalid() {
        let reply = r#"{"surface": null, "maintained": false, "satisfied": false}"#;
        assert!(matches!(
            LlmAnalyzer::parse_reply(&request(true, None), reply),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_unparsable_reply_fails() {
        assert!(LlmAnalyzer::parse_reply(&request(false, None), "I cannot help").is_err());
    }

    #[tokio::test]
    async fn test_automatic_with_nothing_eligible_skips_call() {
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let client = AnthropicClient::from_config(&LlmConfig::default());
        let analyzer = LlmAnalyzer::new(Arc::new(client), Arc::clone(&catalog));
        let mut req = request(false, None);
        req.learned_technique_ids = catalog.iter().map(|t| t.id.clone()).collect();

        let response = analyzer.analyze(&req).await.unwrap();
        assert!(response.is_noop());
    }
}
