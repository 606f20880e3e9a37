//! Analyzer request and response payloads.
//!
//! Every analyzer, whatever its transport, answers with one
//! [`AnalysisResponse`] shape. Responses are validated with
//! [`AnalysisResponse::validated`] before they reach the chip state machine.

use super::TechniqueId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Current analyzer response schema version.
pub const ANALYSIS_SCHEMA_VERSION: u32 = 1;

/// Number of example snippets a suggestion carries.
const SUGGESTION_EXAMPLES: usize = 2;

/// A suggestion produced by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Catalog technique, `None` for a custom prompt-specific tip.
    #[serde(default)]
    pub technique_id: Option<TechniqueId>,
    /// Short contextual suggestion (chip label).
    pub suggestion_text: String,
    /// Why the technique helps with this prompt.
    #[serde(default)]
    pub suggestion_description: String,
    /// Example snippets the user could add to the prompt.
    #[serde(default)]
    pub suggestion_examples: Vec<String>,
}

/// The active chip as described to the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveChipSnapshot {
    /// Catalog technique, `None` for custom suggestions.
    pub technique_id: Option<TechniqueId>,
    /// Chip label.
    pub suggestion_text: String,
    /// Chip explanation.
    pub suggestion_description: String,
    /// Chip examples.
    pub suggestion_examples: Vec<String>,
}

/// Input to one analyzer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    /// The in-progress prompt.
    pub partial_prompt: String,
    /// The chip currently shown, for maintain/satisfy detection.
    pub active_chip: Option<ActiveChipSnapshot>,
    /// Learned techniques (excluded from surfacing in automatic mode).
    pub learned_technique_ids: Vec<TechniqueId>,
    /// Session-suppressed techniques (excluded in automatic mode).
    pub suppressed_technique_ids: Vec<TechniqueId>,
    /// Explicit "ask for help": full catalog, always surface something.
    pub manual_mode: bool,
}

impl AnalysisRequest {
    /// Returns the technique id of the active chip, if any.
    #[must_use]
    pub fn active_technique_id(&self) -> Option<&TechniqueId> {
        self.active_chip
            .as_ref()
            .and_then(|chip| chip.technique_id.as_ref())
    }
}

/// Output of one analyzer call.
///
/// In the automatic flow at most one of the three fields is meaningful; in
/// manual mode `surface` is always populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Schema version, absent in version 1 payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    /// A new suggestion to show.
    #[serde(default)]
    pub surface: Option<Suggestion>,
    /// The active technique is still relevant.
    #[serde(default)]
    pub maintained_id: Option<TechniqueId>,
    /// The active technique was applied.
    #[serde(default)]
    pub satisfied_id: Option<TechniqueId>,
}

impl AnalysisResponse {
    /// The response that changes nothing.
    #[must_use]
    pub const fn noop() -> Self {
        Self {
            schema_version: None,
            surface: None,
            maintained_id: None,
            satisfied_id: None,
        }
    }

    /// Returns true if the response carries no signal at all.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.surface.is_none() && self.maintained_id.is_none() && self.satisfied_id.is_none()
    }

    /// Parses and validates a JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the JSON does not match the schema.
    pub fn from_json(json: &str) -> Result<Self> {
        let response: Self =
            serde_json::from_str(json).map_err(|e| Error::Validation(e.to_string()))?;
        response.validated()
    }

    /// Validates the response and normalises its suggestion.
    ///
    /// Examples are trimmed, empty ones dropped, and the list capped at two.
    /// Blank ids are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unsupported schema version or a
    /// surface without suggestion text.
    pub fn validated(mut self) -> Result<Self> {
        if let Some(version) = self.schema_version {
            if version > ANALYSIS_SCHEMA_VERSION {
                return Err(Error::Validation(format!(
                    "unsupported schema version {version} (expected <= {ANALYSIS_SCHEMA_VERSION})"
                )));
            }
        }

        self.maintained_id = self.maintained_id.filter(|id| !id.as_str().trim().is_empty());
        self.satisfied_id = self.satisfied_id.filter(|id| !id.as_str().trim().is_empty());

        if let Some(surface) = self.surface.as_mut() {
            if surface.suggestion_text.trim().is_empty() {
                return Err(Error::Validation(
                    "surface is missing suggestion_text".to_string(),
                ));
            }
            surface.technique_id = surface
                .technique_id
                .take()
                .filter(|id| !id.as_str().trim().is_empty());
            surface.suggestion_text = surface.suggestion_text.trim().to_string();
            surface.suggestion_description = surface.suggestion_description.trim().to_string();
            surface.suggestion_examples = surface
                .suggestion_examples
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .take(SUGGESTION_EXAMPLES)
                .collect();
        }

        let signals = usize::from(self.surface.is_some())
            + usize::from(self.maintained_id.is_some())
            + usize::from(self.satisfied_id.is_some());
        if signals > 1 {
            tracing::debug!(signals, "Analyzer response carries more than one signal");
        }

        Ok(self)
    }
}

/// Input to one demonstration ("show me") rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteRequest {
    /// The prompt to continue.
    pub prompt: String,
    /// Catalog technique to demonstrate, `None` for a custom suggestion.
    pub technique_id: Option<TechniqueId>,
    /// Chip label.
    pub suggestion_text: String,
    /// Chip explanation.
    pub suggestion_description: String,
}

/// The verdict shape requested from the LLM.
///
/// The model answers maintain/satisfy as booleans about the active chip;
/// [`LlmVerdict::into_response`] maps them onto technique ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmVerdict {
    /// A new suggestion, if any.
    #[serde(default)]
    pub surface: Option<Suggestion>,
    /// Whether the active technique is still relevant.
    #[serde(default)]
    pub maintained: bool,
    /// Whether the active technique was applied.
    #[serde(default)]
    pub satisfied: bool,
}

impl LlmVerdict {
    /// Converts the verdict to a response for the given active technique.
    ///
    /// Maintain and satisfy only carry meaning when a catalog technique is
    /// active; for custom or absent chips they are dropped.
    #[must_use]
    pub fn into_response(self, active: Option<&TechniqueId>) -> AnalysisResponse {
        AnalysisResponse {
            schema_version: Some(ANALYSIS_SCHEMA_VERSION),
            surface: self.surface,
            maintained_id: active.filter(|_| self.maintained).cloned(),
            satisfied_id: active.filter(|_| self.satisfied).cloned(),
        }
    }
}
