//! Technique catalog entries and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespaced technique identifier (`category/name`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechniqueId(String);

impl TechniqueId {
    /// Creates a new technique ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the category segment (before the first `/`).
    #[must_use]
    pub fn category(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(c, _)| c)
    }

    /// Returns the name segment (after the first `/`), or the whole id when
    /// the id is not namespaced.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(_, n)| n)
    }

    /// Formats the id for display: `clarity/few-shot-examples` becomes
    /// `Clarity / Few Shot Examples`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.0
            .split('/')
            .map(title_case)
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

impl fmt::Display for TechniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TechniqueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TechniqueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TechniqueId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn title_case(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A prompting technique from the static catalog.
///
/// Loaded once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technique {
    /// Unique namespaced identifier.
    pub id: TechniqueId,
    /// Short human title shown on the chip when no suggestion text exists.
    pub title: String,
    /// Icon name for the UI layer.
    #[serde(default)]
    pub icon: Option<String>,
    /// When the analyzer should consider surfacing this technique.
    pub surface_criteria: String,
    /// When the analyzer should consider the technique applied.
    pub satisfaction_criteria: String,
    /// Satisfactions required before the technique counts as learned.
    #[serde(default = "default_learning_threshold")]
    pub learning_threshold: u32,
    /// Longer explanation for the UI layer.
    #[serde(default)]
    pub detail: String,
}

const fn default_learning_threshold() -> u32 {
    3
}
