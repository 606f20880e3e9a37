//! Technique catalog.
//!
//! The catalog is loaded once at startup and never mutated. The built-in
//! catalog is compiled into the binary; a directory of `*.toml`, `*.json`,
//! or markdown (`*.md`) files (one technique per file) can replace it.

mod markdown;

use crate::models::{Technique, TechniqueId};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Embedded built-in catalog source.
const BUILTIN_CATALOG: &str = include_str!("builtin.toml");

/// Technique ids are `category/name` with lowercase slugs.
static TECHNIQUE_ID: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+/[a-z0-9-]+$").ok());

/// Shape of the built-in catalog file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    technique: Vec<Technique>,
}

/// The immutable set of techniques the analyzer may suggest.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    techniques: BTreeMap<TechniqueId, Technique>,
}

impl Catalog {
    /// Builds a catalog from techniques, validating ids and thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed or duplicate id, or a
    /// learning threshold of zero.
    pub fn new(techniques: impl IntoIterator<Item = Technique>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for technique in techniques {
            validate(&technique)?;
            if map.contains_key(&technique.id) {
                return Err(Error::InvalidInput(format!(
                    "duplicate technique id '{}'",
                    technique.id
                )));
            }
            map.insert(technique.id.clone(), technique);
        }
        Ok(Self { techniques: map })
    }

    /// Loads the catalog compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded catalog is invalid.
    pub fn builtin() -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(BUILTIN_CATALOG).map_err(|e| Error::OperationFailed {
                operation: "parse_builtin_catalog".to_string(),
                cause: e.to_string(),
            })?;
        Self::new(file.technique)
    }

    /// Loads one technique per `*.toml` / `*.json` / `*.md` file from a
    /// directory.
    ///
    /// Files with other extensions, and markdown files without front
    /// matter, are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read, a file cannot be
    /// parsed, or the resulting catalog is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::OperationFailed {
            operation: "read_catalog_dir".to_string(),
            cause: format!("{}: {e}", dir.display()),
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == "toml" || ext == "json" || ext == "md")
            })
            .collect();
        paths.sort();

        let mut techniques = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(technique) = parse_technique_file(&path)? {
                techniques.push(technique);
            }
        }

        tracing::debug!(dir = %dir.display(), count = techniques.len(), "Loaded technique catalog");
        Self::new(techniques)
    }

    /// Returns a technique by id.
    #[must_use]
    pub fn get(&self, id: &TechniqueId) -> Option<&Technique> {
        self.techniques.get(id)
    }

    /// Returns true if the id is in the catalog.
    #[must_use]
    pub fn contains(&self, id: &TechniqueId) -> bool {
        self.techniques.contains_key(id)
    }

    /// Returns the learning threshold for a technique.
    #[must_use]
    pub fn threshold_for(&self, id: &TechniqueId) -> Option<u32> {
        self.get(id).map(|t| t.learning_threshold)
    }

    /// Iterates techniques in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Technique> {
        self.techniques.values()
    }

    /// Number of techniques.
    #[must_use]
    pub fn len(&self) -> usize {
        self.techniques.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.techniques.is_empty()
    }

    /// Techniques the analyzer may surface.
    ///
    /// Automatic mode excludes learned and suppressed techniques; manual mode
    /// considers the whole catalog.
    #[must_use]
    pub fn eligible(
        &self,
        learned: &[TechniqueId],
        suppressed: &[TechniqueId],
        manual_mode: bool,
    ) -> Vec<&Technique> {
        if manual_mode {
            return self.iter().collect();
        }
        let excluded: HashSet<&TechniqueId> = learned.iter().chain(suppressed).collect();
        self.iter().filter(|t| !excluded.contains(&t.id)).collect()
    }
}

fn validate(technique: &Technique) -> Result<()> {
    let well_formed = TECHNIQUE_ID
        .as_ref()
        .is_some_and(|re| re.is_match(technique.id.as_str()));
    if !well_formed {
        return Err(Error::InvalidInput(format!(
            "technique id '{}' is not of the form category/name",
            technique.id
        )));
    }
    if technique.learning_threshold == 0 {
        return Err(Error::InvalidInput(format!(
            "technique '{}' has a learning threshold of 0",
            technique.id
        )));
    }
    Ok(())
}

fn parse_technique_file(path: &Path) -> Result<Option<Technique>> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_technique_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;

    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents).map(Some).map_err(|e| e.to_string()),
        Some("md") => {
            let technique = markdown::parse_technique(&contents).map_err(|e| e.to_string());
            if matches!(technique, Ok(None)) {
                tracing::debug!(path = %path.display(), "Skipping markdown without front matter");
            }
            technique
        },
        _ => toml::from_str(&contents).map(Some).map_err(|e| e.to_string()),
    };

    parsed.map_err(|cause| Error::OperationFailed {
        operation: "parse_technique_file".to_string(),
        cause: format!("{}: {cause}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn technique(id: &str, threshold: u32) -> Technique {
        Technique {
            id: TechniqueId::new(id),
            title: id.to_string(),
            icon: None,
            surface_criteria: "surface".to_string(),
            satisfaction_criteria: "satisfy".to_string(),
            learning_threshold: threshold,
            detail: String::new(),
        }
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.len() >= 10);
        assert!(catalog.contains(&TechniqueId::new("clarity/examples")));
        assert!(catalog.iter().all(|t| t.learning_threshold >= 1));
    }

    #[test]
    fn test_rejects_unnamespaced_id() {
        assert!(Catalog::new(vec![technique("examples", 3)]).is_err());
        assert!(Catalog::new(vec![technique("Clarity/Examples", 3)]).is_err());
    }

    #[test]
    fn test_accepts_any_lowercase_slug() {
        assert!(Catalog::new(vec![technique("a--b/-c-", 3)]).is_ok());
        assert!(Catalog::new(vec![technique("a b/c", 3)]).is_err());
        assert!(Catalog::new(vec![technique("a/b/c", 3)]).is_err());
    }

    #[test]
    fn test_rejects_zero_threshold() {
        assert!(Catalog::new(vec![technique("clarity/examples", 0)]).is_err());
    }

    #[test]
    fn test_rejects_duplicates() {
        let result = Catalog::new(vec![
            technique("clarity/examples", 3),
            technique("clarity/examples", 2),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_eligible_filters_only_in_automatic_mode() {
        let catalog = Catalog::new(vec![
            technique("a/learned", 1),
            technique("a/suppressed", 1),
            technique("a/open", 1),
        ])
        .unwrap();
        let learned = vec![TechniqueId::new("a/learned")];
        let suppressed = vec![TechniqueId::new("a/suppressed")];

        let automatic: Vec<_> = catalog
            .eligible(&learned, &suppressed, false)
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(automatic, vec!["a/open"]);

        assert_eq!(catalog.eligible(&learned, &suppressed, true).len(), 3);
    }

    #[test]
    fn test_load_from_dir_reads_all_formats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("role.toml"),
            r#"
            id = "framing/role"
            title = "Give Claude a role"
            surface_criteria = "s"
            satisfaction_criteria = "t"
            learning_threshold = 2
            "#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("search.json"),
            r#"{"id": "tools/web-search", "title": "Search", "surface_criteria": "s", "satisfaction_criteria": "t"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(
            dir.path().join("xml-tags.md"),
            "---\nid: xml-tags\nname: Use XML tags\ncategory: structure\n---\n\n## Triggers\n\n- Several distinct inputs\n\n## Satisfaction\n\n- Inputs are wrapped in tags\n",
        )
        .unwrap();

        let catalog = Catalog::load_from_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 3);
        let tags = catalog.get(&TechniqueId::new("structure/xml-tags")).unwrap();
        assert_eq!(tags.surface_criteria, "Several distinct inputs");
        assert_eq!(tags.learning_threshold, 3);
        assert_eq!(catalog.threshold_for(&TechniqueId::new("framing/role")), Some(2));
        assert_eq!(
            catalog.threshold_for(&TechniqueId::new("tools/web-search")),
            Some(3)
        );
    }
}
