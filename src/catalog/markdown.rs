//! Markdown technique files.
//!
//! A technique file carries YAML front matter followed by `##` sections:
//!
//! ```text
//! ---
//! id: examples
//! name: Show an example
//! category: clarity
//! learning_threshold: 3
//! ---
//!
//! ## Chip
//!
//! Show Claude what good output looks like
//!
//! ## Triggers
//!
//! - Output format is implied but never shown
//!
//! ## Satisfaction
//!
//! - The prompt includes a sample of the desired output
//!
//! ## Detail
//!
//! Longer explanation for the UI.
//! ```
//!
//! Ids without a `/` are namespaced under the slugified category.

use crate::models::{Technique, TechniqueId};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

const DELIMITER: &str = "---";

/// Threshold used when the front matter omits one or sets it to 0.
const DEFAULT_THRESHOLD: u32 = 3;

#[derive(Debug, Deserialize)]
struct FrontMatter {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    learning_threshold: Option<u32>,
}

/// Splits content into front matter and body.
///
/// Returns `None` when the content does not open with a delimiter line.
fn split_front_matter(content: &str) -> Result<Option<(&str, &str)>> {
    let content = content.trim_start_matches('\u{feff}').trim_start();
    let Some(rest) = content.strip_prefix(DELIMITER) else {
        return Ok(None);
    };
    let rest = rest.trim_start_matches([' ', '\t']);
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return Ok(None);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return Ok(Some((&rest[..offset], &rest[offset + line.len()..])));
        }
        offset += line.len();
    }

    Err(Error::InvalidInput(
        "front matter missing closing delimiter".to_string(),
    ))
}

/// Collects `## Heading` sections into trimmed text keyed by heading.
fn sections(body: &str) -> HashMap<String, String> {
    let mut sections = HashMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some((name, lines)) = current.take() {
                sections.insert(name, lines.join("\n").trim().to_string());
            }
            current = Some((heading.trim().to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((name, lines)) = current {
        sections.insert(name, lines.join("\n").trim().to_string());
    }

    sections
}

/// Bullet items of a section, one criterion per line.
fn bullets(text: &str) -> Vec<&str> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix("- ").unwrap_or(line).trim()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn slugify(category: &str) -> String {
    let slug: String = category
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    slug.trim_matches('-').to_string()
}

/// Parses a markdown technique file.
///
/// Returns `Ok(None)` for markdown without front matter, such as a README
/// next to the technique files.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the front matter is malformed.
pub fn parse_technique(content: &str) -> Result<Option<Technique>> {
    let Some((yaml, body)) = split_front_matter(content)? else {
        return Ok(None);
    };
    let front: FrontMatter = serde_yaml_ng::from_str(yaml)
        .map_err(|e| Error::InvalidInput(format!("invalid front matter: {e}")))?;

    let id = match front.category.as_deref().map(slugify) {
        Some(category) if !front.id.contains('/') && !category.is_empty() => {
            TechniqueId::new(format!("{category}/{}", front.id.trim()))
        },
        _ => TechniqueId::new(front.id.trim()),
    };

    let mut sections = sections(body);
    let chip = sections.remove("Chip").unwrap_or_default();
    let title = front
        .name
        .filter(|name| !name.trim().is_empty())
        .or_else(|| (!chip.is_empty()).then_some(chip))
        .unwrap_or_else(|| id.display_name());

    let surface_criteria = bullets(sections.get("Triggers").map_or("", String::as_str)).join("; ");
    let satisfaction_criteria =
        bullets(sections.get("Satisfaction").map_or("", String::as_str)).join("; ");

    Ok(Some(Technique {
        id,
        title,
        icon: front.icon,
        surface_criteria,
        satisfaction_criteria,
        learning_threshold: front
            .learning_threshold
            .filter(|&t| t > 0)
            .unwrap_or(DEFAULT_THRESHOLD),
        detail: sections.remove("Detail").unwrap_or_default(),
    }))
}
