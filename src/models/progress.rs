//! Mastery progress records and their persisted layout.

use super::TechniqueId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cumulative progress for one technique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressRecord {
    /// The technique this record tracks.
    pub technique_id: TechniqueId,
    /// Number of recorded satisfactions. Never decreases.
    pub satisfaction_count: u32,
    /// Whether the learning threshold was reached. Never reverts.
    pub learned: bool,
    /// When the first satisfaction was recorded (Unix epoch milliseconds).
    pub first_seen_at: u64,
    /// When the latest satisfaction was recorded (Unix epoch milliseconds).
    pub last_satisfied_at: Option<u64>,
}

impl ProgressRecord {
    /// Creates the record for a technique's first satisfaction.
    #[must_use]
    pub fn first_satisfaction(technique_id: TechniqueId, threshold: u32, now: u64) -> Self {
        Self {
            technique_id,
            satisfaction_count: 1,
            learned: 1 >= threshold,
            first_seen_at: now,
            last_satisfied_at: Some(now),
        }
    }

    /// Applies one more satisfaction.
    ///
    /// `learned` is sticky: once set it stays set even if the threshold
    /// passed in later is higher than the current count.
    pub fn record_satisfaction(&mut self, threshold: u32, now: u64) {
        self.satisfaction_count = self.satisfaction_count.saturating_add(1);
        self.learned = self.learned || self.satisfaction_count >= threshold;
        self.last_satisfied_at = Some(now);
    }
}

/// On-disk shape of one record; the technique id is the map key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredProgress {
    satisfaction_count: u32,
    learned: bool,
    first_seen_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_satisfied_at: Option<u64>,
}

impl From<&ProgressRecord> for StoredProgress {
    fn from(r: &ProgressRecord) -> Self {
        Self {
            satisfaction_count: r.satisfaction_count,
            learned: r.learned,
            first_seen_at: r.first_seen_at,
            last_satisfied_at: r.last_satisfied_at,
        }
    }
}

impl StoredProgress {
    fn into_record(self, technique_id: TechniqueId) -> ProgressRecord {
        ProgressRecord {
            technique_id,
            satisfaction_count: self.satisfaction_count,
            learned: self.learned,
            first_seen_at: self.first_seen_at,
            last_satisfied_at: self.last_satisfied_at,
        }
    }
}

/// All progress records keyed by technique id.
///
/// Ids that are not (or no longer) in the catalog are kept as-is so that
/// catalog changes never lose progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressMap(BTreeMap<TechniqueId, ProgressRecord>);

impl ProgressMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for a technique.
    #[must_use]
    pub fn get(&self, id: &TechniqueId) -> Option<&ProgressRecord> {
        self.0.get(id)
    }

    /// Returns a mutable record for a technique.
    pub fn get_mut(&mut self, id: &TechniqueId) -> Option<&mut ProgressRecord> {
        self.0.get_mut(id)
    }

    /// Inserts or replaces a record.
    pub fn insert(&mut self, record: ProgressRecord) {
        self.0.insert(record.technique_id.clone(), record);
    }

    /// Removes a record.
    pub fn remove(&mut self, id: &TechniqueId) -> Option<ProgressRecord> {
        self.0.remove(id)
    }

    /// Iterates records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ProgressRecord> {
        self.0.values()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no progress was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids of all learned techniques, sorted.
    #[must_use]
    pub fn learned_ids(&self) -> Vec<TechniqueId> {
        self.0
            .values()
            .filter(|r| r.learned)
            .map(|r| r.technique_id.clone())
            .collect()
    }

    /// Serializes to the persisted JSON layout.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let stored: BTreeMap<&str, StoredProgress> = self
            .0
            .iter()
            .map(|(id, record)| (id.as_str(), StoredProgress::from(record)))
            .collect();
        serde_json::to_string_pretty(&stored).map_err(|e| Error::OperationFailed {
            operation: "serialize_progress".to_string(),
            cause: e.to_string(),
        })
    }

    /// Parses the persisted JSON layout.
    ///
    /// Entries that do not match the record shape are skipped with a
    /// warning; only a document that is not a JSON object is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|e| Error::OperationFailed {
                operation: "parse_progress".to_string(),
                cause: e.to_string(),
            })?;

        let mut map = Self::new();
        for (id, value) in raw {
            match serde_json::from_value::<StoredProgress>(value) {
                Ok(stored) => map.insert(stored.into_record(TechniqueId::new(id))),
                Err(e) => {
                    tracing::warn!(technique_id = %id, error = %e, "Skipping malformed progress entry");
                },
            }
        }
        Ok(map)
    }
}
