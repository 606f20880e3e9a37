//! Mastery progress service.
//!
//! [`ProgressStore`] is the single owned store for per-technique progress.
//! It is injected into every session that needs it; UI components read it
//! through [`ProgressStore::snapshot`] or watch learned ids through
//! [`ProgressStore::subscribe`].

use crate::models::{ProgressMap, ProgressRecord, TechniqueId};
use crate::storage::ProgressBackend;
use crate::current_timestamp_ms;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::instrument;

/// Durable mapping from technique id to mastery progress.
///
/// The in-memory map is authoritative. Every mutation is written through to
/// the backend; write failures are logged and swallowed so the suggestion
/// feature keeps working on a read-only or full disk.
pub struct ProgressStore {
    progress: Mutex<ProgressMap>,
    backend: Arc<dyn ProgressBackend>,
    learned_tx: watch::Sender<Vec<TechniqueId>>,
}

impl ProgressStore {
    /// Opens a store over the given backend.
    ///
    /// An unreadable document yields an empty store.
    #[must_use]
    pub fn open(backend: Arc<dyn ProgressBackend>) -> Self {
        let progress = match backend.load() {
            Ok(progress) => progress,
            Err(e) => {
                tracing::warn!(
                    backend = backend.name(),
                    error = %e,
                    "Failed to load progress, starting empty"
                );
                metrics::counter!("progress_load_failures_total").increment(1);
                ProgressMap::new()
            },
        };
        tracing::debug!(
            backend = backend.name(),
            records = progress.len(),
            "Opened progress store"
        );
        let (learned_tx, _) = watch::channel(progress.learned_ids());
        Self {
            progress: Mutex::new(progress),
            backend,
            learned_tx,
        }
    }

    /// Opens an isolated in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open(Arc::new(crate::storage::MemoryBackend::new()))
    }

    /// Records one satisfaction of a technique.
    ///
    /// Creates the record if absent, increments the count, and marks the
    /// technique learned once the count meets `threshold`. This is not
    /// idempotent; callers guard against double application.
    #[instrument(skip(self), fields(technique_id = %technique_id))]
    pub fn record_satisfaction(&self, technique_id: &TechniqueId, threshold: u32) -> ProgressRecord {
        let now = current_timestamp_ms();
        let mut progress = self.lock();

        let record = if let Some(record) = progress.get_mut(technique_id) {
            let was_learned = record.learned;
            record.record_satisfaction(threshold, now);
            if record.learned && !was_learned {
                tracing::info!(
                    count = record.satisfaction_count,
                    threshold,
                    "Technique learned"
                );
            }
            record.clone()
        } else {
            let record = ProgressRecord::first_satisfaction(technique_id.clone(), threshold, now);
            progress.insert(record.clone());
            record
        };

        metrics::counter!("technique_satisfactions_total").increment(1);
        self.persist(&progress);
        record
    }

    /// Returns the ids of all learned techniques, sorted.
    #[must_use]
    pub fn learned_ids(&self) -> Vec<TechniqueId> {
        self.lock().learned_ids()
    }

    /// Returns true if the technique is learned.
    #[must_use]
    pub fn is_learned(&self, technique_id: &TechniqueId) -> bool {
        self.lock().get(technique_id).is_some_and(|r| r.learned)
    }

    /// Returns the record for a technique.
    #[must_use]
    pub fn get(&self, technique_id: &TechniqueId) -> Option<ProgressRecord> {
        self.lock().get(technique_id).cloned()
    }

    /// Returns a copy of all records.
    #[must_use]
    pub fn snapshot(&self) -> ProgressMap {
        self.lock().clone()
    }

    /// Subscribes to the learned technique ids.
    ///
    /// The receiver sees a new value whenever the learned set changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<TechniqueId>> {
        self.learned_tx.subscribe()
    }

    /// Deletes the record of one technique. Debugging utility.
    ///
    /// Returns true if a record was removed.
    #[instrument(skip(self), fields(technique_id = %technique_id))]
    pub fn reset_technique(&self, technique_id: &TechniqueId) -> bool {
        let mut progress = self.lock();
        let removed = progress.remove(technique_id).is_some();
        if removed {
            self.persist(&progress);
        }
        removed
    }

    /// Deletes all progress. Debugging utility.
    #[instrument(skip(self))]
    pub fn reset_all(&self) {
        let mut progress = self.lock();
        *progress = ProgressMap::new();
        if let Err(e) = self.backend.clear() {
            tracing::warn!(backend = self.backend.name(), error = %e, "Failed to clear progress");
        }
        self.publish(&progress);
    }

    fn persist(&self, progress: &ProgressMap) {
        if let Err(e) = self.backend.save(progress) {
            tracing::warn!(
                backend = self.backend.name(),
                error = %e,
                "Failed to persist progress, keeping in-memory state"
            );
            metrics::counter!("progress_save_failures_total").increment(1);
        }
        self.publish(progress);
    }

    fn publish(&self, progress: &ProgressMap) {
        let learned = progress.learned_ids();
        self.learned_tx.send_if_modified(|current| {
            if *current == learned {
                false
            } else {
                *current = learned;
                true
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, ProgressMap> {
        self.progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore")
            .field("backend", &self.backend.name())
            .field("records", &self.lock().len())
            .finish_non_exhaustive()
    }
}
