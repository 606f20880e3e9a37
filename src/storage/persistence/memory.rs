//! In-memory progress backend.

use crate::models::ProgressMap;
use crate::storage::traits::ProgressBackend;
use crate::{Error, Result};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory progress backend for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    progress: Mutex<ProgressMap>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-seeded with progress.
    #[must_use]
    pub fn with_progress(progress: ProgressMap) -> Self {
        Self {
            progress: Mutex::new(progress),
            ..Self::default()
        }
    }

    /// Makes every subsequent save fail, simulating a full disk or quota.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Acquire)
    }

    /// Returns a copy of the stored progress.
    #[must_use]
    pub fn stored(&self) -> ProgressMap {
        self.progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ProgressBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<ProgressMap> {
        Ok(self.stored())
    }

    fn save(&self, progress: &ProgressMap) -> Result<()> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(Error::OperationFailed {
                operation: "save_progress".to_string(),
                cause: "storage quota exceeded".to_string(),
            });
        }
        *self
            .progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = progress.clone();
        self.saves.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
