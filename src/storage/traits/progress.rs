//! Progress backend trait.

use crate::Result;
use crate::models::ProgressMap;

/// Trait for durable progress storage.
///
/// A backend stores the whole progress document at once; the
/// [`ProgressStore`](crate::services::ProgressStore) is the only caller and
/// writes after every mutation.
pub trait ProgressBackend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Loads the stored progress. A missing document is an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or parsed.
    fn load(&self) -> Result<ProgressMap>;

    /// Replaces the stored progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    fn save(&self, progress: &ProgressMap) -> Result<()>;

    /// Deletes all stored progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be removed.
    fn clear(&self) -> Result<()> {
        self.save(&ProgressMap::new())
    }
}
