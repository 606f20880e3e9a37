//! Filesystem-based progress backend.
//!
//! Stores the whole progress map as one JSON document (`progress.json`) in
//! the data directory. Writes go to a sibling temp file that is renamed over
//! the document, so a crash mid-write never leaves a truncated file.

use crate::models::ProgressMap;
use crate::storage::traits::ProgressBackend;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum size of the progress document (1MB).
/// Prevents memory exhaustion from a corrupted or hostile file.
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default document name inside the data directory.
pub const PROGRESS_FILE_NAME: &str = "progress.json";

/// Filesystem-based progress backend.
pub struct FilesystemBackend {
    /// Path of the progress document.
    path: PathBuf,
}

impl FilesystemBackend {
    /// Creates a backend storing `progress.json` under `data_dir`.
    ///
    /// The directory is created lazily on first save.
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(PROGRESS_FILE_NAME),
        }
    }

    /// Creates a backend for an explicit document path.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ProgressBackend for FilesystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn load(&self) -> Result<ProgressMap> {
        if !self.path.exists() {
            return Ok(ProgressMap::new());
        }

        let metadata = fs::metadata(&self.path).map_err(|e| Error::OperationFailed {
            operation: "read_progress_metadata".to_string(),
            cause: e.to_string(),
        })?;

        if metadata.len() > MAX_FILE_SIZE {
            return Err(Error::InvalidInput(format!(
                "Progress file exceeds maximum size of {MAX_FILE_SIZE} bytes: {}",
                self.path.display()
            )));
        }

        let json = fs::read_to_string(&self.path).map_err(|e| Error::OperationFailed {
            operation: "read_progress_file".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })?;

        if json.trim().is_empty() {
            return Ok(ProgressMap::new());
        }

        ProgressMap::from_json(&json)
    }

    fn save(&self, progress: &ProgressMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_data_dir".to_string(),
                cause: format!("{}: {e}", parent.display()),
            })?;
        }

        let json = progress.to_json()?;
        let temp = self.temp_path();

        fs::write(&temp, json).map_err(|e| Error::OperationFailed {
            operation: "write_progress_file".to_string(),
            cause: format!("{}: {e}", temp.display()),
        })?;

        fs::rename(&temp, &self.path).map_err(|e| Error::OperationFailed {
            operation: "replace_progress_file".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::OperationFailed {
                operation: "remove_progress_file".to_string(),
                cause: e.to_string(),
            }),
        }
    }
}
