use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const DEFAULT_STAGED_FILE_NAME: &str = "pickup_report.xlsx";

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("reset scratch directory {}: {source}", .path.display())]
    Reset {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("write staged file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("delete staged file {}: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Scratch directory holding the single attachment being processed.
#[derive(Debug, Clone)]
pub struct StagingStore {
    dir: PathBuf,
    file_name: String,
}

impl StagingStore {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn staged_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Deletes the whole scratch tree and recreates it empty. Anything left
    /// behind by a crashed run is destroyed here.
    pub fn reset(&self) -> Result<(), StagingError> {
        let reset_error = |source| StagingError::Reset {
            path: self.dir.clone(),
            source,
        };

        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(dir = %self.dir.display(), "removed previous scratch directory"),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => return Err(reset_error(error)),
        }

        std::fs::create_dir_all(&self.dir).map_err(reset_error)
    }

    pub fn write(&self, bytes: &[u8]) -> Result<PathBuf, StagingError> {
        let path = self.staged_path();
        std::fs::write(&path, bytes).map_err(|source| StagingError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "staged attachment");
        Ok(path)
    }

    pub fn cleanup(&self, path: &Path) -> Result<(), StagingError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StagingError::Cleanup {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
