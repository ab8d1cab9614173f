//! Handing a rendered document to the user as a file.
//!
//! Delivery is scoped: a temporary file is created next to the target,
//! filled, then moved onto the final name in one rename. Whatever happens in
//! between, the temporary is released when [`DownloadSink::deliver`] returns,
//! so no reference to the bytes outlives the download.

use crate::error::BookError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Receives finished documents.
pub trait DownloadSink: Send + Sync {
    /// Save `bytes` under `file_name` and return where they landed.
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, BookError>;
}

/// Saves downloads into one directory, replacing any earlier file of the
/// same name.
#[derive(Debug, Clone)]
pub struct DirectoryDownloads {
    dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectoryDownloads {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, BookError> {
        let target = self.dir.join(file_name);
        let io_err = |source| BookError::Download {
            path: target.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.persist(&target).map_err(|e| io_err(e.error))?;

        info!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }
}
