//! Blob storage: one file per attachment identifier in a flat directory.
//!
//! File names are always freshly generated UUIDs. Sender-supplied filenames
//! never reach the filesystem, and identifiers coming back from callers are
//! re-validated as UUIDs before they are joined onto the directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GateError, Result};

/// A blob that has just been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub id: String,
    pub path: PathBuf,
}

/// Directory-backed blob store.
#[derive(Debug, Clone)]
pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the blob for `id`, or `None` if `id` is not a UUID.
    pub fn path_for(&self, id: &str) -> Option<PathBuf> {
        let uuid = Uuid::try_parse(id).ok()?;
        Some(self.dir.join(uuid.hyphenated().to_string()))
    }

    /// Write `bytes` under a fresh random identifier.
    ///
    /// A partially written file is removed before the error is returned.
    pub async fn persist(&self, bytes: &[u8]) -> Result<StoredBlob> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GateError::io(&self.dir, e))?;

        let id = Uuid::new_v4().hyphenated().to_string();
        let path = self.dir.join(&id);

        if let Err(e) = tokio::fs::write(&path, bytes).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(GateError::io(&path, e));
        }

        debug!(id = %id, bytes = bytes.len(), "Blob written");
        Ok(StoredBlob { id, path })
    }

    /// Read the blob for `id`. A missing blob (or a malformed id) is `Ok(None)`.
    pub async fn fetch(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.path_for(id) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GateError::io(&path, e)),
        }
    }

    /// Remove the blob for `id`. Removing a missing blob succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let Some(path) = self.path_for(id) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GateError::io(&path, e)),
        }
    }

    /// Delete every regular file in the directory whose name is not in `keep`.
    ///
    /// Metadata does not survive a restart, so blobs written by an earlier
    /// process can never be served again. Returns the number removed.
    pub async fn purge_orphans(&self, keep: &HashSet<String>) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(GateError::io(&self.dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GateError::io(&self.dir, e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_file || keep.contains(&name) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %name, error = %e, "Failed to remove orphaned blob"),
            }
        }
        Ok(removed)
    }
}
