//! Attachment storage: blobs on disk, metadata and tokens in memory.
//!
//! [`AttachmentVault`] pairs the [`ContentStore`] with the [`MetadataIndex`]
//! and is the only way the rest of the crate reads or writes attachments.
//! Every read goes through [`AttachmentVault::lookup`], so the expiry rule
//! lives in exactly one place.

pub mod content;
pub mod metadata;
pub mod tokens;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::attachment::AttachmentRecord;

pub use self::content::{ContentStore, StoredBlob};
pub use self::metadata::{Liveness, MetadataIndex};
pub use self::tokens::{TokenGrant, TokenRegistry};

/// A live attachment together with its bytes.
#[derive(Debug, Clone)]
pub struct FetchedAttachment {
    pub record: AttachmentRecord,
    pub content: Vec<u8>,
}

/// Blob store plus metadata index.
#[derive(Debug)]
pub struct AttachmentVault {
    content: ContentStore,
    index: MetadataIndex,
}

impl AttachmentVault {
    /// Vault writing into `dir`, keeping attachments for `ttl`.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            content: ContentStore::new(dir),
            index: MetadataIndex::new(ttl),
        }
    }

    /// The underlying metadata index.
    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    /// Attachment lifetime.
    pub fn ttl(&self) -> Duration {
        self.index.ttl()
    }

    /// Persist `bytes` and register its metadata.
    ///
    /// `filename` and `mime_type` are recorded only; the storage key is a
    /// fresh random identifier.
    pub async fn store(
        &self,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> Result<AttachmentRecord> {
        let StoredBlob { id, path } = self.content.persist(bytes).await?;
        let record = AttachmentRecord {
            id,
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
            path,
            created_at: Instant::now(),
            stored_at: Utc::now(),
        };
        self.index.register(record.clone());
        Ok(record)
    }

    /// Metadata for a live attachment, without reading its content.
    ///
    /// An expired record is evicted (entry and blob) before `None` is
    /// returned, so an expired attachment is indistinguishable from one
    /// that never existed.
    pub async fn lookup(&self, id: &str) -> Option<AttachmentRecord> {
        match self.index.check(id) {
            Liveness::Live(record) => Some(record),
            Liveness::Expired(record) => {
                debug!(attachment_id = %record.id, "Attachment expired on read");
                self.delete_blob(&record.id).await;
                None
            }
            Liveness::Unknown => None,
        }
    }

    /// Metadata and bytes for a live attachment.
    ///
    /// A record whose blob has vanished, or no longer holds exactly
    /// `record.size` bytes, is dropped and reported as absent. Other I/O
    /// failures are returned as errors.
    pub async fn fetch(&self, id: &str) -> Result<Option<FetchedAttachment>> {
        let Some(record) = self.lookup(id).await else {
            return Ok(None);
        };
        match self.content.fetch(&record.id).await? {
            Some(content) if content.len() as u64 == record.size => {
                Ok(Some(FetchedAttachment { record, content }))
            }
            Some(content) => {
                warn!(
                    attachment_id = %record.id,
                    expected = record.size,
                    actual = content.len(),
                    "Blob size does not match record, dropping it"
                );
                self.index.evict(&record.id);
                self.delete_blob(&record.id).await;
                Ok(None)
            }
            None => {
                warn!(attachment_id = %record.id, "Blob missing for live record, dropping it");
                self.index.evict(&record.id);
                Ok(None)
            }
        }
    }

    /// Remove an attachment now, whatever its age. Returns `true` if it existed.
    pub async fn remove(&self, id: &str) -> bool {
        match self.index.evict(id) {
            Some(record) => {
                self.delete_blob(&record.id).await;
                true
            }
            None => false,
        }
    }

    /// Evict every expired attachment. Returns how many were removed.
    ///
    /// Each entry leaves the index before its blob is deleted, so readers
    /// never find a record without content.
    pub async fn sweep_expired(&self) -> usize {
        let expired = self.index.drain_expired_at(Instant::now());
        for record in &expired {
            self.delete_blob(&record.id).await;
        }
        expired.len()
    }

    /// Delete blobs in the storage directory that no record refers to.
    pub async fn purge_orphans(&self) -> Result<usize> {
        self.content.purge_orphans(&self.index.ids()).await
    }

    async fn delete_blob(&self, id: &str) {
        if let Err(e) = self.content.delete(id).await {
            warn!(attachment_id = %id, error = %e, "Failed to delete attachment blob");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_then_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = AttachmentVault::new(tmp.path(), Duration::from_secs(60));

        let record = vault.store(b"payload", "a.txt", "text/plain").await.unwrap();
        assert_eq!(record.size, 7);

        let fetched = vault.fetch(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, b"payload");
        assert_eq!(fetched.record, record);
    }

    #[tokio::test]
    async fn test_expired_lookup_removes_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = AttachmentVault::new(tmp.path(), Duration::from_millis(20));

        let record = vault.store(b"short-lived", "a.bin", "application/octet-stream").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(vault.lookup(&record.id).await.is_none());
        assert!(!record.path.exists());
        assert!(vault.index().is_empty());
    }

    #[tokio::test]
    async fn test_missing_blob_drops_record() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = AttachmentVault::new(tmp.path(), Duration::from_secs(60));

        let record = vault.store(b"gone", "a.bin", "application/octet-stream").await.unwrap();
        std::fs::remove_file(&record.path).unwrap();

        assert!(vault.fetch(&record.id).await.unwrap().is_none());
        assert!(vault.lookup(&record.id).await.is_none());
    }

    #[tokio::test]
    async fn test_resized_blob_drops_record() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = AttachmentVault::new(tmp.path(), Duration::from_secs(60));

        let record = vault.store(b"hello world", "a.txt", "text/plain").await.unwrap();
        std::fs::write(&record.path, b"abc").unwrap();

        assert!(vault.fetch(&record.id).await.unwrap().is_none());
        assert!(vault.lookup(&record.id).await.is_none());
        assert!(!record.path.exists());
    }

    #[tokio::test]
    async fn test_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = AttachmentVault::new(tmp.path(), Duration::from_secs(60));
        let record = vault.store(b"x", "x", "text/plain").await.unwrap();

        assert!(vault.remove(&record.id).await);
        assert!(!vault.remove(&record.id).await);
        assert!(!record.path.exists());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = AttachmentVault::new(tmp.path(), Duration::from_millis(20));
        let a = vault.store(b"a", "a", "text/plain").await.unwrap();
        let b = vault.store(b"b", "b", "text/plain").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(vault.sweep_expired().await, 2);
        assert!(!a.path.exists());
        assert!(!b.path.exists());
        assert_eq!(vault.sweep_expired().await, 0);
    }
}
