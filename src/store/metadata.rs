//! In-memory attachment metadata with expiry enforced on every read.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::model::attachment::AttachmentRecord;

/// Result of a liveness-checked lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// The record exists and is within its TTL.
    Live(AttachmentRecord),
    /// The record had expired; it has been removed from the index and
    /// its blob is now the caller's to delete.
    Expired(AttachmentRecord),
    /// No record under that identifier.
    Unknown,
}

/// Identifier → record map guarded by a single mutex.
///
/// The lock is only held for map operations, never across I/O.
#[derive(Debug)]
pub struct MetadataIndex {
    ttl: Duration,
    entries: Mutex<HashMap<String, AttachmentRecord>>,
}

impl MetadataIndex {
    /// Empty index whose records live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Add a record. An identifier is never registered twice.
    pub fn register(&self, record: AttachmentRecord) {
        self.entries.lock().insert(record.id.clone(), record);
    }

    /// Liveness-checked lookup against the current time.
    pub fn check(&self, id: &str) -> Liveness {
        self.check_at(id, Instant::now())
    }

    /// Liveness-checked lookup against `now`.
    ///
    /// An expired record is removed under the same lock that observed it.
    pub fn check_at(&self, id: &str, now: Instant) -> Liveness {
        let mut entries = self.entries.lock();
        let expired = match entries.get(id) {
            None => return Liveness::Unknown,
            Some(record) => record.is_expired_at(self.ttl, now),
        };
        if expired {
            entries.remove(id).map_or(Liveness::Unknown, Liveness::Expired)
        } else {
            entries.get(id).cloned().map_or(Liveness::Unknown, Liveness::Live)
        }
    }

    /// Drop a record regardless of age, returning it if it was present.
    pub fn evict(&self, id: &str) -> Option<AttachmentRecord> {
        self.entries.lock().remove(id)
    }

    /// Remove and return every record expired at `now`.
    pub fn drain_expired_at(&self, now: Instant) -> Vec<AttachmentRecord> {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .values()
            .filter(|r| r.is_expired_at(self.ttl, now))
            .map(|r| r.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| entries.remove(id))
            .collect()
    }

    /// Identifiers currently held, expired or not.
    pub fn ids(&self) -> HashSet<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(id: &str, created_at: Instant) -> AttachmentRecord {
        AttachmentRecord {
            id: id.to_string(),
            filename: format!("{id}.bin"),
            mime_type: "application/octet-stream".into(),
            size: 4,
            path: PathBuf::from(id),
            created_at,
            stored_at: Utc::now(),
        }
    }

    #[test]
    fn test_live_then_expired() {
        let ttl = Duration::from_secs(10);
        let index = MetadataIndex::new(ttl);
        let t0 = Instant::now();
        index.register(record("a", t0));

        assert!(matches!(index.check_at("a", t0 + ttl), Liveness::Live(_)));
        match index.check_at("a", t0 + ttl + Duration::from_millis(1)) {
            Liveness::Expired(r) => assert_eq!(r.id, "a"),
            other => panic!("expected Expired, got {other:?}"),
        }
        // Removed by the expired lookup.
        assert_eq!(index.check_at("a", t0), Liveness::Unknown);
        assert!(index.is_empty());
    }

    #[test]
    fn test_unknown_id() {
        let index = MetadataIndex::new(Duration::from_secs(1));
        assert_eq!(index.check("missing"), Liveness::Unknown);
        assert_eq!(index.evict("missing"), None);
    }

    #[test]
    fn test_drain_only_takes_expired() {
        let ttl = Duration::from_secs(60);
        let index = MetadataIndex::new(ttl);
        let t0 = Instant::now();
        index.register(record("old", t0));
        index.register(record("new", t0 + Duration::from_secs(30)));

        let drained = index.drain_expired_at(t0 + Duration::from_secs(61));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, "old");
        assert_eq!(index.len(), 1);
        assert!(index.ids().contains("new"));
    }

    #[test]
    fn test_evict_returns_record() {
        let index = MetadataIndex::new(Duration::from_secs(60));
        index.register(record("x", Instant::now()));
        assert_eq!(index.evict("x").map(|r| r.id), Some("x".to_string()));
        assert!(index.is_empty());
    }
}
