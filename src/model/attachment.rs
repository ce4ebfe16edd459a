//! Attachment descriptors at each stage of their life.
//!
//! [`RawAttachment`] is what the MIME decoder hands over, already normalized.
//! [`ProcessedAttachment`] is the per-request classification result.
//! [`AttachmentRecord`] is the metadata kept for a stored blob.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// MIME type used when a part carries none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Filename used when a part carries none.
pub const DEFAULT_FILENAME: &str = "unnamed";

/// Disposition used when a part carries none.
pub const DEFAULT_DISPOSITION: &str = "attachment";

/// An attachment as extracted from a message, with every optional field
/// resolved to a concrete value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttachment {
    /// Original filename. Untrusted; never used as a storage key.
    pub filename: String,
    /// MIME type, e.g. `"image/png"`.
    pub mime_type: String,
    /// Whether the part declared `mime_type` itself rather than getting
    /// [`DEFAULT_MIME_TYPE`].
    pub mime_declared: bool,
    /// Decoded content.
    pub content: Vec<u8>,
    /// Content-ID without surrounding angle brackets.
    pub content_id: Option<String>,
    /// `"attachment"` or `"inline"` as declared by the sender.
    pub disposition: String,
}

impl RawAttachment {
    /// Build a descriptor from the loosely-typed fields a decoder produces.
    ///
    /// Blank strings count as absent. Content-IDs lose their angle brackets.
    pub fn normalize(
        filename: Option<&str>,
        mime_type: Option<&str>,
        content: Vec<u8>,
        content_id: Option<&str>,
        disposition: Option<&str>,
    ) -> Self {
        let mime_type = non_blank(mime_type);
        Self {
            filename: non_blank(filename).unwrap_or(DEFAULT_FILENAME).to_string(),
            mime_type: mime_type.unwrap_or(DEFAULT_MIME_TYPE).to_string(),
            mime_declared: mime_type.is_some(),
            content,
            content_id: non_blank(content_id)
                .map(strip_angle_brackets)
                .filter(|cid| !cid.is_empty())
                .map(String::from),
            disposition: non_blank(disposition)
                .unwrap_or(DEFAULT_DISPOSITION)
                .to_ascii_lowercase(),
        }
    }

    /// Measured size of the content in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Remove one leading `<` and one trailing `>` if present.
pub fn strip_angle_brackets(cid: &str) -> &str {
    let cid = cid.trim();
    let cid = cid.strip_prefix('<').unwrap_or(cid);
    cid.strip_suffix('>').unwrap_or(cid)
}

/// How the pipeline dealt with one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Embedded into the HTML body as a data URI. Never stored.
    Inline,
    /// Stored under `id` and available for download.
    Downloadable { id: String },
    /// Larger than the configured limit. Never stored.
    SkippedOversize { reason: String },
    /// Storing it failed.
    SkippedError { reason: String },
}

impl Outcome {
    /// Reason shown to the caller when the attachment is not downloadable.
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Inline => Some(INLINE_SKIP_REASON),
            Self::Downloadable { .. } => None,
            Self::SkippedOversize { reason } | Self::SkippedError { reason } => Some(reason),
        }
    }

    /// Short machine-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Downloadable { .. } => "downloadable",
            Self::SkippedOversize { .. } => "skipped_oversize",
            Self::SkippedError { .. } => "skipped_error",
        }
    }
}

/// Explanation attached to inline images.
pub const INLINE_SKIP_REASON: &str = "Inline image embedded in the HTML body as base64";

/// Per-attachment result of processing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAttachment {
    pub filename: String,
    pub mime_type: String,
    /// Measured size in bytes, reported whatever the outcome.
    pub size: u64,
    pub disposition: String,
    pub content_id: Option<String>,
    pub outcome: Outcome,
}

impl ProcessedAttachment {
    /// `true` for inline images.
    pub fn is_inline(&self) -> bool {
        matches!(self.outcome, Outcome::Inline)
    }

    /// Identifier of the stored blob, if one was written.
    pub fn stored_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Downloadable { id } => Some(id),
            _ => None,
        }
    }
}

/// Metadata for a stored attachment.
///
/// Immutable once created. `size` always equals the length of the blob at
/// `path` while the record is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    /// Random UUID, also the blob's file name.
    pub id: String,
    /// Original filename, as supplied by the sender.
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    /// Location of the blob inside the storage directory.
    pub path: PathBuf,
    /// Monotonic capture used for expiry decisions.
    pub created_at: Instant,
    /// Wall-clock capture, sent as `Last-Modified`.
    pub stored_at: DateTime<Utc>,
}

impl AttachmentRecord {
    /// Whether more than `ttl` has passed between creation and `now`.
    pub fn is_expired_at(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fills_defaults() {
        let att = RawAttachment::normalize(None, Some("  "), vec![1, 2, 3], None, None);
        assert_eq!(att.filename, "unnamed");
        assert_eq!(att.mime_type, "application/octet-stream");
        assert!(!att.mime_declared);
        assert_eq!(att.disposition, "attachment");
        assert_eq!(att.content_id, None);
        assert_eq!(att.size(), 3);
    }

    #[test]
    fn test_normalize_strips_content_id_brackets() {
        let att = RawAttachment::normalize(
            Some("logo.png"),
            Some("image/png"),
            Vec::new(),
            Some("<logo@example.com>"),
            Some("INLINE"),
        );
        assert_eq!(att.content_id.as_deref(), Some("logo@example.com"));
        assert!(att.mime_declared);
        assert_eq!(att.disposition, "inline");
    }

    #[test]
    fn test_empty_brackets_mean_no_content_id() {
        let att = RawAttachment::normalize(None, None, Vec::new(), Some("<>"), None);
        assert_eq!(att.content_id, None);
    }

    #[test]
    fn test_expiry_is_strictly_greater_than_ttl() {
        let created = Instant::now();
        let record = AttachmentRecord {
            id: "id".into(),
            filename: "f".into(),
            mime_type: DEFAULT_MIME_TYPE.into(),
            size: 0,
            path: PathBuf::from("id"),
            created_at: created,
            stored_at: Utc::now(),
        };
        let ttl = Duration::from_secs(60);
        assert!(!record.is_expired_at(ttl, created + ttl));
        assert!(record.is_expired_at(ttl, created + ttl + Duration::from_millis(1)));
    }

    #[test]
    fn test_outcome_reasons() {
        assert!(Outcome::Inline.skip_reason().is_some());
        assert!(Outcome::Downloadable { id: "x".into() }.skip_reason().is_none());
        let oversize = Outcome::SkippedOversize {
            reason: "too big".into(),
        };
        assert_eq!(oversize.skip_reason(), Some("too big"));
        assert_eq!(oversize.label(), "skipped_oversize");
    }
}
