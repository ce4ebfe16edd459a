//! Attachment processing: classify every attachment of a parsed message,
//! store the downloadable ones, and embed inline images into the HTML body.
//!
//! Classification order for each attachment:
//! 1. Its Content-ID is referenced as `src="cid:..."` in the HTML → inline.
//! 2. It is larger than the size limit → skipped (oversize).
//! 3. Storing it fails → skipped (error). Sibling attachments carry on.
//! 4. Otherwise → downloadable.

pub mod inline;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::attachment::{Outcome, ProcessedAttachment, RawAttachment};
use crate::model::mail::{EmailAddress, ParsedMail};
use crate::policy::SizePolicy;
use crate::store::AttachmentVault;

/// A parsed message after attachment processing.
#[derive(Debug, Clone)]
pub struct ProcessedMail {
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: String,
    pub date: Option<String>,
    pub message_id: String,
    pub text: String,
    /// HTML body with inline images resolved to data URIs.
    pub html: String,
    /// One entry per input attachment, in input order.
    pub attachments: Vec<ProcessedAttachment>,
}

/// HTML body and attachment outcomes for one message.
#[derive(Debug, Clone)]
pub struct ProcessedParts {
    pub html: String,
    pub attachments: Vec<ProcessedAttachment>,
}

/// Classifies and stores attachments.
#[derive(Debug, Clone)]
pub struct AttachmentPipeline {
    vault: Arc<AttachmentVault>,
    policy: SizePolicy,
}

impl AttachmentPipeline {
    pub fn new(vault: Arc<AttachmentVault>, policy: SizePolicy) -> Self {
        Self { vault, policy }
    }

    /// The size policy in force.
    pub fn policy(&self) -> SizePolicy {
        self.policy
    }

    /// Process a whole parsed message.
    pub async fn process_mail(&self, mail: ParsedMail) -> ProcessedMail {
        let ParsedMail {
            from,
            to,
            cc,
            bcc,
            subject,
            date,
            message_id,
            text,
            html,
            attachments,
        } = mail;

        let parts = self.process(&html, attachments).await;

        ProcessedMail {
            from,
            to,
            cc,
            bcc,
            subject,
            date,
            message_id,
            text,
            html: parts.html,
            attachments: parts.attachments,
        }
    }

    /// Classify `attachments` against `html`, store the eligible ones, and
    /// return the rewritten body with one outcome per attachment.
    pub async fn process(&self, html: &str, attachments: Vec<RawAttachment>) -> ProcessedParts {
        // Later attachments win when two share a Content-ID.
        let by_cid: HashMap<&str, usize> = attachments
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.content_id.as_deref().map(|cid| (cid, i)))
            .collect();

        let inline: HashSet<usize> = inline::referenced_cids(html)
            .iter()
            .filter_map(|cid| by_cid.get(cid.as_str()).copied())
            .collect();

        let html = inline::rewrite(html, |cid| {
            let attachment = &attachments[*by_cid.get(cid)?];
            Some(inline::data_uri_src(attachment).unwrap_or_else(|e| {
                warn!(cid = %cid, error = %e, "Cannot embed inline image, using placeholder");
                inline::PLACEHOLDER_SRC.to_string()
            }))
        });

        let mut processed = Vec::with_capacity(attachments.len());
        for (i, attachment) in attachments.into_iter().enumerate() {
            let outcome = if inline.contains(&i) {
                Outcome::Inline
            } else {
                self.store_or_skip(&attachment).await
            };
            debug!(
                filename = %attachment.filename,
                size = attachment.size(),
                outcome = outcome.label(),
                "Attachment classified"
            );
            processed.push(ProcessedAttachment {
                size: attachment.size(),
                filename: attachment.filename,
                mime_type: attachment.mime_type,
                disposition: attachment.disposition,
                content_id: attachment.content_id,
                outcome,
            });
        }

        ProcessedParts {
            html,
            attachments: processed,
        }
    }

    async fn store_or_skip(&self, attachment: &RawAttachment) -> Outcome {
        let size = attachment.size();
        if self.policy.is_oversize(size) {
            return Outcome::SkippedOversize {
                reason: self.policy.oversize_reason(size),
            };
        }
        match self
            .vault
            .store(&attachment.content, &attachment.filename, &attachment.mime_type)
            .await
        {
            Ok(record) => Outcome::Downloadable { id: record.id },
            Err(e) => {
                warn!(filename = %attachment.filename, error = %e, "Failed to store attachment");
                Outcome::SkippedError {
                    reason: format!("Failed to save attachment: {e}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pipeline(dir: &std::path::Path, max_size: u64) -> AttachmentPipeline {
        let vault = Arc::new(AttachmentVault::new(dir, Duration::from_secs(60)));
        AttachmentPipeline::new(vault, SizePolicy::new(max_size))
    }

    fn attachment(name: &str, size: usize, cid: Option<&str>) -> RawAttachment {
        RawAttachment::normalize(Some(name), Some("image/gif"), vec![7u8; size], cid, None)
    }

    #[tokio::test]
    async fn test_order_and_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), 100);
        let html = r#"<img src="cid:pic">"#;

        let parts = p
            .process(
                html,
                vec![
                    attachment("big.bin", 101, None),
                    attachment("pic.gif", 10, Some("<pic>")),
                    attachment("small.bin", 100, None),
                ],
            )
            .await;

        let names: Vec<&str> = parts.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["big.bin", "pic.gif", "small.bin"]);
        assert!(matches!(parts.attachments[0].outcome, Outcome::SkippedOversize { .. }));
        assert!(parts.attachments[1].is_inline());
        assert!(parts.attachments[2].stored_id().is_some());
        assert_eq!(parts.attachments[0].size, 101);
        assert!(parts.html.starts_with("<img src=\"data:image/gif;base64,"));

        // Only the downloadable attachment reached the disk.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_unreferenced_cid_stays_downloadable() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), 1024);

        let parts = p
            .process("<p>no images</p>", vec![attachment("logo.gif", 5, Some("logo"))])
            .await;
        assert!(parts.attachments[0].stored_id().is_some());
        assert_eq!(parts.html, "<p>no images</p>");
    }

    #[tokio::test]
    async fn test_inline_image_ignores_size_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), 4);

        let parts = p
            .process(r#"<img src="cid:big">"#, vec![attachment("big.gif", 64, Some("big"))])
            .await;
        assert!(parts.attachments[0].is_inline());
    }

    #[tokio::test]
    async fn test_empty_inline_image_gets_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), 1024);

        let parts = p
            .process(r#"<img src="cid:e">"#, vec![attachment("e.gif", 0, Some("e"))])
            .await;
        assert!(parts.attachments[0].is_inline());
        assert_eq!(parts.html, format!("<img {}>", inline::PLACEHOLDER_SRC));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_abort_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the storage directory should be.
        let blocked = tmp.path().join("blocked");
        std::fs::write(&blocked, b"not a directory").unwrap();
        let p = pipeline(&blocked, 1024);

        let parts = p
            .process(
                "",
                vec![attachment("a.bin", 3, None), attachment("b.bin", 2000, None)],
            )
            .await;
        match &parts.attachments[0].outcome {
            Outcome::SkippedError { reason } => assert!(reason.starts_with("Failed to save attachment")),
            other => panic!("expected SkippedError, got {other:?}"),
        }
        assert!(matches!(parts.attachments[1].outcome, Outcome::SkippedOversize { .. }));
    }
}
