//! JSON response bodies.

use serde::Serialize;

use crate::model::attachment::ProcessedAttachment;
use crate::model::mail::EmailAddress;
use crate::pipeline::ProcessedMail;

/// `POST /parse` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: String,
    pub date: Option<String>,
    pub message_id: String,
    pub text: String,
    pub html: String,
    pub attachments: Vec<AttachmentView>,
}

impl ParseResponse {
    /// Build the response, resolving stored attachments to URLs with `link`.
    pub fn new(mail: ProcessedMail, link: impl Fn(&str) -> String) -> Self {
        Self {
            from: mail.from,
            to: mail.to,
            cc: mail.cc,
            bcc: mail.bcc,
            subject: mail.subject,
            date: mail.date,
            message_id: mail.message_id,
            text: mail.text,
            html: mail.html,
            attachments: mail
                .attachments
                .into_iter()
                .map(|a| AttachmentView::new(a, &link))
                .collect(),
        }
    }
}

/// One attachment descriptor.
///
/// Downloadable attachments carry `id` and `downloadUrl`; every other
/// outcome carries `skipped: true` and a `skipReason`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub disposition: String,
    pub content_id: Option<String>,
    pub is_inline: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl AttachmentView {
    fn new(attachment: ProcessedAttachment, link: impl Fn(&str) -> String) -> Self {
        let id = attachment.stored_id().map(String::from);
        let skip_reason = attachment.outcome.skip_reason().map(String::from);
        Self {
            is_inline: attachment.is_inline(),
            status: attachment.outcome.label(),
            download_url: id.as_deref().map(link),
            skipped: skip_reason.is_some(),
            skip_reason,
            id,
            filename: attachment.filename,
            mime_type: attachment.mime_type,
            size: attachment.size,
            disposition: attachment.disposition,
            content_id: attachment.content_id,
        }
    }
}

/// `POST /attachments/{id}/link` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub download_url: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}
