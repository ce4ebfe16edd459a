//! MIME message decoding: header fields, bodies, and attachment extraction.
//!
//! Everything `mail-parser` returns is normalized here into [`ParsedMail`]
//! and [`RawAttachment`], so nothing downstream sees optional decoder fields.

use chrono::{DateTime, FixedOffset, Utc};
use mail_parser::{Address, MessageParser, MimeHeaders, PartType};

use crate::error::{GateError, Result};
use crate::model::attachment::RawAttachment;
use crate::model::mail::{EmailAddress, ParsedMail};

/// How much of the message is inspected by [`looks_like_email`].
const SNIFF_LEN: usize = 1000;

/// Header names whose presence marks a buffer as an RFC 5322 message.
const KNOWN_HEADERS: &[&str] = &[
    "from",
    "to",
    "subject",
    "date",
    "message-id",
    "received",
    "return-path",
    "delivered-to",
];

/// Offset of the reported date from UTC, in seconds (UTC+8).
const DISPLAY_UTC_OFFSET: i32 = 8 * 3600;

/// Cheap pre-check: does the buffer start like an email?
///
/// True when one of a handful of common header names opens a line
/// within the first kilobyte.
pub fn looks_like_email(raw: &[u8]) -> bool {
    if raw.is_empty() {
        return false;
    }
    let head = &raw[..raw.len().min(SNIFF_LEN)];
    let text = String::from_utf8_lossy(head);
    text.lines().any(starts_with_known_header)
}

fn starts_with_known_header(line: &str) -> bool {
    let Some(colon) = line.find(':') else {
        return false;
    };
    let name = line[..colon].to_ascii_lowercase();
    KNOWN_HEADERS.contains(&name.as_str())
}

/// Decode a complete raw message (headers + body).
///
/// Rejects buffers that fail [`looks_like_email`] with
/// [`GateError::InvalidMessage`]; decoder failures become
/// [`GateError::MimeError`].
pub fn parse_message(raw_message: &[u8]) -> Result<ParsedMail> {
    let message_bytes = skip_from_line(raw_message);
    if !looks_like_email(message_bytes) {
        return Err(GateError::InvalidMessage("Invalid email format".into()));
    }

    let msg = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| GateError::MimeError("message could not be decoded".into()))?;

    let from = msg
        .from()
        .map(addresses)
        .and_then(|list| list.into_iter().next())
        .unwrap_or_default();

    Ok(ParsedMail {
        from,
        to: msg.to().map(addresses).unwrap_or_default(),
        cc: msg.cc().map(addresses).unwrap_or_default(),
        bcc: msg.bcc().map(addresses).unwrap_or_default(),
        subject: msg.subject().unwrap_or_default().to_string(),
        date: msg.date().and_then(|d| format_display_date(d.to_timestamp())),
        message_id: msg.message_id().unwrap_or_default().to_string(),
        text: text_body(&msg),
        html: html_body(&msg),
        attachments: list_attachments(&msg),
    })
}

/// The first `text/plain` body as sent. No conversion from HTML.
fn text_body(msg: &mail_parser::Message<'_>) -> String {
    match msg.text_part(0).map(|part| &part.body) {
        Some(PartType::Text(text)) => text.to_string(),
        _ => String::new(),
    }
}

/// The first `text/html` body as sent. No conversion from plain text.
fn html_body(msg: &mail_parser::Message<'_>) -> String {
    match msg.html_part(0).map(|part| &part.body) {
        Some(PartType::Html(html)) => html.to_string(),
        _ => String::new(),
    }
}

/// Flatten an address header (plain list or groups) into mailboxes.
fn addresses(address: &Address<'_>) -> Vec<EmailAddress> {
    let addrs: Vec<&mail_parser::Addr<'_>> = match address {
        Address::List(list) => list.iter().collect(),
        Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
    };
    addrs
        .into_iter()
        .map(|a| EmailAddress::new(a.name.as_deref(), a.address.as_deref()))
        .filter(|a| !a.address.is_empty())
        .collect()
}

/// Render a Unix timestamp as `yyyy-MM-dd HH:mm:ss` in UTC+8.
pub fn format_display_date(timestamp: i64) -> Option<String> {
    let offset = FixedOffset::east_opt(DISPLAY_UTC_OFFSET)?;
    let utc = DateTime::<Utc>::from_timestamp(timestamp, 0)?;
    Some(
        utc.with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    )
}

/// Build normalized attachment descriptors from a parsed message.
fn list_attachments(msg: &mail_parser::Message<'_>) -> Vec<RawAttachment> {
    msg.attachments()
        .map(|part| {
            let content_type = part.content_type().map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            });
            let disposition = part.content_disposition().map(|d| d.ctype());

            RawAttachment::normalize(
                part.attachment_name(),
                content_type.as_deref(),
                part.contents().to_vec(),
                part.content_id(),
                disposition,
            )
        })
        .collect()
}

/// Skip a leading mbox `From ` separator line (and a UTF-8 BOM) if present.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com, \"Carol C\" <carol@example.com>\r\n\
Subject: Hello\r\n\
Date: Mon, 1 Jan 2024 00:00:00 +0000\r\n\
Message-ID: <msg001@example.com>\r\n\
\r\n\
Hi Bob!\r\n";

    #[test]
    fn test_looks_like_email() {
        assert!(looks_like_email(SIMPLE));
        assert!(looks_like_email(b"X-Spam: no\nreceived: by mx\n\nbody"));
        assert!(!looks_like_email(b""));
        assert!(!looks_like_email(b"just some text without headers"));
        assert!(!looks_like_email(b"\x00\x01\x02\x03"));
    }

    #[test]
    fn test_header_must_open_a_line() {
        assert!(!looks_like_email(b"hello Subject: not a header"));
    }

    #[test]
    fn test_parse_simple_message() {
        let mail = parse_message(SIMPLE).unwrap();
        assert_eq!(mail.from.address, "alice@example.com");
        assert_eq!(mail.from.name, "Alice");
        assert_eq!(mail.to.len(), 2);
        assert_eq!(mail.to[0].name, "bob@example.com");
        assert_eq!(mail.to[1].name, "Carol C");
        assert!(mail.cc.is_empty());
        assert_eq!(mail.subject, "Hello");
        assert_eq!(mail.message_id, "msg001@example.com");
        assert_eq!(mail.date.as_deref(), Some("2024-01-01 08:00:00"));
        assert!(mail.text.contains("Hi Bob!"));
        assert!(mail.html.is_empty());
        assert!(mail.attachments.is_empty());
    }

    #[test]
    fn test_rejects_non_email() {
        let err = parse_message(b"not an email at all").unwrap_err();
        assert!(matches!(err, GateError::InvalidMessage(_)));
    }

    #[test]
    fn test_skip_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
        let data = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(data), data);
    }

    #[test]
    fn test_format_display_date() {
        assert_eq!(
            format_display_date(0).as_deref(),
            Some("1970-01-01 08:00:00")
        );
    }

    #[test]
    fn test_attachment_extraction() {
        let raw = b"From: a@example.com\r\n\
To: b@example.com\r\n\
Subject: files\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attached\r\n\
--XX\r\n\
Content-Type: text/csv; name=\"data.csv\"\r\n\
Content-Disposition: attachment; filename=\"data.csv\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
YSxiLGMKMSwyLDMK\r\n\
--XX--\r\n";
        let mail = parse_message(raw).unwrap();
        assert_eq!(mail.attachments.len(), 1);
        let att = &mail.attachments[0];
        assert_eq!(att.filename, "data.csv");
        assert_eq!(att.mime_type, "text/csv");
        assert_eq!(att.disposition, "attachment");
        assert_eq!(att.content, b"a,b,c\n1,2,3\n");
    }
}
