//! Parsed message types.

use serde::{Deserialize, Serialize};

use super::attachment::RawAttachment;

/// A mailbox as reported to API callers.
///
/// `name` falls back to the address when the header carries no display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub name: String,
    pub address: String,
}

impl EmailAddress {
    /// Build from optional header parts.
    pub fn new(name: Option<&str>, address: Option<&str>) -> Self {
        let address = address.map(str::trim).unwrap_or_default().to_string();
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| address.clone());
        Self { name, address }
    }
}

/// The structured result of decoding one raw message.
///
/// Header fields are already normalized: absent strings are empty, absent
/// address lists are empty, and the date is pre-formatted.
#[derive(Debug, Clone, Default)]
pub struct ParsedMail {
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: String,
    /// `yyyy-MM-dd HH:mm:ss` in UTC+8, if the message had a valid date.
    pub date: Option<String>,
    pub message_id: String,
    pub text: String,
    pub html: String,
    pub attachments: Vec<RawAttachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_falls_back_to_address() {
        let addr = EmailAddress::new(None, Some("bob@example.com"));
        assert_eq!(addr.name, "bob@example.com");
        assert_eq!(addr.address, "bob@example.com");
    }

    #[test]
    fn test_display_name_kept() {
        let addr = EmailAddress::new(Some(" Bob "), Some("bob@example.com"));
        assert_eq!(addr.name, "Bob");
    }

    #[test]
    fn test_empty_address() {
        assert_eq!(EmailAddress::new(None, None), EmailAddress::default());
    }
}
