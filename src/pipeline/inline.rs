//! Inline image handling: find `src="cid:..."` references in an HTML body
//! and replace them with base64 data URIs.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::model::attachment::RawAttachment;

/// MIME type assumed for an inline image that declares none.
pub const FALLBACK_IMAGE_TYPE: &str = "image/png";

/// Inert grey "Image unavailable" SVG, used when a data URI cannot be built.
pub const PLACEHOLDER_SRC: &str = "src=\"data:image/svg+xml;base64,PHN2ZyB3aWR0aD0iMjAwIiBoZWlnaHQ9IjEwMCIgeG1sbnM9Imh0dHA6Ly93d3cudzMub3JnLzIwMDAvc3ZnIj48cmVjdCB3aWR0aD0iMTAwJSIgaGVpZ2h0PSIxMDAlIiBmaWxsPSIjZjBmMGYwIi8+PHRleHQgeD0iNTAlIiB5PSI1MCUiIGZvbnQtZmFtaWx5PSJBcmlhbCIgZm9udC1zaXplPSIxNCIgZmlsbD0iIzk5OSIgdGV4dC1hbmNob3I9Im1pZGRsZSIgZHk9Ii4zZW0iPkltYWdlIHVuYXZhaWxhYmxlPC90ZXh0Pjwvc3ZnPg==\" alt=\"Image unavailable\"";

/// One `src="cid:..."` occurrence in an HTML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidRef {
    /// Byte offset of `src`.
    pub start: usize,
    /// Byte offset just past the closing quote.
    pub end: usize,
    /// The referenced Content-ID, as written.
    pub cid: String,
}

/// Every `src="cid:..."` / `src='cid:...'` attribute, in document order.
///
/// `src` and `cid:` match case-insensitively. The value runs to the next
/// quote of either kind and must be non-empty.
pub fn find_cid_refs(html: &str) -> Vec<CidRef> {
    let lower = html.to_ascii_lowercase();
    let bytes = html.as_bytes();
    let mut refs = Vec::new();
    let mut from = 0;

    while let Some(pos) = lower[from..].find("src=") {
        let start = from + pos;
        from = start + 4;

        let quote_at = start + 4;
        if !matches!(bytes.get(quote_at), Some(b'"') | Some(b'\'')) {
            continue;
        }
        let scheme_at = quote_at + 1;
        if !lower[scheme_at..].starts_with("cid:") {
            continue;
        }
        let value_at = scheme_at + 4;
        let Some(len) = html[value_at..].find(['"', '\'']) else {
            break;
        };
        if len == 0 {
            continue;
        }
        let end = value_at + len + 1;
        refs.push(CidRef {
            start,
            end,
            cid: html[value_at..value_at + len].to_string(),
        });
        from = end;
    }
    refs
}

/// The set of Content-IDs referenced from `html`.
pub fn referenced_cids(html: &str) -> HashSet<String> {
    find_cid_refs(html).into_iter().map(|r| r.cid).collect()
}

/// Replace each `src="cid:X"` for which `resolve(X)` returns a replacement.
/// Unresolved references are left untouched.
pub fn rewrite(html: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> String {
    let refs = find_cid_refs(html);
    if refs.is_empty() {
        return html.to_string();
    }

    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for r in refs {
        if let Some(replacement) = resolve(&r.cid) {
            out.push_str(&html[last..r.start]);
            out.push_str(&replacement);
            last = r.end;
        }
    }
    out.push_str(&html[last..]);
    out
}

/// Why a data URI could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InlineError {
    #[error("attachment has no content")]
    Empty,
    #[error("MIME type '{0}' cannot be used in a data URI")]
    BadMimeType(String),
}

/// `src="data:<type>;base64,<content>"` for an inline image.
pub fn data_uri_src(attachment: &RawAttachment) -> Result<String, InlineError> {
    if attachment.content.is_empty() {
        return Err(InlineError::Empty);
    }
    let mime_type = if attachment.mime_declared {
        attachment.mime_type.as_str()
    } else {
        FALLBACK_IMAGE_TYPE
    };
    if !is_safe_mime_type(mime_type) {
        return Err(InlineError::BadMimeType(mime_type.to_string()));
    }
    Ok(format!(
        "src=\"data:{mime_type};base64,{}\"",
        STANDARD.encode(&attachment.content)
    ))
}

/// `type/subtype` made only of characters that cannot break out of an
/// attribute value.
fn is_safe_mime_type(mime_type: &str) -> bool {
    let Some((main, sub)) = mime_type.split_once('/') else {
        return false;
    };
    let token = |s: &str| {
        !s.is_empty()
            && s.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$&-^_.+".contains(&b))
    };
    token(main) && token(sub)
}
