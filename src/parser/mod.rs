//! Raw message decoding. Wraps `mail-parser` and normalizes its output.

pub mod mime;

pub use mime::{looks_like_email, parse_message};
