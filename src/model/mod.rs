//! Core data model types for parsed messages, attachments, and their records.

pub mod attachment;
pub mod mail;
