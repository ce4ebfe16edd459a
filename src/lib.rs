//! `mimegate` — parse raw email messages and serve their attachments.
//!
//! Attachments extracted from a message are classified by the
//! [`pipeline`], stored with a time-to-live in the [`store`], and handed
//! out over [`http`] either directly or through short-lived download
//! tokens. The [`sweeper`] evicts whatever expires unread.

pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod policy;
pub mod store;
pub mod sweeper;
