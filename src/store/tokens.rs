//! Short-lived download tokens.
//!
//! A token names one attachment and carries its own clock. It does not keep
//! the attachment alive: whoever redeems a token must still check the
//! attachment's liveness in the metadata index.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

/// What a token grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub attachment_id: String,
    pub created_at: Instant,
}

impl TokenGrant {
    fn is_expired_at(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Token → grant map guarded by its own mutex.
#[derive(Debug)]
pub struct TokenRegistry {
    ttl: Duration,
    single_use: bool,
    grants: Mutex<HashMap<String, TokenGrant>>,
}

impl TokenRegistry {
    /// Empty registry issuing tokens valid for `ttl`, redeemable any number
    /// of times within that window.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            single_use: false,
            grants: Mutex::new(HashMap::new()),
        }
    }

    /// Consume tokens on their first successful redemption.
    pub fn with_single_use(mut self, single_use: bool) -> Self {
        self.single_use = single_use;
        self
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token for `attachment_id`.
    ///
    /// The caller must already have confirmed the attachment is live.
    pub fn issue(&self, attachment_id: &str) -> String {
        self.issue_at(attachment_id, Instant::now())
    }

    /// Issue a token whose clock starts at `now`.
    pub fn issue_at(&self, attachment_id: &str, now: Instant) -> String {
        let token = Uuid::new_v4().hyphenated().to_string();
        self.grants.lock().insert(
            token.clone(),
            TokenGrant {
                attachment_id: attachment_id.to_string(),
                created_at: now,
            },
        );
        token
    }

    /// Resolve `token` to its attachment identifier, if still valid.
    pub fn redeem(&self, token: &str) -> Option<String> {
        self.redeem_at(token, Instant::now())
    }

    /// Resolve `token` as of `now`. Stale tokens are removed on sight.
    pub fn redeem_at(&self, token: &str, now: Instant) -> Option<String> {
        let mut grants = self.grants.lock();
        let expired = grants.get(token)?.is_expired_at(self.ttl, now);
        if expired {
            grants.remove(token);
            return None;
        }
        if self.single_use {
            grants.remove(token).map(|g| g.attachment_id)
        } else {
            grants.get(token).map(|g| g.attachment_id.clone())
        }
    }

    /// Remove every token expired at the current time.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Remove every token expired at `now`. Returns how many were removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut grants = self.grants.lock();
        let before = grants.len();
        grants.retain(|_, grant| !grant.is_expired_at(self.ttl, now));
        before - grants.len()
    }

    /// Number of tokens currently held.
    pub fn len(&self) -> usize {
        self.grants.lock().len()
    }

    /// `true` if no tokens are held.
    pub fn is_empty(&self) -> bool {
        self.grants.lock().is_empty()
    }
}
