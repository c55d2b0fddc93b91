//! Pending reply-thread lookups.
//!
//! When a vision request quotes an earlier message, the dispatcher parks the
//! request here and asks the platform for the quoted message. The echo of
//! that lookup carries the token; claiming it removes the entry, so each
//! token resumes at most once.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use chatai_core::onebot::Segment;

/// A request waiting for its quoted message.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingReply {
    pub key: String,
    /// Segments of the triggering message, trigger args already stripped.
    pub original_segments: Vec<Segment>,
    pub original_prompt: String,
    pub created_at: Instant,
}

/// Concurrent token → [`PendingReply`] table with optional expiry.
#[derive(Debug, Default)]
pub struct ReplyCorrelator {
    entries: DashMap<String, PendingReply>,
    ttl: Option<Duration>,
}

impl ReplyCorrelator {
    /// `ttl = None` keeps entries until claimed.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// TTL in seconds, 0 = no expiry.
    pub fn with_ttl_secs(secs: u64) -> Self {
        Self::new((secs > 0).then(|| Duration::from_secs(secs)))
    }

    /// Park a request. An existing entry under the same key is replaced.
    pub fn insert(
        &self,
        key: impl Into<String>,
        original_segments: Vec<Segment>,
        original_prompt: impl Into<String>,
    ) {
        self.purge_expired();
        let key = key.into();
        let pending = PendingReply {
            key: key.clone(),
            original_segments,
            original_prompt: original_prompt.into(),
            created_at: Instant::now(),
        };
        if self.entries.insert(key.clone(), pending).is_some() {
            debug!(token = %key, "Replaced pending reply");
        }
    }

    /// Remove and return the entry for `token`, unless missing or expired.
    pub fn claim(&self, token: &str) -> Option<PendingReply> {
        let (_, pending) = self.entries.remove(token)?;
        if self.is_expired(&pending) {
            debug!(token = %token, "Pending reply expired");
            return None;
        }
        Some(pending)
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, pending| !self.is_expired(pending));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "Purged expired pending replies");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    fn is_expired(&self, pending: &PendingReply) -> bool {
        self.ttl
            .is_some_and(|ttl| pending.created_at.elapsed() >= ttl)
    }
}
