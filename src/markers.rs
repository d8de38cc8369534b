//! "New chat" markers with a single shared expiry.
//!
//! DESIGN
//! ======
//! One deadline covers the whole set. Every insertion pushes the deadline to
//! `now + ttl`, so a burst of new chats expires together one TTL after the
//! last of them. Reads past the deadline see an empty set even before the
//! owning timer has fired.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::ChatId;

#[derive(Debug)]
pub struct NewChatMarkers {
    ttl: Duration,
    ids: BTreeSet<ChatId>,
    deadline: Option<Instant>,
}

impl NewChatMarkers {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, ids: BTreeSet::new(), deadline: None }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mark a chat as new and restart the shared expiry from `now`.
    pub fn insert_at(&mut self, chat_id: &str, now: Instant) {
        self.expire_at(now);
        self.ids.insert(chat_id.to_owned());
        self.deadline = Some(now + self.ttl);
    }

    /// Clear the set if its deadline has passed. Returns `true` when
    /// entries were dropped.
    pub fn expire_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                let had_entries = !self.ids.is_empty();
                self.ids.clear();
                had_entries
            }
            _ => false,
        }
    }

    /// Deadline of the current set, if non-empty.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        if self.ids.is_empty() { None } else { self.deadline }
    }

    #[must_use]
    pub fn contains_at(&self, chat_id: &str, now: Instant) -> bool {
        self.is_live_at(now) && self.ids.contains(chat_id)
    }

    /// Marked chat ids, sorted; empty once the deadline has passed.
    #[must_use]
    pub fn ids_at(&self, now: Instant) -> Vec<ChatId> {
        if self.is_live_at(now) { self.ids.iter().cloned().collect() } else { Vec::new() }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.deadline = None;
    }

    fn is_live_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now < d)
    }
}

#[cfg(test)]
#[path = "markers_test.rs"]
mod tests;
