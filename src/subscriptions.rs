//! Topic naming and the subscription registry.
//!
//! DESIGN
//! ======
//! Subscription ids are derived from the topic owner (`chat-{id}`,
//! `user-{id}`) so the same topic always maps to the same id. The registry
//! keeps at most one entry per id; a repeated insert is refused and the
//! caller skips the underlying subscribe.

use std::collections::HashMap;

const CHAT_PREFIX: &str = "chat-";
const USER_PREFIX: &str = "user-";

#[must_use]
pub fn chat_subscription_id(chat_id: &str) -> String {
    format!("{CHAT_PREFIX}{chat_id}")
}

#[must_use]
pub fn user_subscription_id(user_id: &str) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Per-chat message topic.
#[must_use]
pub fn chat_topic(chat_id: &str) -> String {
    format!("/topic/chat/{chat_id}")
}

/// Per-user push topic.
#[must_use]
pub fn user_topic(user_id: &str) -> String {
    format!("/topic/user/{user_id}")
}

/// Destination for publishing a message into a chat.
#[must_use]
pub fn chat_send_destination(chat_id: &str) -> String {
    format!("/app/chat/{chat_id}/send")
}

/// Active subscriptions keyed by subscription id, valued by topic.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    active: HashMap<String, String>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self, subscription_id: &str) -> bool {
        self.active.contains_key(subscription_id)
    }

    /// Record a subscription. Returns `false` (and changes nothing) when the
    /// id is already active.
    pub fn activate(&mut self, subscription_id: &str, topic: &str) -> bool {
        if self.active.contains_key(subscription_id) {
            return false;
        }
        self.active.insert(subscription_id.to_owned(), topic.to_owned());
        true
    }

    pub fn deactivate(&mut self, subscription_id: &str) -> Option<String> {
        self.active.remove(subscription_id)
    }

    /// Remove every chat and user subscription, returning their ids sorted.
    pub fn drain_session(&mut self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .active
            .keys()
            .filter(|id| id.starts_with(CHAT_PREFIX) || id.starts_with(USER_PREFIX))
            .cloned()
            .collect();
        ids.sort();
        for id in &ids {
            self.active.remove(id);
        }
        ids
    }

    /// Active subscription ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
#[path = "subscriptions_test.rs"]
mod tests;
