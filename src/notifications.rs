//! Unread chat notification feed, newest first.

use crate::types::{Message, Notification};

#[derive(Debug, Default, Clone)]
pub struct ChatNotifications {
    entries: Vec<Notification>,
}

impl ChatNotifications {
    /// Seed the feed from the user's stored notifications, keeping only
    /// unread chat notifications in their stored order.
    #[must_use]
    pub fn seeded(notifications: &[Notification]) -> Self {
        Self {
            entries: notifications
                .iter()
                .filter(|n| n.is_unread_chat())
                .cloned()
                .collect(),
        }
    }

    /// Record an inbound message unless the current user sent it.
    ///
    /// Returns the new entry when one was added.
    pub fn record(&mut self, message: &Message, current_user: Option<&str>) -> Option<Notification> {
        if current_user == Some(message.sender_id.as_str()) {
            return None;
        }
        let entry = Notification::from_message(message);
        self.entries.insert(0, entry.clone());
        Some(entry)
    }

    #[must_use]
    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the entries belonging to one chat (the user opened it).
    pub fn dismiss_chat(&mut self, chat_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|n| n.chat_id.as_deref() != Some(chat_id));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
#[path = "notifications_test.rs"]
mod tests;
