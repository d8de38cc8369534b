//! Wire and domain types for chats, messages and the session user.
//!
//! All payloads use camelCase JSON field names to match the backend.

use serde::{Deserialize, Serialize};

pub type ChatId = String;
pub type UserId = String;

/// Notification `type` value for chat notifications.
pub const NOTIFICATION_KIND_CHAT: &str = "chat";

// =============================================================================
// MESSAGE
// =============================================================================

/// Message `type` as delivered by the backend.
///
/// Only read receipts change how a message is handled. Other values are
/// visible messages and keep their raw `type` so a cached copy serializes
/// the same as the server's.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    #[default]
    Normal,
    /// Transport-level read receipt. Never shown in the message list.
    MarkAsRead,
    /// Any other backend type, e.g. `image`.
    Other(String),
}

impl MessageKind {
    const MARK_AS_READ: &'static str = "markAsRead";
    const NORMAL: &'static str = "normal";
}

impl From<String> for MessageKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            Self::MARK_AS_READ => Self::MarkAsRead,
            Self::NORMAL => Self::Normal,
            _ => Self::Other(raw),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Normal => MessageKind::NORMAL.to_owned(),
            MessageKind::MarkAsRead => MessageKind::MARK_AS_READ.to_owned(),
            MessageKind::Other(raw) => raw,
        }
    }
}

/// A chat message produced by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    #[serde(default)]
    pub body: String,
    /// ISO-8601 timestamp assigned by the backend.
    #[serde(default)]
    pub created_at: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

impl Message {
    #[must_use]
    pub fn is_read_receipt(&self) -> bool {
        self.kind == MessageKind::MarkAsRead
    }
}

// =============================================================================
// CHAT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub latest_message: Option<Message>,
}

impl Chat {
    #[must_use]
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// Copy of this chat with `latest_message` replaced.
    #[must_use]
    pub fn with_latest_message(&self, message: Option<Message>) -> Self {
        Self { id: self.id.clone(), participants: self.participants.clone(), latest_message: message }
    }
}

// =============================================================================
// NOTIFICATION
// =============================================================================

/// Entry in the user's notification list. Chat notifications carry the
/// message that triggered them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Notification {
    /// Unread chat notification for an inbound message.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            kind: NOTIFICATION_KIND_CHAT.to_owned(),
            read: false,
            chat_id: Some(message.chat_id.clone()),
            message: Some(message.clone()),
            created_at: Some(message.created_at.clone()),
        }
    }

    #[must_use]
    pub fn is_unread_chat(&self) -> bool {
        self.kind == NOTIFICATION_KIND_CHAT && !self.read
    }
}

// =============================================================================
// SESSION USER
// =============================================================================

/// The signed-in user's profile as returned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
