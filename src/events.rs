//! Change notifications published by [`crate::ChatSync`].
//!
//! Readers (UI bindings, the CLI) subscribe to a broadcast feed and re-read
//! whatever state they render. A lagging reader only loses events, never
//! state.

use crate::types::{Chat, ChatId, Message, Notification};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// The chat list was replaced or reordered.
    ChatsChanged,
    /// The UI-selected chat changed.
    ActiveChatChanged(Option<ChatId>),
    /// A visible message arrived on a chat topic.
    MessageReceived { chat_id: ChatId, message: Message },
    /// A read receipt arrived on a chat topic.
    ReadReceipt { chat_id: ChatId, message: Message },
    /// A message from another user entered the notification feed.
    NotificationAdded(Notification),
    /// A chat was created remotely during this session.
    ChatCreated(Chat),
    /// The "new chat" markers expired together.
    NewChatsExpired,
    /// The session was torn down (logout or user switch).
    SessionCleared,
}
