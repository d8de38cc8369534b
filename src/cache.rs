//! Paginated message cache and the inbound-message merge.
//!
//! DESIGN
//! ======
//! History is fetched page by page with the first page holding the newest
//! messages. A live message only ever lands at the head of page one;
//! older pages are left exactly as fetched so pagination cursors stay valid.
//! A chat whose history was never loaded has no entry and the merge is a
//! no-op, so the next history fetch returns the message from the server.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, Message};

/// Cache scope for chat message history.
pub const MESSAGES_SCOPE: &str = "messages";

/// Key into the paged message store: `(chat id, scope)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub chat_id: ChatId,
    pub scope: &'static str,
}

impl CacheKey {
    /// Key of a chat's message history.
    #[must_use]
    pub fn messages(chat_id: &str) -> Self {
        Self { chat_id: chat_id.to_owned(), scope: MESSAGES_SCOPE }
    }
}

/// One page of message history, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub content: Vec<Message>,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub last: bool,
}

/// All loaded pages of a chat's history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePages {
    pub pages: Vec<MessagePage>,
}

impl MessagePages {
    /// New pages value with `message` prepended to the first page's content.
    ///
    /// Returns `None` when there is no first page to merge into.
    #[must_use]
    pub fn with_incoming(&self, message: &Message) -> Option<Self> {
        let (first, rest) = self.pages.split_first()?;
        let mut content = Vec::with_capacity(first.content.len() + 1);
        content.push(message.clone());
        content.extend(first.content.iter().cloned());

        let mut pages = Vec::with_capacity(self.pages.len());
        pages.push(MessagePage { content, number: first.number, last: first.last });
        pages.extend(rest.iter().cloned());
        Some(Self { pages })
    }
}

/// Externally owned cache of paginated message lists.
pub trait PagedMessageStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<MessagePages>;

    fn set(&self, key: CacheKey, pages: MessagePages);
}

/// Merge an inbound message into the cached history of its chat.
///
/// Returns `true` when the cache entry existed and was updated.
pub fn merge_incoming(store: &dyn PagedMessageStore, chat_id: &str, message: &Message) -> bool {
    let key = CacheKey::messages(chat_id);
    let Some(merged) = store.get(&key).and_then(|pages| pages.with_incoming(message)) else {
        return false;
    };
    store.set(key, merged);
    true
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Mutex-guarded map implementation of [`PagedMessageStore`].
#[derive(Default)]
pub struct InMemoryMessageStore {
    entries: Mutex<HashMap<CacheKey, MessagePages>>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PagedMessageStore for InMemoryMessageStore {
    fn get(&self, key: &CacheKey) -> Option<MessagePages> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: CacheKey, pages: MessagePages) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, pages);
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
