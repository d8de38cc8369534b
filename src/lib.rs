//! # chatsync
//!
//! Real-time chat synchronization core for the social client.
//!
//! ARCHITECTURE
//! ============
//! `ChatSync` owns the session's chat list, unread chat notifications and
//! "new chat" markers, and bridges a publish/subscribe transport into that
//! state. Its collaborators sit behind traits so the core can run against
//! the live backend or against in-memory doubles:
//!
//! - [`transport::TransportChannel`]: topic subscriptions and publishing
//!   (STOMP over WebSocket in production, see [`transport::websocket`]).
//! - [`api::ChatCreationService`]: remote chat creation (HTTP).
//! - [`cache::PagedMessageStore`]: paginated message history cache.
//!
//! DATA FLOW
//! =========
//! Inbound chat messages arrive on `/topic/chat/{id}`, are merged into the
//! first page of the cached history, promote their chat to the front of the
//! list and, when sent by someone else, land in the notification feed.
//! Every change is announced on the [`events::SyncEvent`] feed.

pub mod api;
pub mod cache;
pub mod chats;
pub mod config;
pub mod error;
pub mod events;
pub mod markers;
pub mod notifications;
pub mod subscriptions;
pub mod sync;
pub mod transport;
pub mod types;

pub use api::{ChatCreationService, HttpApi};
pub use cache::{CacheKey, InMemoryMessageStore, MessagePage, MessagePages, PagedMessageStore};
pub use config::SyncConfig;
pub use error::{ApiError, ErrorCode, SyncError, TransportError};
pub use events::SyncEvent;
pub use sync::ChatSync;
pub use transport::websocket::{StompOptions, StompTransport};
pub use transport::{MessageHandler, TransportChannel};
pub use types::{Chat, ChatId, Message, MessageKind, Notification, SessionUser, UserId};
