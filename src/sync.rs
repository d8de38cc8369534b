//! Chat synchronization core.
//!
//! DESIGN
//! ======
//! `ChatSync` is a cloneable handle over one session's state. All mutation
//! happens under a short `std::sync::Mutex` that is never held across an
//! `.await` or a call into the transport, so each inbound message is applied
//! atomically in delivery order.
//!
//! Transport handlers hold a `Weak` reference to the core. Dropping the last
//! `ChatSync` handle turns any late deliveries into no-ops.
//!
//! LIFECYCLE
//! =========
//! 1. `initialize_for_user` loads chats and unread chat notifications.
//! 2. `connect_subscriptions` subscribes the user topic and every chat topic
//!    once the transport is connected.
//! 3. Inbound chat messages merge into the paged cache, promote their chat to
//!    the front of the list and feed the notification list.
//! 4. `on_user_changed` tears the session down (all `chat-*` and `user-*`
//!    subscriptions) before loading the next user.
//!
//! Chat creations in flight carry the session generation they started in;
//! a creation that completes after a user change is returned to its caller
//! but not registered in the new session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ChatCreationService;
use crate::cache::{PagedMessageStore, merge_incoming};
use crate::chats::{find_existing, insert_front_if_absent, normalize_targets, participant_key, promote_with_latest};
use crate::config::DEFAULT_NEW_CHAT_TTL_SECS;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::markers::NewChatMarkers;
use crate::notifications::ChatNotifications;
use crate::subscriptions::{
    SubscriptionRegistry, chat_send_destination, chat_subscription_id, chat_topic, user_subscription_id, user_topic,
};
use crate::transport::{MessageHandler, TransportChannel};
use crate::types::{Chat, ChatId, Message, Notification, SessionUser, UserId};

const EVENT_CHANNEL_CAPACITY: usize = 256;

type SharedCreation = Shared<BoxFuture<'static, Result<Chat, SyncError>>>;

/// In-flight creations keyed by session generation and sorted participants.
type InFlight = HashMap<(u64, Vec<UserId>), SharedCreation>;

// =============================================================================
// STATE
// =============================================================================

struct SyncState {
    user: Option<SessionUser>,
    chats: Vec<Chat>,
    active_chat: Option<ChatId>,
    notifications: ChatNotifications,
    markers: NewChatMarkers,
    subscriptions: SubscriptionRegistry,
    marker_timer: Option<JoinHandle<()>>,
    /// Bumped on every teardown.
    generation: u64,
}

impl SyncState {
    fn new(new_chat_ttl: Duration) -> Self {
        Self {
            user: None,
            chats: Vec::new(),
            active_chat: None,
            notifications: ChatNotifications::default(),
            markers: NewChatMarkers::new(new_chat_ttl),
            subscriptions: SubscriptionRegistry::new(),
            marker_timer: None,
            generation: 0,
        }
    }

    fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

struct Inner {
    transport: Arc<dyn TransportChannel>,
    creator: Arc<dyn ChatCreationService>,
    store: Arc<dyn PagedMessageStore>,
    state: Mutex<SyncState>,
    in_flight: Mutex<InFlight>,
    events: broadcast::Sender<SyncEvent>,
}

// =============================================================================
// CHAT SYNC
// =============================================================================

/// Session-scoped view of the signed-in user's chats, kept in sync with the
/// realtime broker.
#[derive(Clone)]
pub struct ChatSync {
    inner: Arc<Inner>,
}

impl ChatSync {
    /// Core with the default one-hour "new chat" marker lifetime.
    #[must_use]
    pub fn new(
        transport: Arc<dyn TransportChannel>,
        creator: Arc<dyn ChatCreationService>,
        store: Arc<dyn PagedMessageStore>,
    ) -> Self {
        Self::with_new_chat_ttl(transport, creator, store, Duration::from_secs(DEFAULT_NEW_CHAT_TTL_SECS))
    }

    #[must_use]
    pub fn with_new_chat_ttl(
        transport: Arc<dyn TransportChannel>,
        creator: Arc<dyn ChatCreationService>,
        store: Arc<dyn PagedMessageStore>,
        new_chat_ttl: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                creator,
                store,
                state: Mutex::new(SyncState::new(new_chat_ttl)),
                in_flight: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Subscribe to state change events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Load `user`'s chats and unread chat notifications.
    ///
    /// Subscriptions are untouched, so running this again for the same user
    /// never duplicates them.
    pub fn initialize_for_user(&self, user: &SessionUser) {
        {
            let mut state = self.inner.lock();
            state.chats.clone_from(&user.chats);
            state.notifications = ChatNotifications::seeded(&user.notifications);
            state.user = Some(user.clone());
        }
        info!(user_id = %user.id, chats = user.chats.len(), "session initialized");
        self.inner.emit(SyncEvent::ChatsChanged);
    }

    /// Subscribe the per-user topic and every chat topic of `user`.
    ///
    /// Already-active subscriptions are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] when the transport is down, or the
    /// first transport error raised while subscribing.
    pub fn connect_subscriptions(&self, user: &SessionUser) -> Result<(), SyncError> {
        if !self.inner.transport.is_connected() {
            warn!(user_id = %user.id, "cannot connect subscriptions: transport is down");
            return Err(SyncError::NotConnected);
        }
        self.inner.subscribe_user(&user.id)?;
        self.subscribe_to_chat(user.chats.iter().map(|c| c.id.as_str()))
    }

    /// Subscribe to one or more chat topics. Active ids are skipped.
    ///
    /// Every id is attempted; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the first transport error raised while subscribing.
    pub fn subscribe_to_chat<I, S>(&self, chat_ids: I) -> Result<(), SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut first_error = None;
        for raw in chat_ids {
            let chat_id = raw.as_ref().trim();
            if chat_id.is_empty() {
                continue;
            }
            if let Err(e) = self.inner.subscribe_chat(chat_id, None) {
                warn!(%chat_id, error = %e, "chat subscription failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Switch sessions from `old` to `new`.
    ///
    /// A different (or absent) user tears down every subscription and all
    /// session state first. The same user is re-initialized in place.
    ///
    /// # Errors
    ///
    /// Returns the error from subscribing the new user's topics.
    pub fn on_user_changed(&self, old: Option<&SessionUser>, new: Option<&SessionUser>) -> Result<(), SyncError> {
        let same_user = matches!((old, new), (Some(o), Some(n)) if o.id == n.id);
        if !same_user {
            self.teardown();
        }
        let Some(user) = new else {
            return Ok(());
        };
        self.initialize_for_user(user);
        if self.inner.transport.is_connected() {
            self.connect_subscriptions(user)
        } else {
            debug!(user_id = %user.id, "transport down, subscriptions deferred");
            Ok(())
        }
    }

    /// Unsubscribe every chat and user topic and reset all session state.
    pub fn teardown(&self) {
        let ids = {
            let mut state = self.inner.lock();
            let ids = state.subscriptions.drain_session();
            if let Some(timer) = state.marker_timer.take() {
                timer.abort();
            }
            state.user = None;
            state.chats.clear();
            state.active_chat = None;
            state.notifications.clear();
            state.markers.clear();
            state.generation += 1;
            ids
        };
        self.inner.lock_in_flight().clear();

        for id in &ids {
            if let Err(e) = self.inner.transport.unsubscribe(id) {
                warn!(subscription = %id, error = %e, "unsubscribe failed");
            }
        }
        info!(subscriptions = ids.len(), "session torn down");
        self.inner.emit(SyncEvent::SessionCleared);
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Open a chat with `user_ids`, reusing an existing chat with the same
    /// participants.
    ///
    /// Returns `Ok(None)` when no valid target remains after dropping blanks,
    /// duplicates and the current user. Concurrent calls for the same
    /// participant set share one remote request.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Connection`] when the transport is down. No state changes.
    /// - [`SyncError::Creation`] when the remote call fails. No state changes.
    pub async fn create_chat<I, S>(&self, user_ids: I) -> Result<Option<Chat>, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (targets, generation) = {
            let state = self.inner.lock();
            (normalize_targets(user_ids, state.user_id()), state.generation)
        };
        if targets.is_empty() {
            warn!("create chat called without valid participants");
            return Ok(None);
        }
        if !self.inner.transport.is_connected() {
            warn!(participants = targets.len(), "create chat refused: transport is down");
            return Err(SyncError::Connection);
        }

        let existing = find_existing(&self.inner.lock().chats, &targets).cloned();
        if let Some(chat) = existing {
            debug!(chat_id = %chat.id, "reusing existing chat");
            self.set_active_chat(Some(&chat.id));
            return Ok(Some(chat));
        }

        let key = (generation, participant_key(&targets));
        let creation = self
            .inner
            .lock_in_flight()
            .entry(key.clone())
            .or_insert_with(|| self.inner.creation(key, targets))
            .clone();
        creation.await.map(Some)
    }

    /// Publish a message to a chat. Returns once the frame is queued; the
    /// chat topic delivers the stored message back to every participant,
    /// the sender included.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotConnected`] when the transport is down.
    /// - [`SyncError::Transport`] when the publish is refused.
    pub fn send_message(&self, chat_id: &str, body: &str) -> Result<(), SyncError> {
        if !self.inner.transport.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let sender_id = self.current_user_id();
        let payload = serde_json::to_string(&OutgoingMessage { chat_id, sender_id: sender_id.as_deref(), body })
            .map_err(|e| SyncError::Encode(e.to_string()))?;
        self.inner.transport.publish(&chat_send_destination(chat_id), &payload)?;
        debug!(%chat_id, "message published");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Readers
    // -------------------------------------------------------------------------

    /// Chats, most recently active first.
    #[must_use]
    pub fn chats(&self) -> Vec<Chat> {
        self.inner.lock().chats.clone()
    }

    #[must_use]
    pub fn active_chat(&self) -> Option<ChatId> {
        self.inner.lock().active_chat.clone()
    }

    pub fn set_active_chat(&self, chat_id: Option<&str>) {
        let changed = {
            let mut state = self.inner.lock();
            let next = chat_id.map(str::to_owned);
            if state.active_chat == next {
                false
            } else {
                state.active_chat = next;
                true
            }
        };
        if changed {
            self.inner.emit(SyncEvent::ActiveChatChanged(chat_id.map(str::to_owned)));
        }
    }

    /// Chat ids created during this session whose marker has not expired.
    #[must_use]
    pub fn new_chat_ids(&self) -> Vec<ChatId> {
        self.inner.lock().markers.ids_at(Instant::now())
    }

    #[must_use]
    pub fn is_new_chat(&self, chat_id: &str) -> bool {
        self.inner.lock().markers.contains_at(chat_id, Instant::now())
    }

    /// Unread chat notifications, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().notifications.entries().to_vec()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.inner.lock().notifications.len()
    }

    /// Drop the notifications of one chat. Returns how many were removed.
    pub fn dismiss_notifications(&self, chat_id: &str) -> usize {
        self.inner.lock().notifications.dismiss_chat(chat_id)
    }

    pub fn clear_notifications(&self) {
        self.inner.lock().notifications.clear();
    }

    #[must_use]
    pub fn current_user(&self) -> Option<SessionUser> {
        self.inner.lock().user.clone()
    }

    #[must_use]
    pub fn current_user_id(&self) -> Option<UserId> {
        self.inner.lock().user_id().map(str::to_owned)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Active subscription ids, sorted.
    #[must_use]
    pub fn subscription_ids(&self) -> Vec<String> {
        self.inner.lock().subscriptions.ids()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage<'a> {
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_id: Option<&'a str>,
    body: &'a str,
}

// =============================================================================
// INNER
// =============================================================================

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Register `subscription_id` and hand `handler` to the transport.
    /// Returns `false` when the id was already active, or when the session
    /// ended before the transport call returned.
    ///
    /// With `expected` set, nothing is registered unless the session
    /// generation still matches.
    fn subscribe(
        &self,
        subscription_id: &str,
        topic: &str,
        handler: MessageHandler,
        expected: Option<u64>,
    ) -> Result<bool, SyncError> {
        {
            let mut state = self.lock();
            if expected.is_some_and(|g| g != state.generation) {
                debug!(subscription = %subscription_id, "session changed, not subscribing");
                return Ok(false);
            }
            if !state.subscriptions.activate(subscription_id, topic) {
                debug!(subscription = %subscription_id, "already subscribed");
                return Ok(false);
            }
        }
        if let Err(e) = self.transport.subscribe(topic, handler, subscription_id) {
            self.lock().subscriptions.deactivate(subscription_id);
            return Err(e.into());
        }

        // A teardown that drained the id while the transport call ran has
        // already sent its unsubscribe, which found no route.
        let drained = !self.lock().subscriptions.is_active(subscription_id);
        if drained {
            debug!(subscription = %subscription_id, "drained during subscribe, dropping route");
            self.transport.unsubscribe(subscription_id)?;
            return Ok(false);
        }
        debug!(subscription = %subscription_id, %topic, "subscribed");
        Ok(true)
    }

    fn subscribe_chat(self: &Arc<Self>, chat_id: &str, expected: Option<u64>) -> Result<bool, SyncError> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let owned = chat_id.to_owned();
        let handler: MessageHandler = Arc::new(move |payload: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_chat_payload(&owned, payload);
            }
        });
        self.subscribe(&chat_subscription_id(chat_id), &chat_topic(chat_id), handler, expected)
    }

    fn subscribe_user(&self, user_id: &str) -> Result<bool, SyncError> {
        let owned = user_id.to_owned();
        let handler: MessageHandler = Arc::new(move |payload: &str| log_user_payload(&owned, payload));
        self.subscribe(&user_subscription_id(user_id), &user_topic(user_id), handler, None)
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    fn handle_chat_payload(&self, chat_id: &str, payload: &str) {
        match serde_json::from_str::<Message>(payload) {
            Ok(message) => self.apply_incoming(chat_id, message),
            Err(e) => warn!(%chat_id, error = %e, "dropping undecodable chat message"),
        }
    }

    fn apply_incoming(&self, chat_id: &str, message: Message) {
        if message.is_read_receipt() {
            debug!(%chat_id, message_id = %message.id, "read receipt");
            self.emit(SyncEvent::ReadReceipt { chat_id: chat_id.to_owned(), message });
            return;
        }

        let cached = merge_incoming(self.store.as_ref(), chat_id, &message);

        let (promoted, notification) = {
            let mut state = self.lock();
            let promoted = match promote_with_latest(&state.chats, chat_id, &message) {
                Some(chats) => {
                    state.chats = chats;
                    true
                }
                None => false,
            };
            let current = state.user.as_ref().map(|u| u.id.clone());
            let notification = state.notifications.record(&message, current.as_deref());
            (promoted, notification)
        };
        debug!(%chat_id, message_id = %message.id, cached, promoted, "message applied");

        if promoted {
            self.emit(SyncEvent::ChatsChanged);
        }
        if let Some(notification) = notification {
            self.emit(SyncEvent::NotificationAdded(notification));
        }
        self.emit(SyncEvent::MessageReceived { chat_id: chat_id.to_owned(), message });
    }

    // -------------------------------------------------------------------------
    // Creation
    // -------------------------------------------------------------------------

    /// Shared remote creation for one participant set. The future registers
    /// the chat before removing its in-flight entry, so a caller arriving
    /// after completion finds the chat in the list instead.
    fn creation(self: &Arc<Self>, key: (u64, Vec<UserId>), targets: Vec<UserId>) -> SharedCreation {
        let weak = Arc::downgrade(self);
        let creator = Arc::clone(&self.creator);
        async move {
            info!(participants = targets.len(), "creating chat");
            let result = creator
                .create_chat(&targets)
                .await
                .map(|chat| chat.with_latest_message(None))
                .map_err(SyncError::from);
            let Some(inner) = weak.upgrade() else {
                return result;
            };
            match &result {
                Ok(chat) => inner.register_created(chat, key.0),
                Err(e) => warn!(error = %e, "chat creation failed"),
            }
            inner.lock_in_flight().remove(&key);
            result
        }
        .boxed()
        .shared()
    }

    fn register_created(self: &Arc<Self>, chat: &Chat, generation: u64) {
        let inserted = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(chat_id = %chat.id, "session changed during creation, not registering");
                return;
            }
            match insert_front_if_absent(&state.chats, chat.clone()) {
                Some(chats) => {
                    state.chats = chats;
                    true
                }
                None => false,
            }
        };

        if let Err(e) = self.subscribe_chat(&chat.id, Some(generation)) {
            warn!(chat_id = %chat.id, error = %e, "subscribing created chat failed");
        }

        {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.active_chat = Some(chat.id.clone());
            state.markers.insert_at(&chat.id, Instant::now());
            self.restart_marker_timer(&mut state);
        }
        info!(chat_id = %chat.id, inserted, "chat created");

        if inserted {
            self.emit(SyncEvent::ChatsChanged);
        }
        self.emit(SyncEvent::ActiveChatChanged(Some(chat.id.clone())));
        self.emit(SyncEvent::ChatCreated(chat.clone()));
    }

    // -------------------------------------------------------------------------
    // New chat markers
    // -------------------------------------------------------------------------

    /// Replace the marker timer with one firing at the current deadline.
    fn restart_marker_timer(self: &Arc<Self>, state: &mut SyncState) {
        if let Some(timer) = state.marker_timer.take() {
            timer.abort();
        }
        let Some(deadline) = state.markers.deadline() else {
            return;
        };
        let weak = Arc::downgrade(self);
        state.marker_timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire_markers();
            }
        }));
    }

    fn expire_markers(&self) {
        let expired = self.lock().markers.expire_at(Instant::now());
        if expired {
            debug!("new chat markers expired");
            self.emit(SyncEvent::NewChatsExpired);
        }
    }
}

fn log_user_payload(user_id: &str, payload: &str) {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(event) => {
            let kind = event.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown");
            info!(%user_id, %kind, "user event");
        }
        Err(e) => warn!(%user_id, error = %e, "dropping undecodable user event"),
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
