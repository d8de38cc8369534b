//! Publish/subscribe transport seam.
//!
//! DESIGN
//! ======
//! The core talks to the broker only through [`TransportChannel`]. Calls are
//! synchronous: an implementation queues the outgoing frame and returns, and
//! inbound payloads are handed to the subscription's handler in delivery
//! order. Keeping subscriptions alive across reconnects is the
//! implementation's job, so callers subscribe once per id.

pub mod websocket;

use std::sync::Arc;

use crate::error::TransportError;

/// Callback receiving the raw body of each message on a subscription.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

pub trait TransportChannel: Send + Sync {
    /// Whether a broker session is currently established.
    fn is_connected(&self) -> bool;

    /// Subscribe `handler` to `topic` under `subscription_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription cannot be registered.
    fn subscribe(&self, topic: &str, handler: MessageHandler, subscription_id: &str) -> Result<(), TransportError>;

    /// Drop the subscription registered under `subscription_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the unsubscribe frame cannot be queued.
    fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError>;

    /// Publish `payload` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] without a live session.
    fn publish(&self, destination: &str, payload: &str) -> Result<(), TransportError>;
}
