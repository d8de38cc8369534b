//! STOMP-over-WebSocket implementation of [`TransportChannel`].
//!
//! LIFECYCLE
//! =========
//! 1. Open the WebSocket, send CONNECT (bearer token in `Authorization`).
//! 2. Wait for CONNECTED, then open a session: every registered
//!    subscription is replayed as a SUBSCRIBE frame.
//! 3. Relay queued outgoing frames and dispatch inbound MESSAGE frames to
//!    the handler named by their `subscription` header.
//! 4. On disconnect, close the session and reconnect with exponential
//!    backoff (doubling up to the configured cap).
//!
//! DESIGN
//! ======
//! Subscriptions and the session's outgoing queue live under one mutex, so
//! a subscribe racing a reconnect produces exactly one SUBSCRIBE frame:
//! either it is replayed when the session opens or it is queued live.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use stomp::{Command, Frame, HEADER_MESSAGE, HEADER_SUBSCRIPTION, decode_frame, encode_frame, is_heartbeat};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use super::{MessageHandler, TransportChannel};
use crate::config::SyncConfig;
use crate::error::TransportError;

const CONNECTED_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`StompTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompOptions {
    pub url: String,
    /// Virtual host sent in the CONNECT frame.
    pub host: String,
    pub session_token: Option<String>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl StompOptions {
    #[must_use]
    pub fn from_config(config: &SyncConfig, session_token: Option<String>) -> Self {
        Self {
            url: config.ws_url.clone(),
            host: host_of(&config.ws_url),
            session_token,
            initial_backoff: config.reconnect_initial_backoff,
            max_backoff: config.reconnect_max_backoff,
        }
    }
}

/// Host part of a WebSocket URL, without scheme, port or path.
fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = if authority.starts_with('[') {
        authority.split_once(']').map_or(authority, |(h, _)| h).trim_start_matches('[')
    } else {
        authority.split(':').next().unwrap_or_default()
    };
    if host.is_empty() { "localhost".to_owned() } else { host.to_owned() }
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct Route {
    topic: String,
    handler: MessageHandler,
}

#[derive(Default)]
struct Session {
    routes: HashMap<String, Route>,
    /// Outgoing queue of the live session; `None` while disconnected.
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

struct Shared {
    session: Mutex<Session>,
    connected: watch::Sender<bool>,
    closed: AtomicBool,
}

/// Reconnecting STOMP client. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct StompTransport {
    shared: Arc<Shared>,
}

impl StompTransport {
    /// Create the transport and spawn its connection loop.
    #[must_use]
    pub fn spawn(options: StompOptions) -> (Self, JoinHandle<()>) {
        let transport = Self::detached();
        let handle = tokio::spawn(run_connection_loop(transport.clone(), options));
        (transport, handle)
    }

    /// Transport with no connection loop attached.
    fn detached() -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(Session::default()),
                connected,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Wait until a broker session is established. Returns `false` on timeout.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.shared.connected.subscribe();
        matches!(tokio::time::timeout(timeout, rx.wait_for(|c| *c)).await, Ok(Ok(_)))
    }

    /// Send DISCONNECT and stop reconnecting.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let mut session = self.lock();
        if let Some(tx) = session.outgoing.take() {
            let _ = tx.send(encode_frame(&Frame::disconnect()));
        }
        self.shared.connected.send_replace(false);
        info!("stomp transport closed");
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.shared.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session queue and replay every registered subscription into it.
    fn begin_session(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = self.lock();
        let mut ids: Vec<&String> = session.routes.keys().collect();
        ids.sort();
        for id in ids {
            let route = &session.routes[id];
            let _ = tx.send(encode_frame(&Frame::subscribe(id, &route.topic)));
        }
        debug!(subscriptions = session.routes.len(), "replayed subscriptions");
        session.outgoing = Some(tx);
        self.shared.connected.send_replace(true);
        rx
    }

    fn end_session(&self) {
        self.lock().outgoing = None;
        self.shared.connected.send_replace(false);
    }

    /// Handle one inbound text message from the broker.
    fn dispatch(&self, text: &str) {
        if is_heartbeat(text) {
            return;
        }
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        match frame.command {
            Command::Message => {
                let Some(subscription) = frame.header(HEADER_SUBSCRIPTION) else {
                    warn!("MESSAGE frame without subscription header");
                    return;
                };
                // Clone the handler out so it runs without the session lock.
                let handler = self.lock().routes.get(subscription).map(|r| r.handler.clone());
                match handler {
                    Some(handler) => handler(&frame.body),
                    None => debug!(%subscription, "message for inactive subscription"),
                }
            }
            Command::Error => {
                let reason = frame.header(HEADER_MESSAGE).unwrap_or_default();
                warn!(%reason, body = %frame.body, "broker error frame");
            }
            other => debug!(command = %other, "ignoring frame"),
        }
    }
}

impl TransportChannel for StompTransport {
    fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler, subscription_id: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut session = self.lock();
        if let Some(tx) = &session.outgoing {
            // A failed send means the session is ending; the route below is
            // replayed by the next one.
            let _ = tx.send(encode_frame(&Frame::subscribe(subscription_id, topic)));
        }
        session
            .routes
            .insert(subscription_id.to_owned(), Route { topic: topic.to_owned(), handler });
        Ok(())
    }

    fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError> {
        let mut session = self.lock();
        if session.routes.remove(subscription_id).is_none() {
            return Ok(());
        }
        if let Some(tx) = &session.outgoing {
            let _ = tx.send(encode_frame(&Frame::unsubscribe(subscription_id)));
        }
        Ok(())
    }

    fn publish(&self, destination: &str, payload: &str) -> Result<(), TransportError> {
        let session = self.lock();
        let Some(tx) = &session.outgoing else {
            return Err(TransportError::NotConnected);
        };
        tx.send(encode_frame(&Frame::send(destination, payload)))
            .map_err(|_| TransportError::NotConnected)
    }
}

// =============================================================================
// CONNECTION LOOP
// =============================================================================

async fn run_connection_loop(transport: StompTransport, options: StompOptions) {
    let mut backoff = options.initial_backoff;

    while !transport.is_closed() {
        match connect_and_run(&transport, &options, &mut backoff).await {
            Ok(()) => info!(url = %options.url, "stomp session ended"),
            Err(e) => warn!(url = %options.url, error = %e, "stomp session failed"),
        }
        transport.end_session();
        if transport.is_closed() {
            break;
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(options.max_backoff);
    }
}

async fn connect_and_run(
    transport: &StompTransport,
    options: &StompOptions,
    backoff: &mut Duration,
) -> Result<(), TransportError> {
    let (ws, _) = tokio_tungstenite::connect_async(options.url.as_str())
        .await
        .map_err(ws_error)?;
    let (mut write, mut read) = ws.split();

    let authorization = options.session_token.as_ref().map(|t| format!("Bearer {t}"));
    let mut headers = vec![("heart-beat", "0,0")];
    if let Some(value) = authorization.as_deref() {
        headers.push(("Authorization", value));
    }
    let connect = Frame::connect(&options.host, &headers);
    write
        .send(Message::text(encode_frame(&connect)))
        .await
        .map_err(ws_error)?;

    tokio::time::timeout(CONNECTED_TIMEOUT, await_connected(&mut read))
        .await
        .map_err(|_| TransportError::WebSocket("timed out waiting for CONNECTED".to_owned()))??;

    *backoff = options.initial_backoff;
    let mut outgoing = transport.begin_session();
    info!(url = %options.url, "stomp session established");

    loop {
        tokio::select! {
            out = outgoing.recv() => {
                let Some(text) = out else {
                    // Queue dropped by `close`: the DISCONNECT frame was the last item.
                    let _ = write.close().await;
                    return Ok(());
                };
                write.send(Message::text(text)).await.map_err(ws_error)?;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => transport.dispatch(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ws_error(e)),
                }
            }
        }
    }
}

async fn await_connected<S>(read: &mut S) -> Result<(), TransportError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg.map_err(ws_error)? {
            Message::Text(text) => {
                if is_heartbeat(text.as_str()) {
                    continue;
                }
                let frame = decode_frame(text.as_str())?;
                match frame.command {
                    Command::Connected => return Ok(()),
                    Command::Error => {
                        let reason = frame.header(HEADER_MESSAGE).unwrap_or(frame.body.as_str());
                        return Err(TransportError::Rejected(reason.to_owned()));
                    }
                    other => debug!(command = %other, "ignoring frame before CONNECTED"),
                }
            }
            Message::Close(_) => return Err(TransportError::Closed),
            _ => {}
        }
    }
    Err(TransportError::Closed)
}

fn ws_error(e: tungstenite::Error) -> TransportError {
    TransportError::WebSocket(e.to_string())
}

#[cfg(test)]
#[path = "websocket_test.rs"]
mod tests;
