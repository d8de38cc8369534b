//! Error types shared across the sync core and its collaborators.
//!
//! DESIGN
//! ======
//! Every failure is local to the operation that triggered it and surfaces
//! as an `Err` for the caller to render (typically a transient toast).
//! Errors are `Clone` so a single in-flight chat creation can hand the same
//! outcome to every caller awaiting it.

/// Grepable error code and retryable flag for caller-facing errors.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// SYNC ERROR
// =============================================================================

/// Errors returned by [`crate::ChatSync`] operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// Chat creation was attempted while the realtime connection is down.
    #[error("not connected to the chat server, try again once the connection is restored")]
    Connection,

    /// A message send was attempted while the realtime connection is down.
    #[error("cannot send message: realtime connection is not established")]
    NotConnected,

    /// The chat creation service rejected or failed the request.
    #[error(transparent)]
    Creation(#[from] ApiError),

    /// The transport refused a subscribe/unsubscribe/publish.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An outgoing payload could not be serialized.
    #[error("failed to encode outgoing message: {0}")]
    Encode(String),
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Connection => "E_CONNECTION",
            Self::NotConnected => "E_NOT_CONNECTED",
            Self::Creation(e) => e.error_code(),
            Self::Transport(e) => e.error_code(),
            Self::Encode(_) => "E_ENCODE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Connection | Self::NotConnected => true,
            Self::Creation(e) => e.retryable(),
            Self::Transport(e) => e.retryable(),
            Self::Encode(_) => false,
        }
    }
}

// =============================================================================
// API ERROR
// =============================================================================

/// Errors produced by the REST collaborators (chat creation, profile fetch).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-success status. `message` is the
    /// server-provided description when one was present.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The HTTP request could not be sent or did not complete.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Status { .. } => "E_API_STATUS",
            Self::Request(_) => "E_API_REQUEST",
            Self::Decode(_) => "E_API_DECODE",
            Self::ClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// TRANSPORT ERROR
// =============================================================================

/// Errors produced by a [`crate::TransportChannel`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// No live session to carry the frame.
    #[error("transport is not connected")]
    NotConnected,

    /// The WebSocket connection could not be opened or broke.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The broker answered CONNECT with an ERROR frame.
    #[error("broker rejected session: {0}")]
    Rejected(String),

    /// A frame from the broker could not be decoded.
    #[error("frame decode failed: {0}")]
    Decode(#[from] stomp::CodecError),

    /// The transport was shut down.
    #[error("transport closed")]
    Closed,
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConnected => "E_TRANSPORT_NOT_CONNECTED",
            Self::WebSocket(_) => "E_TRANSPORT_WEBSOCKET",
            Self::Rejected(_) => "E_TRANSPORT_REJECTED",
            Self::Decode(_) => "E_TRANSPORT_DECODE",
            Self::Closed => "E_TRANSPORT_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::WebSocket(_))
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
