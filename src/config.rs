//! Sync configuration parsed from environment variables.
//!
//! Every setting has a default, so a missing or unparsable variable never
//! prevents startup; the CLI layers its own flags on top.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/ws";
pub const DEFAULT_NEW_CHAT_TTL_SECS: u64 = 3600;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RECONNECT_INITIAL_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX_BACKOFF_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// REST API base URL, without trailing slash.
    pub base_url: String,
    /// STOMP-over-WebSocket endpoint.
    pub ws_url: String,
    /// How long the "new chat" markers live after the latest insertion.
    pub new_chat_ttl: Duration,
    pub timeouts: HttpTimeouts,
    pub reconnect_initial_backoff: Duration,
    pub reconnect_max_backoff: Duration,
}

impl SyncConfig {
    /// Build config from environment variables.
    ///
    /// - `CHATSYNC_BASE_URL`: default `http://127.0.0.1:8080`
    /// - `CHATSYNC_WS_URL`: default `ws://127.0.0.1:8080/ws`
    /// - `CHATSYNC_NEW_CHAT_TTL_SECS`: default 3600
    /// - `CHATSYNC_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CHATSYNC_CONNECT_TIMEOUT_SECS`: default 10
    /// - `CHATSYNC_RECONNECT_INITIAL_BACKOFF_MS`: default 1000
    /// - `CHATSYNC_RECONNECT_MAX_BACKOFF_MS`: default 10000
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup("CHATSYNC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let ws_url = lookup("CHATSYNC_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_owned());
        let parse = |key: &str, default: u64| parse_or(lookup(key).as_deref(), default);

        Self {
            base_url,
            ws_url,
            new_chat_ttl: Duration::from_secs(parse("CHATSYNC_NEW_CHAT_TTL_SECS", DEFAULT_NEW_CHAT_TTL_SECS)),
            timeouts: HttpTimeouts {
                request_secs: parse("CHATSYNC_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: parse("CHATSYNC_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            reconnect_initial_backoff: Duration::from_millis(parse(
                "CHATSYNC_RECONNECT_INITIAL_BACKOFF_MS",
                DEFAULT_RECONNECT_INITIAL_BACKOFF_MS,
            )),
            reconnect_max_backoff: Duration::from_millis(parse(
                "CHATSYNC_RECONNECT_MAX_BACKOFF_MS",
                DEFAULT_RECONNECT_MAX_BACKOFF_MS,
            )),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T>(raw: Option<&str>, default: T) -> T
where
    T: std::str::FromStr,
{
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
