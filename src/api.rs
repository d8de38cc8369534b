//! REST collaborators: chat creation and the signed-in user's profile.
//!
//! Thin HTTP wrapper over `POST /api/chats` and `GET /api/users/me`.
//! Response handling lives in pure functions (`parse_chat`, `error_message`)
//! so it can be tested without a server.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::types::{Chat, SessionUser, UserId};

const CHATS_PATH: &str = "/api/chats";
const CURRENT_USER_PATH: &str = "/api/users/me";

/// Remote creation of a chat from participant ids.
#[async_trait]
pub trait ChatCreationService: Send + Sync {
    /// Create a chat between the current user and `participant_ids`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] carrying the server's message when the
    /// request is rejected, or a transport/decode failure.
    async fn create_chat(&self, participant_ids: &[UserId]) -> Result<Chat, ApiError>;
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    session_token: Option<String>,
}

impl HttpApi {
    /// Build a client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &SyncConfig, session_token: Option<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_owned(), session_token })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the signed-in user's profile with chats and notifications.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails or is rejected.
    pub async fn fetch_current_user(&self) -> Result<SessionUser, ApiError> {
        let request = self.authorized(self.http.get(self.url(CURRENT_USER_PATH)));
        let (status, text) = send(request).await?;
        if !is_success(status) {
            return Err(ApiError::Status { status, message: error_message(status, &text, "failed to load profile") });
        }
        parse_json(&text)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ChatCreationService for HttpApi {
    async fn create_chat(&self, participant_ids: &[UserId]) -> Result<Chat, ApiError> {
        let body = CreateChatRequest { participant_ids };
        let request = self.authorized(self.http.post(self.url(CHATS_PATH)).json(&body));
        let (status, text) = send(request).await?;
        debug!(status, participants = participant_ids.len(), "create chat response");
        parse_chat(status, &text)
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<(u16, String), ApiError> {
    let response = request.send().await.map_err(|e| ApiError::Request(e.to_string()))?;
    let status = response.status().as_u16();
    let text = response.text().await.map_err(|e| ApiError::Request(e.to_string()))?;
    Ok((status, text))
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatRequest<'a> {
    participant_ids: &'a [UserId],
}

// =============================================================================
// PARSING
// =============================================================================

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Interpret a create-chat response. The returned chat never carries a
/// latest message.
fn parse_chat(status: u16, text: &str) -> Result<Chat, ApiError> {
    if !is_success(status) {
        let reason = error_message(status, text, "failed to create chat");
        warn!(status, %reason, "chat creation rejected");
        return Err(ApiError::Status { status, message: reason });
    }
    let chat: Chat = parse_json(text)?;
    Ok(chat.with_latest_message(None))
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Server-provided error text (`message`, then `error`), or a generic
/// fallback naming the status.
fn error_message(status: u16, text: &str, fallback: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|body| {
            ["message", "error"]
                .iter()
                .find_map(|field| body.get(*field).and_then(serde_json::Value::as_str).map(str::to_owned))
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("{fallback} (status {status})"))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
