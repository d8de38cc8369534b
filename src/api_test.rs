use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// =============================================================================
// parse_chat / error_message
// =============================================================================

#[test]
fn parse_chat_drops_latest_message() {
    let text = r#"{
        "id": "c9",
        "participants": ["u1", "u2"],
        "latestMessage": {"id": "m1", "chatId": "c9", "senderId": "u2", "body": "old"}
    }"#;
    let chat = parse_chat(201, text).expect("chat");
    assert_eq!(chat.id, "c9");
    assert_eq!(chat.participants, vec!["u1", "u2"]);
    assert!(chat.latest_message.is_none());
}

#[test]
fn parse_chat_rejects_bad_body() {
    let err = parse_chat(200, "not json").expect_err("decode error");
    assert!(matches!(err, ApiError::Decode(_)));
}

#[test]
fn parse_chat_prefers_server_message() {
    let err = parse_chat(400, r#"{"message":"user u2 does not exist"}"#).expect_err("rejected");
    assert_eq!(err.to_string(), "user u2 does not exist");
    assert!(matches!(err, ApiError::Status { status: 400, .. }));
}

#[test]
fn error_message_falls_back_to_error_field() {
    assert_eq!(error_message(403, r#"{"error":"forbidden"}"#, "failed"), "forbidden");
}

#[test]
fn error_message_generic_fallback() {
    assert_eq!(error_message(500, "<html>oops</html>", "failed to create chat"), "failed to create chat (status 500)");
    assert_eq!(error_message(502, r#"{"message":"  "}"#, "failed"), "failed (status 502)");
}

#[test]
fn request_body_is_camel_case() {
    let ids = vec!["u2".to_owned(), "u3".to_owned()];
    let json = serde_json::to_value(CreateChatRequest { participant_ids: &ids }).expect("serialize");
    assert_eq!(json, serde_json::json!({ "participantIds": ["u2", "u3"] }));
}

#[test]
fn base_url_trailing_slash_trimmed() {
    let config = SyncConfig { base_url: "http://example.test/".into(), ..SyncConfig::default() };
    let api = HttpApi::new(&config, None).expect("client");
    assert_eq!(api.base_url(), "http://example.test");
}

// =============================================================================
// live HTTP
// =============================================================================

/// Serve one request with `status` and `body`, returning the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut raw = Vec::new();
        let mut buf = [0_u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.expect("read");
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_owned()))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= head_end + 4 + length || n == 0 {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write");
        String::from_utf8_lossy(&raw).into_owned()
    });
    (base, handle)
}

#[tokio::test]
async fn create_chat_posts_participants_with_bearer_token() {
    let (base, server) = serve_once("201 Created", r#"{"id":"c9","participants":["u1","u2"]}"#).await;
    let config = SyncConfig { base_url: base, ..SyncConfig::default() };
    let api = HttpApi::new(&config, Some("tok".into())).expect("client");

    let chat = api.create_chat(&["u2".to_owned()]).await.expect("created");
    assert_eq!(chat.id, "c9");

    let request = server.await.expect("server task");
    assert!(request.starts_with("POST /api/chats "));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer tok"));
    assert!(request.contains(r#"{"participantIds":["u2"]}"#));
}

#[tokio::test]
async fn fetch_current_user_decodes_profile() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"id":"u1","email":"a@b.c","chats":[{"id":"c1","participants":["u1","u2"]}],"notifications":[]}"#,
    )
    .await;
    let config = SyncConfig { base_url: base, ..SyncConfig::default() };
    let api = HttpApi::new(&config, None).expect("client");

    let user = api.fetch_current_user().await.expect("profile");
    assert_eq!(user.id, "u1");
    assert_eq!(user.chats.len(), 1);

    let request = server.await.expect("server task");
    assert!(request.starts_with("GET /api/users/me "));
}

#[tokio::test]
async fn create_chat_surfaces_rejection() {
    let (base, _server) = serve_once("409 Conflict", r#"{"error":"chat already exists"}"#).await;
    let config = SyncConfig { base_url: base, ..SyncConfig::default() };
    let api = HttpApi::new(&config, None).expect("client");

    let err = api.create_chat(&["u2".to_owned()]).await.expect_err("rejected");
    assert_eq!(err.to_string(), "chat already exists");
}
