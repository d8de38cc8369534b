use super::*;
use chatsync::{Chat, Message, MessageKind};

fn message(sender: &str, body: &str) -> Message {
    Message {
        id: "m1".into(),
        chat_id: "c1".into(),
        sender_id: sender.into(),
        body: body.into(),
        created_at: String::new(),
        kind: MessageKind::Normal,
    }
}

#[test]
fn parses_create_with_many_users() {
    let cli = Cli::try_parse_from(["chatsync", "--session-token", "tok", "create", "u2", "u3"]).expect("parse");
    assert_eq!(cli.session_token.as_deref(), Some("tok"));
    match cli.command {
        Command::Create { user_ids } => assert_eq!(user_ids, vec!["u2", "u3"]),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn create_requires_a_user() {
    assert!(Cli::try_parse_from(["chatsync", "create"]).is_err());
}

#[test]
fn parses_send() {
    let cli = Cli::try_parse_from(["chatsync", "send", "c1", "hello there"]).expect("parse");
    match cli.command {
        Command::Send { chat_id, body } => {
            assert_eq!(chat_id, "c1");
            assert_eq!(body, "hello there");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn flags_override_urls() {
    let cli = Cli::try_parse_from([
        "chatsync",
        "--base-url",
        "http://chat.test/",
        "--ws-url",
        "ws://chat.test/ws",
        "listen",
    ])
    .expect("parse");
    let config = cli.config();
    assert_eq!(config.base_url, "http://chat.test");
    assert_eq!(config.ws_url, "ws://chat.test/ws");
}

#[test]
fn describes_events() {
    assert_eq!(
        describe(&SyncEvent::MessageReceived { chat_id: "c1".into(), message: message("u2", "hi") }),
        "[c1] u2: hi"
    );
    assert_eq!(describe(&SyncEvent::ActiveChatChanged(None)), "active chat cleared");
    let chat = Chat { id: "c9".into(), participants: vec!["u1".into(), "u2".into()], latest_message: None };
    assert_eq!(describe(&SyncEvent::ChatCreated(chat)), "chat created: c9 (u1, u2)");
}

#[test]
fn sync_errors_carry_code() {
    let err = CliError::from(SyncError::Connection);
    assert!(err.to_string().starts_with("[E_CONNECTION] "));
}
