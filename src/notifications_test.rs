use super::*;
use crate::types::MessageKind;

fn msg(id: &str, chat_id: &str, sender: &str) -> Message {
    Message {
        id: id.into(),
        chat_id: chat_id.into(),
        sender_id: sender.into(),
        body: "hi".into(),
        created_at: String::new(),
        kind: MessageKind::Normal,
    }
}

fn stored(id: &str, kind: &str, read: bool) -> Notification {
    Notification {
        id: id.into(),
        kind: kind.into(),
        read,
        chat_id: Some("c1".into()),
        message: None,
        created_at: None,
    }
}

#[test]
fn seed_keeps_unread_chat_notifications_only() {
    let feed = ChatNotifications::seeded(&[
        stored("n1", "chat", false),
        stored("n2", "chat", true),
        stored("n3", "friendRequest", false),
        stored("n4", "chat", false),
    ]);
    let ids: Vec<&str> = feed.entries().iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["n1", "n4"]);
}

#[test]
fn own_message_is_not_recorded() {
    let mut feed = ChatNotifications::default();
    assert!(feed.record(&msg("m1", "c1", "u1"), Some("u1")).is_none());
    assert!(feed.is_empty());
}

#[test]
fn foreign_message_is_prepended() {
    let mut feed = ChatNotifications::seeded(&[stored("n1", "chat", false)]);
    let added = feed.record(&msg("m1", "c1", "u2"), Some("u1")).expect("recorded");
    assert_eq!(added.id, "m1");
    assert_eq!(feed.len(), 2);
    assert_eq!(feed.entries()[0].id, "m1");
    assert_eq!(feed.entries()[1].id, "n1");
}

#[test]
fn dismiss_chat_removes_its_entries() {
    let mut feed = ChatNotifications::default();
    feed.record(&msg("m1", "c1", "u2"), Some("u1"));
    feed.record(&msg("m2", "c2", "u3"), Some("u1"));
    feed.record(&msg("m3", "c1", "u2"), Some("u1"));

    assert_eq!(feed.dismiss_chat("c1"), 2);
    assert_eq!(feed.len(), 1);
    assert_eq!(feed.entries()[0].id, "m2");
}
