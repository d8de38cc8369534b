use super::*;

// =============================================================
// naming
// =============================================================

#[test]
fn subscription_ids_are_deterministic() {
    assert_eq!(chat_subscription_id("c1"), "chat-c1");
    assert_eq!(user_subscription_id("u1"), "user-u1");
    assert_eq!(chat_subscription_id("c1"), chat_subscription_id("c1"));
}

#[test]
fn topics_and_destinations() {
    assert_eq!(chat_topic("c1"), "/topic/chat/c1");
    assert_eq!(user_topic("u1"), "/topic/user/u1");
    assert_eq!(chat_send_destination("c1"), "/app/chat/c1/send");
}

// =============================================================
// registry
// =============================================================

#[test]
fn activate_twice_is_refused() {
    let mut reg = SubscriptionRegistry::new();
    assert!(reg.activate("chat-c1", "/topic/chat/c1"));
    assert!(!reg.activate("chat-c1", "/topic/chat/c1"));
    assert_eq!(reg.ids(), vec!["chat-c1"]);
    assert!(reg.is_active("chat-c1"));
}

#[test]
fn deactivate_returns_topic() {
    let mut reg = SubscriptionRegistry::new();
    reg.activate("user-u1", "/topic/user/u1");
    assert_eq!(reg.deactivate("user-u1").as_deref(), Some("/topic/user/u1"));
    assert!(reg.ids().is_empty());
    assert!(reg.deactivate("user-u1").is_none());
}

#[test]
fn drain_session_removes_chat_and_user_entries() {
    let mut reg = SubscriptionRegistry::new();
    reg.activate("chat-c2", "/topic/chat/c2");
    reg.activate("user-u1", "/topic/user/u1");
    reg.activate("chat-c1", "/topic/chat/c1");
    reg.activate("system", "/topic/system");

    let drained = reg.drain_session();
    assert_eq!(drained, vec!["chat-c1", "chat-c2", "user-u1"]);
    assert_eq!(reg.ids(), vec!["system"]);
}
