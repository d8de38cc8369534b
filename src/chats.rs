//! Chat list operations: target normalization, duplicate detection and
//! most-recently-active ordering.
//!
//! All functions are pure. They take the current list by reference and
//! hand back a new list, leaving shared state untouched until the caller
//! swaps it in.

use crate::types::{Chat, Message, UserId};

/// Trim, drop blanks and duplicates, and drop the current user.
///
/// Order of first appearance is kept.
pub fn normalize_targets<I, S>(user_ids: I, current_user: Option<&str>) -> Vec<UserId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<UserId> = Vec::new();
    for raw in user_ids {
        let id = raw.as_ref().trim();
        if id.is_empty() || current_user == Some(id) || out.iter().any(|o| o == id) {
            continue;
        }
        out.push(id.to_owned());
    }
    out
}

/// Order-independent key of a participant set, used to share in-flight
/// creation requests.
#[must_use]
pub fn participant_key(targets: &[UserId]) -> Vec<UserId> {
    let mut key = targets.to_vec();
    key.sort();
    key
}

/// Find an existing chat whose participants are exactly the current user
/// plus `targets`.
///
/// A single target matches a two-person chat containing it. A group
/// matches a chat of `targets.len() + 1` participants containing every
/// target.
#[must_use]
pub fn find_existing<'a>(chats: &'a [Chat], targets: &[UserId]) -> Option<&'a Chat> {
    match targets {
        [] => None,
        [target] => chats
            .iter()
            .find(|c| c.participants.len() == 2 && c.has_participant(target)),
        group => chats.iter().find(|c| {
            c.participants.len() == group.len() + 1 && group.iter().all(|id| c.has_participant(id))
        }),
    }
}

/// New list with `chat_id` rebuilt around `message` and moved to the front.
///
/// Returns `None` when the chat is not in the list.
#[must_use]
pub fn promote_with_latest(chats: &[Chat], chat_id: &str, message: &Message) -> Option<Vec<Chat>> {
    let idx = chats.iter().position(|c| c.id == chat_id)?;
    let updated = chats[idx].with_latest_message(Some(message.clone()));

    let mut out = Vec::with_capacity(chats.len());
    out.push(updated);
    out.extend(
        chats
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, c)| c.clone()),
    );
    Some(out)
}

/// New list with `chat` at the front, or `None` when a chat with the same
/// id is already present.
#[must_use]
pub fn insert_front_if_absent(chats: &[Chat], chat: Chat) -> Option<Vec<Chat>> {
    if chats.iter().any(|c| c.id == chat.id) {
        return None;
    }
    let mut out = Vec::with_capacity(chats.len() + 1);
    out.push(chat);
    out.extend(chats.iter().cloned());
    Some(out)
}

#[cfg(test)]
#[path = "chats_test.rs"]
mod tests;
