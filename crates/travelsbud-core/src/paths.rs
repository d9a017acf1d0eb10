//! Document and collection paths. The layout is shared with other clients of
//! the same store.

use crate::error::CoreError;

pub const USERS: &str = "users";
pub const MEETUPS: &str = "meetups";
pub const GROUP_CHATS: &str = "groupChats";

const MAX_ID_LEN: usize = 128;

/// Ids become path segments, so they must not contain separators.
pub fn check_id(kind: &str, id: &str) -> Result<(), CoreError> {
    if id.is_empty() || id.len() > MAX_ID_LEN || id.contains('/') || id == "." || id == ".." {
        return Err(CoreError::InvalidInput(format!("bad {} id {:?}", kind, id)));
    }
    Ok(())
}

pub fn user(uid: &str) -> String {
    format!("users/{}", uid)
}

pub fn likes(uid: &str) -> String {
    format!("users/{}/likes", uid)
}

pub fn like_edge(liker: &str, liked: &str) -> String {
    format!("users/{}/likes/{}", liker, liked)
}

pub fn user_chats(uid: &str) -> String {
    format!("users/{}/chats", uid)
}

pub fn user_chat(uid: &str, conversation_id: &str) -> String {
    format!("users/{}/chats/{}", uid, conversation_id)
}

pub fn chat(conversation_id: &str) -> String {
    format!("chats/{}", conversation_id)
}

pub fn chat_messages(conversation_id: &str) -> String {
    format!("chats/{}/messages", conversation_id)
}

pub fn typing(conversation_id: &str) -> String {
    format!("chats/{}/typing", conversation_id)
}

pub fn typing_state(conversation_id: &str, uid: &str) -> String {
    format!("chats/{}/typing/{}", conversation_id, uid)
}

pub fn read_receipt(conversation_id: &str, uid: &str) -> String {
    format!("chats/{}/readReceipts/{}", conversation_id, uid)
}

pub fn meetup(meetup_id: &str) -> String {
    format!("meetups/{}", meetup_id)
}

pub fn group_chat(group_id: &str) -> String {
    format!("groupChats/{}", group_id)
}

pub fn group_chat_messages(group_id: &str) -> String {
    format!("groupChats/{}/messages", group_id)
}
