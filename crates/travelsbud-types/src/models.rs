//! Document shapes as persisted in the store. Field names are the wire
//! contract other tools read, so renames here are breaking changes.
//!
//! `id` is never stored inside the document body; readers fill it in from
//! the document path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `users/{liker}/likes/{liked}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeEdge {
    pub liked: bool,
}

/// `chats/{id}`: a one-to-one thread created by a mutual match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "participantIDs")]
    pub participant_ids: Vec<String>,
    #[serde(rename = "lastMessage", default)]
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|p| p == user_id)
    }

    /// Participants other than `user_id`.
    pub fn others<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.participant_ids
            .iter()
            .map(String::as_str)
            .filter(move |p| *p != user_id)
    }
}

/// `users/{uid}/chats/{conversation_id}`: per-user denormalized inbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationIndexEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

/// `chats/{id}/messages/{id}` and `groupChats/{id}/messages/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "senderID")]
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// `chats/{id}/typing/{uid}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingState {
    pub typing: bool,
}

/// `chats/{id}/readReceipts/{uid}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    #[serde(rename = "lastReadID")]
    pub last_read_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `users/{uid}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub bio: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// `meetups/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meetup {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    /// When the meetup takes place.
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "creatorID")]
    pub creator_id: String,
    pub attendees: Vec<String>,
}

/// `groupChats/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupChat {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    #[serde(rename = "creatorID")]
    pub creator_id: String,
    pub participants: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
