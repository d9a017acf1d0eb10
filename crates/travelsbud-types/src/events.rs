use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, Meetup};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: String },

    /// Full ordered message list of a watched conversation. Clients replace
    /// their view wholesale on every emission.
    Messages {
        conversation_id: String,
        messages: Vec<ChatMessage>,
    },

    /// Whether anyone other than the receiving user is typing.
    Typing {
        conversation_id: String,
        typing: bool,
    },

    /// A like became mutual and a conversation now exists.
    MatchCreated {
        conversation_id: String,
        with_user_id: String,
    },

    /// A watch could not be started or broke down.
    WatchFailed {
        conversation_id: String,
        reason: String,
    },

    /// Every meetup, ascending by date.
    Meetups { meetups: Vec<Meetup> },

    /// Full ordered message list of a watched group chat.
    GroupMessages {
        group_id: String,
        messages: Vec<ChatMessage>,
    },

    /// A group chat watch could not be started or broke down.
    GroupChatWatchFailed { group_id: String, reason: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start streaming messages and typing state for a conversation.
    WatchConversation { conversation_id: String },

    /// Stop streaming a conversation.
    Unwatch { conversation_id: String },

    /// Update own typing state in a conversation.
    SetTyping {
        conversation_id: String,
        typing: bool,
    },

    /// Stream the meetup list.
    WatchMeetups,

    UnwatchMeetups,

    /// Stream a group chat's messages. Participants only.
    WatchGroupChat { group_id: String },

    UnwatchGroupChat { group_id: String },
}
