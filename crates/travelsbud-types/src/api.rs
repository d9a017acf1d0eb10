use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub email: String,
    pub token: String,
}

// -- Likes --

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    /// The plain "is this a mutual match" answer.
    pub matched: bool,
    /// `pending`, `matched` or `self_like_rejected`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetTypingRequest {
    pub typing: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadReceiptResponse {
    pub user_id: String,
    pub last_read_id: Option<String>,
}

// -- Profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveProfileRequest {
    pub username: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub bio: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PhotoUploadResponse {
    pub url: String,
}

// -- Meetups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMeetupRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub date: DateTime<Utc>,
}

// -- Group chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupChatRequest {
    pub title: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

// -- Errors --

/// Body of every non-2xx response: a generic message plus the raw error text.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
