use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use travelsbud_core::CoreError;
use travelsbud_types::api::{
    Claims, ReadReceiptResponse, SendMessageRequest, SendMessageResponse, SetTypingRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /chats: the caller's inbox, newest first.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.services.inbox.list_conversations(&claims).await?;
    Ok(Json(entries))
}

/// GET /chats/{chat_id}
pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = state
        .services
        .fanout
        .conversation_for(&chat_id, &claims.sub)
        .await?;
    Ok(Json(conversation))
}

/// GET /chats/{chat_id}/messages: ascending by server timestamp.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let fanout = &state.services.fanout;
    fanout.conversation_for(&chat_id, &claims.sub).await?;
    let messages = fanout.messages(&chat_id).await?;
    Ok(Json(messages))
}

/// POST /chats/{chat_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .services
        .fanout
        .send_message(&chat_id, &claims.sub, &req.text)
        .await?;
    Ok((StatusCode::CREATED, Json(SendMessageResponse { id })))
}

/// PUT /chats/{chat_id}/typing
pub async fn set_typing(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetTypingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fanout = &state.services.fanout;
    fanout.conversation_for(&chat_id, &claims.sub).await?;
    fanout.set_typing(&chat_id, &claims.sub, req.typing).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /chats/{chat_id}/read-receipts/{user_id}: how far `user_id` has read.
pub async fn get_read_receipt(
    State(state): State<AppState>,
    Path((chat_id, user_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let fanout = &state.services.fanout;
    let conversation = fanout.conversation_for(&chat_id, &claims.sub).await?;
    if !conversation.has_participant(&user_id) {
        return Err(CoreError::NotFound(format!("{} in {}", user_id, chat_id)).into());
    }

    let last_read_id = fanout.fetch_last_read_id(&chat_id, &user_id).await?;
    Ok(Json(ReadReceiptResponse {
        user_id,
        last_read_id,
    }))
}
