use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use travelsbud_types::api::{
    Claims, CreateGroupChatRequest, CreatedResponse, SendMessageRequest, SendMessageResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /group-chats
pub async fn list_group_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let groups = state.services.group_chats.list_group_chats(&claims).await?;
    Ok(Json(groups))
}

/// POST /group-chats
pub async fn create_group_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .services
        .group_chats
        .create_group_chat(&claims, req)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// GET /group-chats/{group_id}/messages
pub async fn get_group_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .services
        .group_chats
        .group_messages(&claims, &group_id)
        .await?;
    Ok(Json(messages))
}

/// POST /group-chats/{group_id}/messages
pub async fn send_group_message(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .services
        .group_chats
        .send_group_message(&group_id, &claims.sub, &req.text)
        .await?;
    Ok((StatusCode::CREATED, Json(SendMessageResponse { id })))
}
