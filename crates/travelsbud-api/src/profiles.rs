use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};

use travelsbud_types::api::{Claims, DeviceTokenRequest, PhotoUploadResponse, SaveProfileRequest};

use crate::auth::AppState;
use crate::error::ApiError;

/// PUT /profile
pub async fn save_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SaveProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.profiles.save_profile(&claims, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /profile
pub async fn get_own_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.services.profiles.get_profile(&claims.sub).await?;
    Ok(Json(profile))
}

/// GET /users/{user_id}
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.services.profiles.get_profile(&user_id).await?;
    Ok(Json(profile))
}

/// GET /candidates: the swipe deck.
pub async fn swipe_candidates(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let candidates = state.services.profiles.swipe_candidates(&claims).await?;
    Ok(Json(candidates))
}

/// PUT /profile/photo: raw image bytes, typed by Content-Type.
pub async fn upload_photo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    let url = state
        .services
        .profiles
        .upload_photo(&claims, &bytes, content_type)
        .await?;
    Ok((StatusCode::CREATED, Json(PhotoUploadResponse { url })))
}

/// PUT /profile/device-token
pub async fn register_device_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeviceTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .profiles
        .register_device_token(&claims, &req.token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
