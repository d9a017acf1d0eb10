use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use travelsbud_types::api::{Claims, CreateMeetupRequest, CreatedResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /meetups: ascending by date.
pub async fn list_meetups(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let meetups = state.services.meetups.list_meetups().await?;
    Ok(Json(meetups))
}

/// POST /meetups
pub async fn create_meetup(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMeetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state.services.meetups.create_meetup(&claims, req).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// POST /meetups/{meetup_id}/attendees
pub async fn join_meetup(
    State(state): State<AppState>,
    Path(meetup_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.meetups.join_meetup(&claims, &meetup_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /meetups/{meetup_id}/attendees
pub async fn leave_meetup(
    State(state): State<AppState>,
    Path(meetup_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.meetups.leave_meetup(&claims, &meetup_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
