use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /files/{*path}: serves uploaded blobs. Download URLs are public, so
/// this route sits outside the auth middleware.
pub async fn download_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (bytes, content_type) = state.services.blobs.read(&path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        bytes,
    ))
}
