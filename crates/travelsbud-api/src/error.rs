use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use travelsbud_core::CoreError;
use travelsbud_db::StoreError;
use travelsbud_types::api::ErrorBody;

/// An HTTP failure: a status, a generic message, and optionally the raw
/// error text.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            message,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid request").with_detail(detail)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "not signed in")
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "something went wrong").with_detail(detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match &e {
            CoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::StoreWrite { .. } | CoreError::StoreRead { .. } | CoreError::Blob(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match status {
            StatusCode::UNAUTHORIZED => "not signed in",
            StatusCode::NOT_FOUND => "not found",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::BAD_REQUEST => "invalid request",
            _ => "something went wrong",
        };
        Self::new(status, message).with_detail(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateAccount(_) => {
                Self::new(StatusCode::CONFLICT, "account already exists")
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}: {:?}", self.status, self.message, self.detail);
        }
        let body = ErrorBody {
            error: self.message.to_string(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}
