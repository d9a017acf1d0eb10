use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use uuid::Uuid;

use travelsbud_core::Services;
use travelsbud_gateway::Dispatcher;
use travelsbud_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;

/// Session lifetime.
const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub services: Services,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);

    // Validate input
    if email.len() < 3 || email.len() > 254 || !email.contains('@') {
        return Err(ApiError::bad_request("email is not valid"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .to_string();

    let user_id = Uuid::new_v4().to_string();

    // Run blocking DB insert off the async runtime
    let db = state.services.db.clone();
    let uid = user_id.clone();
    let account_email = email.clone();
    tokio::task::spawn_blocking(move || db.create_account(&uid, &account_email, &password_hash))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal(e.to_string())
        })?
        .inspect_err(|e| warn!("Registration for {} refused: {}", email, e))?;

    let token = create_token(&state.jwt_secret, &user_id, &email)?;
    info!("Registered account {} ({})", user_id, email);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);

    let db = state.services.db.clone();
    let lookup = email.clone();
    let account = tokio::task::spawn_blocking(move || db.get_account_by_email(&lookup))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal(e.to_string())
        })??
        .ok_or_else(invalid_credentials)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&account.password).map_err(|e| ApiError::internal(e.to_string()))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid_credentials())?;

    let token = create_token(&state.jwt_secret, &account.id, &account.email)?;

    Ok(Json(LoginResponse {
        user_id: account.id,
        email: account.email,
        token,
    }))
}

fn invalid_credentials() -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "invalid email or password")
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn create_token(secret: &str, user_id: &str, email: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(e.to_string()))
}
