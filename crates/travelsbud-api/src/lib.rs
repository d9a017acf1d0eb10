//! HTTP surface over the TravelsBud services, plus the `/gateway`
//! WebSocket upgrade.

pub mod auth;
pub mod error;
pub mod files;
pub mod group_chats;
pub mod likes;
pub mod meetups;
pub mod messages;
pub mod middleware;
pub mod profiles;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use travelsbud_core::blobs::MAX_BLOB_SIZE;
use travelsbud_gateway::connection;

use crate::auth::AppState;
use crate::middleware::require_auth;

/// One megabyte above the blob limit; the blob store rejects oversize uploads.
const BODY_LIMIT: usize = MAX_BLOB_SIZE + 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/files/{*path}", get(files::download_file))
        .route("/gateway", get(ws_upgrade))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/profile", get(profiles::get_own_profile).put(profiles::save_profile))
        .route("/profile/photo", put(profiles::upload_photo))
        .route("/profile/device-token", put(profiles::register_device_token))
        .route("/candidates", get(profiles::swipe_candidates))
        .route("/users/{user_id}", get(profiles::get_profile))
        .route("/users/{user_id}/like", post(likes::like_user))
        .route("/chats", get(messages::list_chats))
        .route("/chats/{chat_id}", get(messages::get_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/chats/{chat_id}/typing", put(messages::set_typing))
        .route(
            "/chats/{chat_id}/read-receipts/{user_id}",
            get(messages::get_read_receipt),
        )
        .route("/meetups", get(meetups::list_meetups).post(meetups::create_meetup))
        .route(
            "/meetups/{meetup_id}/attendees",
            post(meetups::join_meetup).delete(meetups::leave_meetup),
        )
        .route(
            "/group-chats",
            get(group_chats::list_group_chats).post(group_chats::create_group_chat),
        )
        .route(
            "/group-chats/{group_id}/messages",
            get(group_chats::get_group_messages).post(group_chats::send_group_message),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.services.clone(),
            state.jwt_secret.clone(),
        )
    })
}

async fn health() -> &'static str {
    "ok"
}
