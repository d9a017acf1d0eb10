use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use travelsbud_core::LikeOutcome;
use travelsbud_types::api::{Claims, LikeResponse};
use travelsbud_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /users/{user_id}/like
///
/// Failures come back as errors, so `matched: false` in a 200 response always
/// means "not (yet) mutual".
pub async fn like_user(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .matcher
        .record_like(&claims, &claims.sub, &target_id)
        .await?;

    if let LikeOutcome::Matched {
        conversation_id,
        newly_created: true,
    } = &outcome
    {
        for (user, other) in [(&claims.sub, &target_id), (&target_id, &claims.sub)] {
            state
                .dispatcher
                .send_to_user(
                    user,
                    GatewayEvent::MatchCreated {
                        conversation_id: conversation_id.clone(),
                        with_user_id: other.clone(),
                    },
                )
                .await;
        }
    }

    Ok(Json(LikeResponse {
        matched: outcome.is_mutual_match(),
        outcome: outcome.label().to_string(),
        conversation_id: outcome.conversation_id().map(str::to_string),
    }))
}
