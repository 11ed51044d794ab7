use axum::{
    Extension, Json,
    extract::{Path, State},
};
use axum_extra::extract::WithRejection;
use tracing::warn;
use uuid::Uuid;

use parley_types::api::{Claims, SendMessageRequest, SendMessageResponse, StatusMessage};
use parley_types::models::Message;

use crate::auth::{AppState, with_db};
use crate::error::{ApiError, ApiResult};

/// Messages between the two users, oldest first. Never creates a thread.
pub async fn read_thread(
    State(state): State<AppState>,
    WithRejection(Path((user_id, friend_id)), _): WithRejection<Path<(Uuid, Uuid)>, ApiError>,
) -> ApiResult<Json<Vec<Message>>> {
    Ok(Json(with_db(&state, move |db| db.read_thread(user_id, friend_id)).await?))
}

/// The sender is always the authenticated user; the `userId` path segment
/// is not trusted.
pub async fn send_message(
    State(state): State<AppState>,
    WithRejection(Path((user_id, friend_id)), _): WithRejection<Path<(Uuid, Uuid)>, ApiError>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> ApiResult<Json<SendMessageResponse>> {
    if user_id != claims.sub {
        warn!(
            "{} ({}) posted to /chat/{}/{}; sending as the authenticated user",
            claims.username, claims.sub, user_id, friend_id
        );
    }

    let delivery = state
        .delivery
        .deliver(claims.sub, friend_id, &req.text, None)
        .await?;

    Ok(Json(SendMessageResponse {
        message: "Message sent".into(),
        data: Some(delivery.message),
    }))
}

/// Only the sender may delete a message. A message owned by someone else
/// is indistinguishable from a missing one.
pub async fn delete_message(
    State(state): State<AppState>,
    WithRejection(Path(message_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<StatusMessage>> {
    let requester = claims.sub;
    with_db(&state, move |db| db.delete_message(message_id, requester))
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => ApiError::Unauthorized("Message not found or unauthorized".into()),
            other => other,
        })?;

    Ok(Json(StatusMessage::new("Message deleted")))
}
