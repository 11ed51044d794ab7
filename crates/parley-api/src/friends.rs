use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use parley_types::api::{Claims, RespondFriendRequest, SendFriendRequest, StatusMessage};
use parley_types::models::{ReceivedRequest, SentRequest, UserSummary};

use crate::auth::{AppState, with_db};
use crate::error::{ApiError, ApiResult};

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SendFriendRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let to_username = req.to_username.trim().to_string();
    if to_username.is_empty() {
        return Err(ApiError::missing("toUsername"));
    }

    let from = claims.sub;
    let recipient = with_db(&state, move |db| db.send_friend_request(from, &to_username)).await?;
    info!("{} sent a friend request to {}", claims.username, recipient.username);

    Ok((StatusCode::CREATED, Json(StatusMessage::new("Friend request sent"))))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<RespondFriendRequest>, ApiError>,
) -> ApiResult<Json<StatusMessage>> {
    let from = req.from.ok_or_else(|| ApiError::missing("from"))?;
    let to = claims.sub;
    with_db(&state, move |db| db.accept_friend_request(from, to)).await?;

    Ok(Json(StatusMessage::new("Friend request accepted")))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<RespondFriendRequest>, ApiError>,
) -> ApiResult<Json<StatusMessage>> {
    let from = req.from.ok_or_else(|| ApiError::missing("from"))?;
    let to = claims.sub;
    with_db(&state, move |db| db.reject_friend_request(from, to)).await?;

    Ok(Json(StatusMessage::new("Friend request rejected")))
}

pub async fn list_sent(
    State(state): State<AppState>,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<Vec<SentRequest>>> {
    Ok(Json(with_db(&state, move |db| db.list_sent_requests(user_id)).await?))
}

pub async fn list_received(
    State(state): State<AppState>,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<Vec<ReceivedRequest>>> {
    Ok(Json(with_db(&state, move |db| db.list_received_requests(user_id)).await?))
}

pub async fn list_friends(
    State(state): State<AppState>,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(with_db(&state, move |db| db.list_friends(user_id)).await?))
}
