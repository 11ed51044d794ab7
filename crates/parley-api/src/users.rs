use axum::{
    Extension, Json,
    extract::{Path, State},
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use parley_types::api::Claims;
use parley_types::models::UserProfile;

use crate::auth::{AppState, with_db};
use crate::error::{ApiError, ApiResult};

/// Any authenticated user may read any profile. The credential is never
/// part of the response.
pub async fn get_profile(
    State(state): State<AppState>,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<UserProfile>> {
    with_db(&state, move |db| db.get_profile(user_id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}
