use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, extractors::AuthorToken, models::File, utils::validation::is_valid_target_url, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFileRequest {
    pub target_url: Option<String>,
    pub description: Option<String>,
}

/// `PATCH /update-file/:fileId`. Author-only, verified via the file's owning
/// room rather than a room id in the path.
pub async fn update_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    AuthorToken(token): AuthorToken,
    Json(body): Json<UpdateFileRequest>,
) -> Result<Json<File>, ApiError> {
    let token = token.ok_or(ApiError::Unauthorized)?;
    let room = state.room.file_room(file_id).await?;
    if !state.identity.is_author_token(room, &token).await {
        return Err(ApiError::Unauthorized);
    }

    if let Some(url) = body.target_url.as_deref() {
        if !is_valid_target_url(url) {
            return Err(ApiError::BadInput("targetUrl is not a valid http(s) URL".into()));
        }
    }

    let file = state
        .room
        .update_file(file_id, body.target_url.as_deref(), body.description.as_deref())
        .await?;

    Ok(Json(file))
}

/// `DELETE /delete-file/:fileId`. Author-only.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    AuthorToken(token): AuthorToken,
) -> Result<StatusCode, ApiError> {
    let token = token.ok_or(ApiError::Unauthorized)?;
    let room = state.room.file_room(file_id).await?;
    if !state.identity.is_author_token(room, &token).await {
        return Err(ApiError::Unauthorized);
    }

    state.room.delete_file(file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
