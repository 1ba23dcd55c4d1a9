use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::ApiError, extractors::AuthorToken, models::AccessLog, AppState};

#[derive(Debug, Serialize)]
pub struct AccessLogsResponse {
    pub logs: Vec<AccessLog>,
}

/// `GET /access-logs/:room`. Author-only.
pub async fn list(
    State(state): State<AppState>,
    Path(room): Path<Uuid>,
    AuthorToken(token): AuthorToken,
) -> Result<Json<AccessLogsResponse>, ApiError> {
    let token = token.ok_or(ApiError::Unauthorized)?;
    if !state.identity.is_author_token(room, &token).await {
        return Err(ApiError::Unauthorized);
    }

    let logs = state.room.list_access_logs(room).await?;
    Ok(Json(AccessLogsResponse { logs }))
}
