use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    extractors::AuthorToken,
    models::{RoomMode, RoomSummary},
    services::{CapacityGauge, NewRoom},
    utils::validation::{is_not_empty, is_valid_password_hash},
    AppState,
};

/// Default room lifetime when a client omits `ttlHours` (spec §3 Room
/// entity has no inherent default — this mirrors the 24h/30-day bounds the
/// frontend's create-room form already enforces).
const DEFAULT_TTL_HOURS: i64 = 24;
const MAX_TTL_HOURS: i64 = 24 * 30;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    pub author_display_name: String,
    #[serde(default)]
    pub mode: Option<String>,
    pub password_hash: String,
    pub capacity: Option<i32>,
    #[serde(default)]
    pub is_permanent: bool,
    pub ttl_hours: Option<i64>,
    pub max_files: Option<i64>,
    pub max_total_size_bytes: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room: RoomSummary,
    pub author_token: String,
}

/// `POST /rooms` (spec §4.A / §6).
pub async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    if !is_not_empty(&body.name) {
        return Err(ApiError::BadInput("name must not be empty".into()));
    }
    if !is_not_empty(&body.author_display_name) {
        return Err(ApiError::BadInput("authorDisplayName must not be empty".into()));
    }
    if !is_valid_password_hash(&body.password_hash) {
        return Err(ApiError::BadInput(
            "passwordHash must be a 64-char lowercase hex digest".into(),
        ));
    }

    let ttl_hours = body.ttl_hours.unwrap_or(DEFAULT_TTL_HOURS).clamp(1, MAX_TTL_HOURS);

    let new_room = NewRoom {
        name: body.name,
        author_display_name: body.author_display_name,
        mode: body
            .mode
            .as_deref()
            .map(RoomMode::from)
            .unwrap_or(RoomMode::Normal),
        password_hash: body.password_hash,
        capacity: body.capacity.unwrap_or(state.settings.capacity.default_capacity),
        is_permanent: body.is_permanent,
        ttl: chrono::Duration::hours(ttl_hours),
        max_files: body.max_files.unwrap_or(state.settings.quota.max_files),
        max_total_size_bytes: body
            .max_total_size_bytes
            .unwrap_or(state.settings.quota.max_total_size_bytes),
    };

    let created = state.room.create(new_room).await?;

    Ok(Json(CreateRoomResponse {
        room: RoomSummary::from(&created.room),
        author_token: created.author_token,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPasswordRequest {
    pub room: Uuid,
    pub password_hash: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPasswordResponse {
    pub valid: bool,
}

/// `POST /rooms/verify-password`.
pub async fn verify_password(
    State(state): State<AppState>,
    Json(body): Json<VerifyPasswordRequest>,
) -> Result<Json<VerifyPasswordResponse>, ApiError> {
    let valid = state.room.verify_password(body.room, &body.password_hash).await?;
    Ok(Json(VerifyPasswordResponse { valid }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAuthorRequest {
    pub room: Uuid,
}

#[derive(Debug, Serialize)]
pub struct VerifyAuthorResponse {
    pub valid: bool,
}

/// `POST /verify-author`. Never errors on a bad/missing token — an invalid
/// author just gets `{ valid: false }`.
pub async fn verify_author(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    Json(body): Json<VerifyAuthorRequest>,
) -> Json<VerifyAuthorResponse> {
    let valid = match token {
        Some(token) => state.identity.is_author_token(body.room, &token).await,
        None => false,
    };

    Json(VerifyAuthorResponse { valid })
}

/// `GET /room-capacity/:room`.
pub async fn capacity(
    State(state): State<AppState>,
    Path(room): Path<Uuid>,
) -> Result<Json<CapacityGauge>, ApiError> {
    let current = state.presence.count_active_guests(room, None).await?;
    let gauge = state.room.capacity_gauge(room, current).await?;
    Ok(Json(gauge))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRoomResponse {
    pub files_deleted: i64,
}

/// `DELETE /delete-room/:room`. Author-only.
pub async fn delete_room(
    State(state): State<AppState>,
    Path(room): Path<Uuid>,
    AuthorToken(token): AuthorToken,
) -> Result<Json<DeleteRoomResponse>, ApiError> {
    let token = token.ok_or(ApiError::Unauthorized)?;
    if !state.identity.is_author_token(room, &token).await {
        return Err(ApiError::Unauthorized);
    }

    let files_deleted = state.lifecycle.delete_room_as_author(room).await?;
    Ok(Json(DeleteRoomResponse { files_deleted }))
}
