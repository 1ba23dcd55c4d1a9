use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{
    error::ApiError,
    extractors::AuthorToken,
    middleware::rate_limit::extract_client_ip,
    models::{AccessEvent, File},
    services::CompletedPartInput,
    AppState,
};

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}

async fn require_author(state: &AppState, room: Uuid, token: Option<&str>) -> Result<(), ApiError> {
    let token = token.ok_or(ApiError::Unauthorized)?;
    if !state.identity.is_author_token(room, token).await {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUploadRequest {
    pub room: Uuid,
    pub filename: String,
    pub file_size: i64,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUploadResponse {
    pub upload_url: String,
    pub file_id: Uuid,
    pub file_key: String,
}

/// `POST /presigned-upload`: the single-PUT shortcut for small files.
pub async fn presigned_upload(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    Json(body): Json<PresignedUploadRequest>,
) -> Result<Json<PresignedUploadResponse>, ApiError> {
    require_author(&state, body.room, token.as_deref()).await?;

    let result = state
        .upload
        .presigned_upload(body.room, &body.filename, body.file_size, body.content_type.as_deref())
        .await?;

    Ok(Json(PresignedUploadResponse {
        upload_url: result.upload_url,
        file_id: result.file_id,
        file_key: result.file_key,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub room: Uuid,
    pub filename: String,
    pub file_size: i64,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub upload_id: String,
    pub file_key: String,
    pub file_id: Uuid,
}

/// `POST /multipart-upload/initiate` (spec §4.E phase 1).
pub async fn initiate(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    Json(body): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>, ApiError> {
    require_author(&state, body.room, token.as_deref()).await?;

    let result = state
        .upload
        .initiate(body.room, &body.filename, body.file_size, body.content_type.as_deref())
        .await?;

    Ok(Json(InitiateResponse {
        upload_id: result.upload_id,
        file_key: result.file_key,
        file_id: result.file_id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlsRequest {
    pub room: Uuid,
    pub file_key: String,
    pub upload_id: String,
    pub part_numbers: Vec<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedPartView {
    pub part_number: i32,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PartUrlsResponse {
    pub parts: Vec<PresignedPartView>,
}

/// `POST /multipart-upload/get-part-urls` (spec §4.E phase 2).
pub async fn get_part_urls(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    Json(body): Json<PartUrlsRequest>,
) -> Result<Json<PartUrlsResponse>, ApiError> {
    require_author(&state, body.room, token.as_deref()).await?;

    let parts = state
        .upload
        .sign_part_urls(&body.file_key, &body.upload_id, &body.part_numbers)
        .await?;

    Ok(Json(PartUrlsResponse {
        parts: parts
            .into_iter()
            .map(|(part_number, url)| PresignedPartView { part_number, url })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPartView {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub room: Uuid,
    pub file_id: Uuid,
    pub file_key: String,
    pub filename: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub message: Option<String>,
    /// Absent for the single-PUT shortcut; present for multipart completion.
    pub upload_id: Option<String>,
    #[serde(default)]
    pub parts: Vec<CompletedPartView>,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub file: File,
}

/// `POST /multipart-upload/complete` (spec §4.E phase 3). Also finalizes the
/// single-PUT shortcut when `uploadId` is omitted.
pub async fn complete(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AuthorToken(token): AuthorToken,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    require_author(&state, body.room, token.as_deref()).await?;

    let file = match body.upload_id.as_deref() {
        Some(upload_id) => {
            let parts = body
                .parts
                .into_iter()
                .map(|p| CompletedPartInput {
                    part_number: p.part_number,
                    etag: p.etag,
                })
                .collect();

            state
                .upload
                .complete(
                    body.room,
                    body.file_id,
                    upload_id,
                    &body.file_key,
                    &body.filename,
                    body.file_size,
                    body.content_type.as_deref(),
                    body.message.as_deref(),
                    parts,
                )
                .await?
        }
        None => {
            state
                .upload
                .complete_direct(
                    body.room,
                    body.file_id,
                    &body.file_key,
                    &body.filename,
                    body.file_size,
                    body.content_type.as_deref(),
                    body.message.as_deref(),
                )
                .await?
        }
    };

    let ip = extract_client_ip(&headers, Some(addr.ip()));
    state
        .access_log
        .log(body.room, AccessEvent::FileUpload, ip, user_agent(&headers), None, None)
        .await;

    Ok(Json(CompleteResponse { file }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortRequest {
    pub room: Uuid,
    pub file_key: String,
    pub upload_id: String,
}

/// `POST /multipart-upload/abort` (spec §4.E phase 4).
pub async fn abort(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    Json(body): Json<AbortRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_author(&state, body.room, token.as_deref()).await?;
    state.upload.abort(&body.file_key, &body.upload_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
