use axum::{
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{
    error::ApiError,
    extractors::{AuthorToken, GuestDevice},
    middleware::rate_limit::extract_client_ip,
    models::AccessEvent,
    AppState,
};

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintQuery {
    pub file_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub signed_url: String,
    pub filename: String,
    pub burn_mode: bool,
    pub room_status: String,
}

/// `GET /download?fileKey=`. Author or guest (spec §6); the file's own room
/// is resolved from `fileKey` before the gate runs.
pub async fn mint(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    GuestDevice(device): GuestDevice,
    Query(query): Query<MintQuery>,
) -> Result<Json<MintResponse>, ApiError> {
    let minted = state
        .download
        .mint(&query.file_key, token.as_deref(), device.as_deref())
        .await?;
    Ok(Json(MintResponse {
        signed_url: minted.signed_url,
        filename: minted.filename,
        burn_mode: minted.burn_mode,
        room_status: minted.room_status,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub file_key: String,
    #[serde(default)]
    pub proxy: bool,
}

/// `GET /preview?fileKey=&proxy=`: same gate as `mint`. With `proxy=true`
/// the bytes are streamed back through this server (for viewers that can't
/// follow a cross-origin redirect to the object store); otherwise this is
/// just `mint` under a route name the frontend's inline preview iframe uses.
pub async fn preview(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    GuestDevice(device): GuestDevice,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, ApiError> {
    if !query.proxy {
        let minted = mint(
            State(state),
            AuthorToken(token),
            GuestDevice(device),
            Query(MintQuery { file_key: query.file_key }),
        )
        .await?;
        return Ok(minted.into_response());
    }

    let preview = state
        .download
        .preview_bytes(&query.file_key, token.as_deref(), device.as_deref())
        .await?;

    let content_type = preview
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!("inline; filename=\"{}\"", preview.filename.replace('"', "'"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(preview.bytes),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub room: Uuid,
}

/// `POST /download/start`. Author or guest.
pub async fn start(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    GuestDevice(device): GuestDevice,
    Json(body): Json<StartRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .download
        .start(body.room, token.as_deref(), device.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    pub room: Uuid,
    pub file_id: Uuid,
    pub success: bool,
}

/// `POST /download/end`. Author or guest.
pub async fn end(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AuthorToken(token): AuthorToken,
    GuestDevice(device): GuestDevice,
    Json(body): Json<EndRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .download
        .end(body.room, body.file_id, body.success, token.as_deref(), device.as_deref())
        .await?;

    if body.success {
        let ip = extract_client_ip(&headers, Some(addr.ip()));
        state
            .access_log
            .log(body.room, AccessEvent::FileDownload, ip, user_agent(&headers), None, device.as_deref())
            .await;
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMarkRequest {
    pub room: Uuid,
    pub file_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMarkResponse {
    pub marked: i64,
}

/// `POST /download/bulk-mark`. Author or guest.
pub async fn bulk_mark(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    GuestDevice(device): GuestDevice,
    Json(body): Json<BulkMarkRequest>,
) -> Result<Json<BulkMarkResponse>, ApiError> {
    let marked = state
        .download
        .bulk_mark(body.room, &body.file_ids, token.as_deref(), device.as_deref())
        .await?;
    Ok(Json(BulkMarkResponse { marked }))
}
