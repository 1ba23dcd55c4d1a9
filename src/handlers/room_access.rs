use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
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
    services::ActivityEntry,
    AppState,
};

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_number: Option<i32>,
}

/// `POST /room-access`: the author path is recognized by token alone and
/// never touches presence or the capacity gate (spec §3 "Authors are never
/// inserted" into the presence store); everyone else goes through
/// `PresenceService::admit`.
pub async fn join(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AuthorToken(token): AuthorToken,
    GuestDevice(device): GuestDevice,
    Json(body): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    if let Some(token) = token.as_deref() {
        if state.identity.is_author_token(body.room, token).await {
            return Ok(Json(JoinResponse {
                role: "author",
                guest_number: None,
            }));
        }
    }

    let device = device.ok_or_else(|| ApiError::BadInput("missing X-Device-Id header".into()))?;
    let room = state.room.get(body.room).await?;

    let admitted = state.presence.admit(body.room, &device, room.capacity).await?;
    if !admitted.admitted {
        return Err(ApiError::RoomFull);
    }

    let guest_number = state.presence.assign_guest_number(body.room, &device).await?;

    let ip = extract_client_ip(&headers, Some(addr.ip()));
    state
        .access_log
        .log(body.room, AccessEvent::RoomAccess, ip, user_agent(&headers), None, Some(&device))
        .await;

    Ok(Json(JoinResponse {
        role: "guest",
        guest_number: Some(guest_number),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRequest {
    pub room: Uuid,
}

/// `POST /room-access/presence`: heartbeat. Always *served* (spec §4.D light-
/// route carve-out — never rate-limited or overload-shed), but still runs
/// through the Capacity Gate for non-author devices (spec §4.C: "before
/// admitting a join or heartbeat"; scenario S2 exercises this directly via
/// repeated heartbeats, not just the initial join).
pub async fn heartbeat(
    State(state): State<AppState>,
    AuthorToken(token): AuthorToken,
    GuestDevice(device): GuestDevice,
    Json(body): Json<PresenceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(token) = token.as_deref() {
        if state.identity.is_author_token(body.room, token).await {
            // Authors are never inserted into the presence store (spec §3);
            // their heartbeat is a no-op liveness ping only.
            return Ok(Json(serde_json::json!({ "ok": true })));
        }
    }

    let device = device.ok_or_else(|| ApiError::BadInput("missing X-Device-Id header".into()))?;
    let room = state.room.get(body.room).await?;

    let admitted = state.presence.admit(body.room, &device, room.capacity).await?;
    if !admitted.admitted {
        return Err(ApiError::RoomFull);
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /room-access/leave`: fire-and-forget, safe for `sendBeacon`.
pub async fn leave(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    GuestDevice(device): GuestDevice,
    Json(body): Json<PresenceRequest>,
) -> Result<StatusCode, ApiError> {
    let device = device.ok_or_else(|| ApiError::BadInput("missing X-Device-Id header".into()))?;
    state.presence.mark_left(body.room, &device).await?;

    let ip = extract_client_ip(&headers, Some(addr.ip()));
    state
        .access_log
        .log(body.room, AccessEvent::Leave, ip, user_agent(&headers), None, Some(&device))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub activities: Vec<ActivityEntry>,
}

/// `GET /room-access/activity/:room`. Author-only.
pub async fn activity(
    State(state): State<AppState>,
    Path(room): Path<Uuid>,
    AuthorToken(token): AuthorToken,
) -> Result<Json<ActivityResponse>, ApiError> {
    let token = token.ok_or(ApiError::Unauthorized)?;
    if !state.identity.is_author_token(room, &token).await {
        return Err(ApiError::Unauthorized);
    }

    let activities = state.room.activity_feed(room).await?;
    Ok(Json(ActivityResponse { activities }))
}
