use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap},
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{error::ApiError, middleware::rate_limit::extract_client_ip, models::AccessEvent, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub room: Uuid,
    pub recipient_email: String,
    pub share_link: Option<String>,
}

/// `POST /invite` (spec §4.J).
pub async fn send_invite(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<InviteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ip = extract_client_ip(&headers, Some(addr.ip()));

    state
        .invite
        .send_invite(ip, body.room, &body.recipient_email, body.share_link.as_deref())
        .await?;

    let user_agent = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok());
    state
        .access_log
        .log(body.room, AccessEvent::InviteSent, ip, user_agent, None, None)
        .await;

    Ok(Json(serde_json::json!({ "ok": true })))
}
