use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::{error::ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct LiveResponse {
    pub overloaded: bool,
}

/// `GET /analytics/live`: public, cheap, never shed or rate-limited (spec
/// §4.D light-route carve-out) since the frontend polls it to decide
/// whether to warn users before they start an upload.
pub async fn live(State(state): State<AppState>) -> Json<LiveResponse> {
    Json(LiveResponse {
        overloaded: state.overload.is_overloaded(),
    })
}

/// Constant-time-ish bearer check against the configured admin token. The
/// route returns 404 rather than 401/403 on failure so its existence isn't
/// disclosed to unauthenticated callers (spec §4.L admin surface note).
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let configured = state.settings.admin_bearer_token.as_str();
    if configured.is_empty() {
        return Err(ApiError::NotFound("not found".into()));
    }

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if constant_time_eq(token.as_bytes(), configured.as_bytes()) => Ok(()),
        _ => Err(ApiError::NotFound("not found".into())),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatsResponse {
    pub total_rooms: i64,
    pub active_rooms: i64,
    pub total_files: i64,
    pub total_bytes_stored: i64,
}

/// `GET /analytics-admin/stats`.
pub async fn admin_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminStatsResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let (total_rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
        .fetch_one(&state.db)
        .await?;

    let (active_rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms WHERE status = 'active'")
        .fetch_one(&state.db)
        .await?;

    let (total_files,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE file_status = 'live'")
        .fetch_one(&state.db)
        .await?;

    let (total_bytes_stored,): (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(size_bytes), 0) FROM files WHERE file_status = 'live'")
            .fetch_one(&state.db)
            .await?;

    Ok(Json(AdminStatsResponse {
        total_rooms,
        active_rooms,
        total_files,
        total_bytes_stored,
    }))
}

/// `POST /analytics-admin/reap`: triggers an out-of-band reaper pass on
/// demand, independent of the background interval loop in `main`.
pub async fn admin_reap(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers)?;
    state.reaper.run_once().await;
    Ok(StatusCode::NO_CONTENT)
}
