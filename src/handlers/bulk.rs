use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{error::ApiError, middleware::rate_limit::extract_client_ip, models::AccessEvent, AppState};

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDownloadQuery {
    pub room_id: Uuid,
}

/// `GET /bulk-download?roomId=`: streams the whole room as a single zip
/// (spec §4.H). Individual member failures are swallowed by the archiver;
/// a completely empty room is a 404, not an empty zip. Access is public per
/// spec §6 but still emits `bulk_download` once per request.
pub async fn bulk_download(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<BulkDownloadQuery>,
) -> Result<Response, ApiError> {
    let archive = state.bulk.build_archive(query.room_id).await?;

    let ip = extract_client_ip(&headers, Some(addr.ip()));
    state
        .access_log
        .log(query.room_id, AccessEvent::BulkDownload, ip, user_agent(&headers), None, None)
        .await;

    let disposition = format!("attachment; filename=\"{}\"", archive.archive_filename);

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}
