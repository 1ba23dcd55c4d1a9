use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;

use crate::{
    error::ApiError,
    handlers::{access_logs, analytics, bulk, download, files, invite, room_access, rooms, upload},
    middleware::rate_limit::extract_client_ip,
    AppState,
};

pub mod health;

/// Blanket per-IP ceiling applied before any per-route class (spec §4.D:
/// "global ... applied before per-route").
async fn global_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_global(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// Rejects with `503` + `Retry-After` for the routes spec §4.D names as
/// "heavy" (upload init, presigned, invite, admin, activity) whenever the
/// overload guard's cached reading says the process is shedding.
async fn overload_gate(state: &AppState) -> Result<(), ApiError> {
    if state.overload.is_overloaded() {
        return Err(ApiError::Overloaded {
            retry_after_secs: state.overload.retry_after_secs(),
        });
    }
    Ok(())
}

/// `upload (form/multipart init)`: 15 min / 30, plus overload shedding.
async fn upload_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    if let Err(err) = overload_gate(&state).await {
        return err.into_response();
    }

    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_upload(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// `presigned URL mint`: 1 min / 12, plus overload shedding.
async fn presign_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    if let Err(err) = overload_gate(&state).await {
        return err.into_response();
    }

    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_presign(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// `download (any)`: 15 min / 80. Not on the overload guard's heavy-route
/// list — an in-flight download must still be allowed to finish its
/// lock/unlock handshake even while the process is shedding elsewhere.
async fn download_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_download(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// `room-access join / password`: 1 min / 4, the strictest class.
async fn room_access_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_room_access(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// `presence heartbeat`: 1 min / 12, loose enough for >=5s polling.
async fn heartbeat_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_heartbeat(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// `activity feed`: 1 min / 60, plus overload shedding (spec §4.D heavy list).
async fn activity_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    if let Err(err) = overload_gate(&state).await {
        return err.into_response();
    }

    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_activity(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// `delete`: 1 min / 8.
async fn delete_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_delete(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// `analytics-admin`: 1 min / 20, plus overload shedding.
async fn admin_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Request,
    next: Next,
) -> Response {
    if let Err(err) = overload_gate(&state).await {
        return err.into_response();
    }

    let ip = extract_client_ip(&headers, Some(addr.ip()));
    match state.limiters.check_admin(ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// Invite is overload-shed but not re-rate-limited here: `InviteService`
/// already consumes its four gates (spec §4.J) before the outbound send.
async fn invite_overload(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Err(err) = overload_gate(&state).await {
        return err.into_response();
    }
    next.run(req).await
}

/// Assembles the room coordination backend's HTTP surface (spec §6), nested
/// under `/api` by the caller. Grouped by rate-limit class the same way the
/// reference backend groups its CMS routes by auth/rate tier in this module,
/// each group getting its own `from_fn_with_state` layer so a request must
/// clear both its group's limiter and the blanket global limiter, applied
/// last as the outermost layer.
pub fn api_routes(state: AppState) -> Router<AppState> {
    let room_access_routes = Router::new()
        .route("/room-access", post(room_access::join))
        .route("/rooms/verify-password", post(rooms::verify_password))
        .layer(from_fn_with_state(state.clone(), room_access_limit));

    let heartbeat_routes = Router::new()
        .route("/room-access/presence", post(room_access::heartbeat))
        .route("/room-access/leave", post(room_access::leave))
        .layer(from_fn_with_state(state.clone(), heartbeat_limit));

    let activity_routes = Router::new()
        .route("/room-access/activity/:room", get(room_access::activity))
        .layer(from_fn_with_state(state.clone(), activity_limit));

    let upload_routes = Router::new()
        .route("/multipart-upload/initiate", post(upload::initiate))
        .route("/multipart-upload/complete", post(upload::complete))
        .route("/multipart-upload/abort", post(upload::abort))
        .layer(from_fn_with_state(state.clone(), upload_limit));

    let presign_routes = Router::new()
        .route("/presigned-upload", post(upload::presigned_upload))
        .route("/multipart-upload/get-part-urls", post(upload::get_part_urls))
        .layer(from_fn_with_state(state.clone(), presign_limit));

    let download_routes = Router::new()
        .route("/download", get(download::mint))
        .route("/preview", get(download::preview))
        .route("/download/start", post(download::start))
        .route("/download/end", post(download::end))
        .route("/download/bulk-mark", post(download::bulk_mark))
        .route("/bulk-download", get(bulk::bulk_download))
        .layer(from_fn_with_state(state.clone(), download_limit));

    let delete_routes = Router::new()
        .route("/delete-file/:id", delete(files::delete_file))
        .route("/delete-room/:id", delete(rooms::delete_room))
        .layer(from_fn_with_state(state.clone(), delete_limit));

    let invite_routes = Router::new()
        .route("/invite", post(invite::send_invite))
        .layer(from_fn_with_state(state.clone(), invite_overload));

    let admin_routes = Router::new()
        .route("/analytics-admin/stats", get(analytics::admin_stats))
        .route("/analytics-admin/reap", post(analytics::admin_reap))
        .layer(from_fn_with_state(state.clone(), admin_limit));

    // Unclassed routes: spec §4.D's table has no dedicated bucket for these,
    // so they sit behind only the blanket global limiter below.
    let unclassed = Router::new()
        .route("/rooms", post(rooms::create_room))
        .route("/verify-author", post(rooms::verify_author))
        .route("/room-capacity/:room", get(rooms::capacity))
        .route("/update-file/:id", patch(files::update_file))
        .route("/access-logs/:room", get(access_logs::list))
        .route("/analytics/live", get(analytics::live));

    Router::new()
        .merge(room_access_routes)
        .merge(heartbeat_routes)
        .merge(activity_routes)
        .merge(upload_routes)
        .merge(presign_routes)
        .merge(download_routes)
        .merge(delete_routes)
        .merge(invite_routes)
        .merge(admin_routes)
        .merge(unclassed)
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::live_check))
        .layer(from_fn_with_state(state, global_limit))
}
