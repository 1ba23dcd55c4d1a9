use std::sync::Arc;

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use config::Settings;
use middleware::{overload::OverloadGuard, RouteLimiters};
use services::{
    AccessLogService, BulkService, DownloadService, IdentityService, InviteService,
    LifecycleService, PresenceService, ReaperService, RoomService, S3Service, UploadService,
};

/// Shared application state. Most fields are `Arc`-wrapped: `Scheduler`
/// (inside `LifecycleService`), `RouteLimiters`' token buckets, and
/// `AccessLogService`'s dedup cache all carry real process state that must be
/// shared across every request, not rebuilt per-handler the way the
/// reference backend's lightweight CRUD services once were.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub settings: Arc<Settings>,
    pub s3: Arc<S3Service>,
    pub identity: Arc<IdentityService>,
    pub presence: Arc<PresenceService>,
    pub room: Arc<RoomService>,
    pub upload: Arc<UploadService>,
    pub download: Arc<DownloadService>,
    pub bulk: Arc<BulkService>,
    pub lifecycle: Arc<LifecycleService>,
    pub invite: Arc<InviteService>,
    pub access_log: Arc<AccessLogService>,
    pub reaper: Arc<ReaperService>,
    pub limiters: Arc<RouteLimiters>,
    pub overload: Arc<OverloadGuard>,
}
