use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Access-log event kinds (spec §3 Access Log).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessEvent {
    RoomAccess,
    Leave,
    FileUpload,
    FileDownload,
    BulkDownload,
    InviteSent,
}

impl AccessEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessEvent::RoomAccess => "room_access",
            AccessEvent::Leave => "leave",
            AccessEvent::FileUpload => "file_upload",
            AccessEvent::FileDownload => "file_download",
            AccessEvent::BulkDownload => "bulk_download",
            AccessEvent::InviteSent => "invite_sent",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccessLog {
    pub id: uuid::Uuid,
    pub room_id: uuid::Uuid,
    pub event_type: String,
    pub device: Option<String>,
    pub session: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
}
