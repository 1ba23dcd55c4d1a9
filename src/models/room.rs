use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Room mode (spec §3): `normal` rooms have no burn semantics at the room
/// level; `burn` rooms destroy themselves once every file has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    Normal,
    Burn,
}

impl RoomMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomMode::Normal => "normal",
            RoomMode::Burn => "burn",
        }
    }
}

impl From<&str> for RoomMode {
    fn from(s: &str) -> Self {
        match s {
            "burn" => RoomMode::Burn,
            _ => RoomMode::Normal,
        }
    }
}

/// Room lifecycle state (spec §3/§4.I). `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Terminating,
    Destroyed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Terminating => "terminating",
            RoomStatus::Destroyed => "destroyed",
        }
    }
}

impl From<&str> for RoomStatus {
    fn from(s: &str) -> Self {
        match s {
            "terminating" => RoomStatus::Terminating,
            "destroyed" => RoomStatus::Destroyed,
            _ => RoomStatus::Active,
        }
    }
}

/// A room row (spec §3 Room entity). `download_lock_count` realizes the
/// refcount design chosen in DESIGN.md over the source's boolean lock; the
/// externally observable `download_in_progress` is `download_lock_count > 0`.
#[derive(Debug, Clone, FromRow)]
pub struct Room {
    pub id: uuid::Uuid,
    pub name: String,
    pub author_display_name: String,
    pub mode: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub is_permanent: bool,
    pub capacity: i32,
    pub remaining_files: i32,
    pub download_lock_count: i32,
    pub last_download_activity: Option<DateTime<Utc>>,
    pub termination_started_at: Option<DateTime<Utc>>,
    pub file_count: i64,
    pub total_size_bytes: i64,
    pub max_files: i64,
    pub max_total_size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn mode(&self) -> RoomMode {
        RoomMode::from(self.mode.as_str())
    }

    pub fn status(&self) -> RoomStatus {
        RoomStatus::from(self.status.as_str())
    }

    pub fn download_in_progress(&self) -> bool {
        self.download_lock_count > 0
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_permanent && self.expires_at < now
    }
}

/// Public-facing room summary, never includes secrets.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: uuid::Uuid,
    pub name: String,
    pub author_display_name: String,
    pub mode: RoomMode,
    pub status: RoomStatus,
    pub expires_at: DateTime<Utc>,
    pub is_permanent: bool,
    pub capacity: i32,
    pub remaining_files: i32,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id,
            name: room.name.clone(),
            author_display_name: room.author_display_name.clone(),
            mode: room.mode(),
            status: room.status(),
            expires_at: room.expires_at,
            is_permanent: room.is_permanent,
            capacity: room.capacity,
            remaining_files: room.remaining_files,
        }
    }
}
