use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Live,
    Destroyed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Live => "live",
            FileStatus::Destroyed => "destroyed",
        }
    }
}

impl From<&str> for FileStatus {
    fn from(s: &str) -> Self {
        match s {
            "destroyed" => FileStatus::Destroyed,
            _ => FileStatus::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Unknown,
    Safe,
    Risky,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Unknown => "unknown",
            ScanStatus::Safe => "safe",
            ScanStatus::Risky => "risky",
        }
    }
}

impl From<&str> for ScanStatus {
    fn from(s: &str) -> Self {
        match s {
            "safe" => ScanStatus::Safe,
            "risky" => ScanStatus::Risky,
            _ => ScanStatus::Unknown,
        }
    }
}

/// A file row (spec §3 File entity).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct File {
    pub id: uuid::Uuid,
    pub room_id: uuid::Uuid,
    pub filename: String,
    pub blob_key: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub download_count: i32,
    pub file_status: String,
    pub burn_after_download: bool,
    pub scan_status: String,
    pub scan_result: Option<String>,
    pub message: Option<String>,
    pub target_url: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl File {
    pub fn status(&self) -> FileStatus {
        FileStatus::from(self.file_status.as_str())
    }

    pub fn scan_status(&self) -> ScanStatus {
        ScanStatus::from(self.scan_status.as_str())
    }

    /// Whether this file destroys itself after a single successful
    /// download, independent of room mode (spec §3/§4.G).
    pub fn is_one_shot(&self, room_mode: super::RoomMode) -> bool {
        self.burn_after_download || room_mode == super::RoomMode::Burn
    }
}
