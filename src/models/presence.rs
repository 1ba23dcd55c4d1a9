use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A presence row (spec §3 Presence Record). Authors are never inserted
/// here (spec §3) — they are identified solely by their author token.
#[derive(Debug, Clone, FromRow)]
pub struct PresenceRecord {
    pub room_id: uuid::Uuid,
    pub device: String,
    pub is_author: bool,
    pub status: String,
    pub last_seen_at: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn is_active(&self, now: DateTime<Utc>, active_window: chrono::Duration) -> bool {
        self.status == "active" && now - self.last_seen_at <= active_window
    }
}
