use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{config::CapacityConfig, error::ApiError, models::PresenceRecord};

/// Outcome of the capacity gate (spec §4.C) guarding a non-author join or
/// heartbeat.
pub struct AdmitResult {
    pub admitted: bool,
    pub used: i64,
    pub capacity: i32,
}

/// Presence store and capacity gate (spec §4.B/§4.C).
pub struct PresenceService {
    db: PgPool,
    capacity: CapacityConfig,
}

impl PresenceService {
    pub fn new(db: PgPool, capacity: CapacityConfig) -> Self {
        Self { db, capacity }
    }

    /// `Upsert(room, device, is_author)`: sets `last_seen_at = now`,
    /// `status = active`.
    pub async fn upsert(&self, room: Uuid, device: &str, is_author: bool) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO room_presence (room_id, device, is_author, status, last_seen_at)
            VALUES ($1, $2, $3, 'active', NOW())
            ON CONFLICT (room_id, device) DO UPDATE
            SET status = 'active', last_seen_at = NOW(), is_author = $3
            "#,
        )
        .bind(room)
        .bind(device)
        .bind(is_author)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// `MarkLeft(room, device)`: only transitions a currently `active` row,
    /// safe for `sendBeacon`-style fire-and-forget leave calls.
    pub async fn mark_left(&self, room: Uuid, device: &str) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE room_presence SET status = 'left' WHERE room_id = $1 AND device = $2 AND status = 'active'",
        )
        .bind(room)
        .bind(device)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// `CountActiveGuests(room, excludeDevice?) → n`. Active means `status =
    /// active` and `last_seen_at` within the configured active window (spec
    /// §4.B, default 120s) — capacity uses "guests now", not "guests ever"
    /// (open question 1, resolved in DESIGN.md).
    pub async fn count_active_guests(
        &self,
        room: Uuid,
        exclude_device: Option<&str>,
    ) -> Result<i64, ApiError> {
        let cutoff = Utc::now() - self.capacity.active_window;

        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM room_presence
            WHERE room_id = $1
              AND status = 'active'
              AND last_seen_at >= $2
              AND is_author = FALSE
              AND ($3::TEXT IS NULL OR device <> $3)
            "#,
        )
        .bind(room)
        .bind(cutoff)
        .bind(exclude_device)
        .fetch_one(&self.db)
        .await?;

        Ok(count.0)
    }

    /// `AssignGuestNumber(room, device) → n`: idempotent and race-free under
    /// concurrent first-joins via the `assign_user_number` stored procedure
    /// (spec §6), which performs the read-or-reserve dance in one
    /// transaction server-side.
    pub async fn assign_guest_number(&self, room: Uuid, device: &str) -> Result<i32, ApiError> {
        let (number,): (i32,) = sqlx::query_as("SELECT assign_user_number($1, $2)")
            .bind(room)
            .bind(device)
            .fetch_one(&self.db)
            .await?;

        Ok(number)
    }

    /// Capacity Gate (spec §4.C): capacities at or above the configured
    /// unlimited threshold admit unconditionally; otherwise the requester
    /// is excluded from its own count so a rejoining guest is never
    /// double-counted against itself.
    pub async fn admit(
        &self,
        room: Uuid,
        device: &str,
        capacity: i32,
    ) -> Result<AdmitResult, ApiError> {
        if capacity >= self.capacity.unlimited_threshold {
            self.upsert(room, device, false).await?;
            return Ok(AdmitResult {
                admitted: true,
                used: 0,
                capacity,
            });
        }

        let used = self.count_active_guests(room, Some(device)).await?;
        let admitted = used < capacity as i64;

        if admitted {
            self.upsert(room, device, false).await?;
        }

        Ok(AdmitResult {
            admitted,
            used,
            capacity,
        })
    }

    pub async fn get(&self, room: Uuid, device: &str) -> Result<Option<PresenceRecord>, ApiError> {
        let row = sqlx::query_as::<_, PresenceRecord>(
            "SELECT * FROM room_presence WHERE room_id = $1 AND device = $2",
        )
        .bind(room)
        .bind(device)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }
}
