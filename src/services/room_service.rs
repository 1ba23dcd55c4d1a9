use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{AccessLog, File, Room, RoomMode},
    services::{QuotaService, S3Service},
};

/// Room creation input, already validated by the handler (password hash
/// shape, UUID-free name checks are not required — names are free text).
pub struct NewRoom {
    pub name: String,
    pub author_display_name: String,
    pub mode: RoomMode,
    pub password_hash: String,
    pub capacity: i32,
    pub is_permanent: bool,
    pub ttl: ChronoDuration,
    pub max_files: i64,
    pub max_total_size_bytes: i64,
}

pub struct CreatedRoom {
    pub room: Room,
    pub author_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityGauge {
    pub current: i64,
    pub max: i32,
    #[serde(rename = "isFull")]
    pub is_full: bool,
    #[serde(rename = "isNearFull")]
    pub is_near_full: bool,
    #[serde(rename = "isUnlimited")]
    pub is_unlimited: bool,
}

/// Covers the HTTP surface (spec §6) with no dedicated component letter of
/// its own: room creation/lookup, the capacity gauge, and per-file metadata
/// edits/deletes. Grounded on the reference backend's CRUD service shape
/// (`hotel_service.rs`, `post_service.rs`): a thin wrapper over a pool with
/// one method per route.
pub struct RoomService {
    db: PgPool,
    s3: Arc<S3Service>,
    quota: QuotaService,
    unlimited_threshold: i32,
}

impl RoomService {
    pub fn new(db: PgPool, s3: Arc<S3Service>, quota: QuotaService, unlimited_threshold: i32) -> Self {
        Self {
            db,
            s3,
            quota,
            unlimited_threshold,
        }
    }

    /// `POST /rooms`. Returns the author token exactly once (spec §3 Room
    /// Secret: "returned exactly once at room creation to the creator").
    pub async fn create(&self, new_room: NewRoom) -> Result<CreatedRoom, ApiError> {
        let id = Uuid::new_v4();
        let author_token = generate_author_token();
        let expires_at = Utc::now() + new_room.ttl;

        let room: Room = sqlx::query_as(
            r#"
            INSERT INTO rooms
                (id, name, author_display_name, mode, status, expires_at, is_permanent,
                 capacity, remaining_files, download_lock_count, max_files, max_total_size_bytes)
            VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, 0, 0, $8, $9)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&new_room.name)
        .bind(&new_room.author_display_name)
        .bind(new_room.mode.as_str())
        .bind(expires_at)
        .bind(new_room.is_permanent)
        .bind(new_room.capacity)
        .bind(new_room.max_files)
        .bind(new_room.max_total_size_bytes)
        .fetch_one(&self.db)
        .await?;

        sqlx::query("INSERT INTO room_secrets (room_id, password_hash, author_token) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(&new_room.password_hash)
            .bind(&author_token)
            .execute(&self.db)
            .await?;

        Ok(CreatedRoom { room, author_token })
    }

    pub async fn get(&self, room: Uuid) -> Result<Room, ApiError> {
        sqlx::query_as("SELECT * FROM rooms WHERE id = $1")
            .bind(room)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("room not found".into()))
    }

    /// `POST /rooms/verify-password`: constant-time-adjacent comparison is
    /// unnecessary here (the hash itself, not a secret derivation, is being
    /// matched against a value the client already computed client-side), but
    /// a plain equality check is sufficient since both sides are hex digests.
    pub async fn verify_password(&self, room: Uuid, password_hash: &str) -> Result<bool, ApiError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM room_secrets WHERE room_id = $1")
                .bind(room)
                .fetch_optional(&self.db)
                .await?;

        Ok(row.map(|(stored,)| stored == password_hash).unwrap_or(false))
    }

    /// `GET /room-capacity/:room` (spec §4.C / §6).
    pub async fn capacity_gauge(&self, room: Uuid, current: i64) -> Result<CapacityGauge, ApiError> {
        let room_row = self.get(room).await?;
        let is_unlimited = room_row.capacity >= self.unlimited_threshold;

        Ok(CapacityGauge {
            current,
            max: room_row.capacity,
            is_full: !is_unlimited && current >= room_row.capacity as i64,
            is_near_full: !is_unlimited && current >= (room_row.capacity as i64 * 8 / 10),
            is_unlimited,
        })
    }

    /// `PATCH /update-file/:id`. Returns the file's room id alongside the
    /// updated row so the caller can verify author ownership before calling.
    pub async fn file_room(&self, file_id: Uuid) -> Result<Uuid, ApiError> {
        sqlx::query_scalar("SELECT room_id FROM files WHERE id = $1")
            .bind(file_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("file not found".into()))
    }

    pub async fn update_file(
        &self,
        file_id: Uuid,
        target_url: Option<&str>,
        description: Option<&str>,
    ) -> Result<File, ApiError> {
        sqlx::query_as(
            r#"
            UPDATE files SET target_url = COALESCE($2, target_url), description = COALESCE($3, description)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(file_id)
        .bind(target_url)
        .bind(description)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("file not found".into()))
    }

    /// `DELETE /delete-file/:id`: best-effort blob delete, quota release,
    /// then the row itself.
    pub async fn delete_file(&self, file_id: Uuid) -> Result<(), ApiError> {
        let file: Option<File> = sqlx::query_as("SELECT * FROM files WHERE id = $1")
            .bind(file_id)
            .fetch_optional(&self.db)
            .await?;

        let Some(file) = file else {
            return Err(ApiError::NotFound("file not found".into()));
        };

        if let Err(err) = self.s3.delete_object(&file.blob_key).await {
            tracing::warn!("delete_file: failed to delete blob {}: {err:?}", file.blob_key);
        }

        sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(file_id)
            .execute(&self.db)
            .await?;

        self.quota.release_file(file.room_id, file.size_bytes).await?;

        Ok(())
    }

    /// `GET /access-logs/:room`: raw log rows, author-only.
    pub async fn list_access_logs(&self, room: Uuid) -> Result<Vec<AccessLog>, ApiError> {
        let logs = sqlx::query_as("SELECT * FROM access_logs WHERE room_id = $1 ORDER BY created_at DESC")
            .bind(room)
            .fetch_all(&self.db)
            .await?;

        Ok(logs)
    }

    /// `GET /room-access/activity/:room`: a merged, author-facing feed of
    /// presence rows and access-log events, newest first.
    pub async fn activity_feed(&self, room: Uuid) -> Result<Vec<ActivityEntry>, ApiError> {
        let rows: Vec<(String, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT event_type, device, timestamp FROM (
                SELECT
                    CASE WHEN status = 'active' THEN 'presence_active' ELSE 'presence_left' END AS event_type,
                    device,
                    last_seen_at AS timestamp
                FROM room_presence
                WHERE room_id = $1
                UNION ALL
                SELECT event_type, device, created_at AS timestamp
                FROM access_logs
                WHERE room_id = $1
            ) merged
            ORDER BY timestamp DESC
            "#,
        )
        .bind(room)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(event_type, device, timestamp)| ActivityEntry {
                event_type,
                device,
                timestamp,
            })
            .collect())
    }
}

/// One row of the merged activity feed (spec §6 `{activities[]}`): either a
/// presence transition or an access-log event, flattened to a common shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub event_type: String,
    pub device: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 256 bits of randomness, hex-encoded — comfortably over the spec's "≥128
/// bits" floor for the opaque author token (spec §3 Room Secret).
fn generate_author_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
