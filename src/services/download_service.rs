use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    config::CapacityConfig,
    error::ApiError,
    extractors::auth::Authorized,
    models::{File, FileStatus, Room, RoomMode},
    services::{IdentityService, LifecycleService, S3Service},
};

const SIGNED_URL_TTL: Duration = Duration::from_secs(5 * 60);

pub struct MintedDownload {
    pub signed_url: String,
    pub filename: String,
    pub burn_mode: bool,
    pub room_status: String,
}

pub struct PreviewBytes {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub filename: String,
}

/// Download Coordinator (spec §4.G): the state machine in the diagram from
/// mint → start → end, with the burn/one-time destruction saga handed off
/// to `LifecycleService` once a burn file's download completes.
pub struct DownloadService {
    db: PgPool,
    s3: Arc<S3Service>,
    identity: Arc<IdentityService>,
    lifecycle: Arc<LifecycleService>,
    capacity: CapacityConfig,
}

impl DownloadService {
    pub fn new(
        db: PgPool,
        s3: Arc<S3Service>,
        identity: Arc<IdentityService>,
        lifecycle: Arc<LifecycleService>,
        capacity: CapacityConfig,
    ) -> Self {
        Self {
            db,
            s3,
            identity,
            lifecycle,
            capacity,
        }
    }

    /// Author-or-guest gate (spec §6) shared by every download route.
    async fn authorize(&self, room: Uuid, token: Option<&str>, device: Option<&str>) -> Result<(), ApiError> {
        match self.identity.authorize(room, token, device).await {
            Authorized::Unauthorized => Err(ApiError::Unauthorized),
            _ => Ok(()),
        }
    }

    async fn load_room(&self, room: Uuid) -> Result<Room, ApiError> {
        sqlx::query_as("SELECT * FROM rooms WHERE id = $1")
            .bind(room)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("room not found".into()))
    }

    async fn load_file(&self, file_key: &str) -> Result<File, ApiError> {
        sqlx::query_as("SELECT * FROM files WHERE blob_key = $1")
            .bind(file_key)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("file not found".into()))
    }

    /// `GET /download?fileKey=`: mints a 5-minute signed URL after checking
    /// file/room state and the burn busy/already-downloaded rules.
    pub async fn mint(&self, file_key: &str, token: Option<&str>, device: Option<&str>) -> Result<MintedDownload, ApiError> {
        let file = self.load_file(file_key).await?;
        self.authorize(file.room_id, token, device).await?;
        let room = self.load_room(file.room_id).await?;

        if file.status() == FileStatus::Destroyed || room.is_expired(chrono::Utc::now()) {
            return Err(ApiError::Gone("file or room no longer available".into()));
        }

        let burn_mode = file.is_one_shot(room.mode());

        if burn_mode && file.download_count > 0 {
            return Err(ApiError::Gone("file already downloaded".into()));
        }

        if burn_mode && room.download_in_progress() {
            return Err(ApiError::Conflict("download already in progress".into()));
        }

        let signed_url = self
            .s3
            .presign_get(&file.blob_key, SIGNED_URL_TTL)
            .await
            .map_err(|_| ApiError::Internal)?;

        Ok(MintedDownload {
            signed_url,
            filename: file.filename,
            burn_mode,
            room_status: room.status.clone(),
        })
    }

    /// `GET /preview?fileKey=&proxy=true`: same gate as `mint`, but streams
    /// the object bytes through this server instead of handing back a signed
    /// URL, for viewers (e.g. sandboxed iframes) that can't follow a
    /// cross-origin redirect to the object store.
    pub async fn preview_bytes(
        &self,
        file_key: &str,
        token: Option<&str>,
        device: Option<&str>,
    ) -> Result<PreviewBytes, ApiError> {
        let file = self.load_file(file_key).await?;
        self.authorize(file.room_id, token, device).await?;
        let room = self.load_room(file.room_id).await?;

        if file.status() == FileStatus::Destroyed || room.is_expired(chrono::Utc::now()) {
            return Err(ApiError::Gone("file or room no longer available".into()));
        }

        let burn_mode = file.is_one_shot(room.mode());

        if burn_mode && file.download_count > 0 {
            return Err(ApiError::Gone("file already downloaded".into()));
        }

        if burn_mode && room.download_in_progress() {
            return Err(ApiError::Conflict("download already in progress".into()));
        }

        let bytes = self
            .s3
            .get_object_bytes(&file.blob_key)
            .await
            .map_err(|_| ApiError::Internal)?;

        Ok(PreviewBytes {
            bytes,
            content_type: file.content_type,
            filename: file.filename,
        })
    }

    /// `POST /download/start`: increments the refcount lock (DESIGN.md open
    /// question 2's resolution — a refcount rather than a boolean).
    pub async fn start(&self, room: Uuid, token: Option<&str>, device: Option<&str>) -> Result<(), ApiError> {
        self.authorize(room, token, device).await?;

        sqlx::query(
            "UPDATE rooms SET download_lock_count = download_lock_count + 1, last_download_activity = NOW() WHERE id = $1",
        )
        .bind(room)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// `POST /download/end`: clears the lock; on success, increments
    /// `download_count`, logs `file_download` (deduped at the database level
    /// by the caller's access-log service), and for burn/one-time files
    /// schedules the delayed blob+row destruction.
    pub async fn end(
        &self,
        room: Uuid,
        file_id: Uuid,
        success: bool,
        token: Option<&str>,
        device: Option<&str>,
    ) -> Result<(), ApiError> {
        self.authorize(room, token, device).await?;

        sqlx::query(
            "UPDATE rooms SET download_lock_count = GREATEST(download_lock_count - 1, 0) WHERE id = $1",
        )
        .bind(room)
        .execute(&self.db)
        .await?;

        if !success {
            return Ok(());
        }

        let file: Option<File> = sqlx::query_as("SELECT * FROM files WHERE id = $1 AND room_id = $2")
            .bind(file_id)
            .bind(room)
            .fetch_optional(&self.db)
            .await?;

        let Some(file) = file else {
            return Ok(());
        };

        sqlx::query("UPDATE files SET download_count = download_count + 1 WHERE id = $1")
            .bind(file_id)
            .execute(&self.db)
            .await?;

        let room_row = self.load_room(room).await?;
        if file.is_one_shot(room_row.mode()) {
            self.schedule_burn_destroy(room, file_id, room_row.mode());
        }

        Ok(())
    }

    /// Schedules the 3s grace period (spec §4.G) before a consumed
    /// burn/one-time file's blob and row are deleted.
    fn schedule_burn_destroy(&self, room: Uuid, file_id: Uuid, mode: RoomMode) {
        let db = self.db.clone();
        let s3 = self.s3.clone();
        let lifecycle = self.lifecycle.clone();
        let delay = self.capacity.burn_delete_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let blob_key: Option<(String,)> =
                sqlx::query_as("SELECT blob_key FROM files WHERE id = $1")
                    .bind(file_id)
                    .fetch_optional(&db)
                    .await
                    .ok()
                    .flatten();

            let Some((blob_key,)) = blob_key else {
                return;
            };

            if let Err(err) = s3.delete_object(&blob_key).await {
                tracing::warn!("burn-destroy: failed to delete blob {blob_key}: {err:?}");
            }

            let _ = sqlx::query("UPDATE files SET file_status = 'destroyed' WHERE id = $1")
                .bind(file_id)
                .execute(&db)
                .await;

            let _ = sqlx::query("DELETE FROM files WHERE id = $1")
                .bind(file_id)
                .execute(&db)
                .await;

            if mode == RoomMode::Burn {
                let remaining: Result<(i32,), _> =
                    sqlx::query_as("SELECT decrement_remaining_files($1)")
                        .bind(room)
                        .fetch_one(&db)
                        .await;

                if let Ok((remaining,)) = remaining {
                    if remaining == 0 {
                        let _ = lifecycle.begin_termination(room).await;
                    }
                }
            }
        });
    }

    /// `POST /download/bulk-mark`: the archive-path analog of `/end` for a
    /// batch of file ids.
    pub async fn bulk_mark(
        &self,
        room: Uuid,
        file_ids: &[Uuid],
        token: Option<&str>,
        device: Option<&str>,
    ) -> Result<i64, ApiError> {
        self.authorize(room, token, device).await?;

        let room_row = self.load_room(room).await?;
        let mut marked = 0i64;

        for &file_id in file_ids {
            let updated = sqlx::query(
                "UPDATE files SET download_count = download_count + 1 WHERE id = $1 AND room_id = $2",
            )
            .bind(file_id)
            .bind(room)
            .execute(&self.db)
            .await?;

            if updated.rows_affected() == 0 {
                continue;
            }
            marked += 1;

            if room_row.mode() == RoomMode::Burn {
                let (remaining,): (i32,) = sqlx::query_as("SELECT decrement_remaining_files($1)")
                    .bind(room)
                    .fetch_one(&self.db)
                    .await?;

                if remaining == 0 {
                    self.lifecycle.begin_termination(room).await?;
                }
            }
        }

        Ok(marked)
    }
}
