use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::CapacityConfig,
    error::ApiError,
    models::Room,
    services::{Scheduler, S3Service},
};

/// Room lifecycle state machine: `active` → `terminating` → `destroyed`
/// (spec §4.I). The destruction countdown and the download lock are the
/// synchronization point any invalidating code path must consult.
pub struct LifecycleService {
    db: PgPool,
    s3: Arc<S3Service>,
    scheduler: Scheduler,
    capacity: CapacityConfig,
}

impl LifecycleService {
    pub fn new(db: PgPool, s3: Arc<S3Service>, scheduler: Scheduler, capacity: CapacityConfig) -> Self {
        Self {
            db,
            s3,
            scheduler,
            capacity,
        }
    }

    /// Burn exhaustion (spec §4.I): when `remaining_files` drops to 0, enter
    /// `terminating` and arm the destruction countdown.
    pub async fn begin_termination(self: &Arc<Self>, room: Uuid) -> Result<(), ApiError> {
        let updated = sqlx::query(
            "UPDATE rooms SET status = 'terminating', termination_started_at = NOW() WHERE id = $1 AND status = 'active'",
        )
        .bind(room)
        .execute(&self.db)
        .await?;

        if updated.rows_affected() > 0 {
            self.clone().schedule_destruction_check(room);
        }

        Ok(())
    }

    /// Arms (or re-arms) the 30s destruction-countdown timer for `room`.
    pub fn schedule_destruction_check(self: Arc<Self>, room: Uuid) {
        let delay = self.capacity.destruction_countdown;
        let this = self.clone();
        tokio::spawn(async move {
            this.scheduler
                .schedule(room, delay, async move {
                    this.check_and_destroy(room).await;
                })
                .await;
        });
    }

    /// Timer fire (spec §4.I step 1-3): re-entrant safe, respects the
    /// download lock.
    async fn check_and_destroy(self: Arc<Self>, room: Uuid) {
        let current: Option<Room> = match sqlx::query_as("SELECT * FROM rooms WHERE id = $1")
            .bind(room)
            .fetch_optional(&self.db)
            .await
        {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!("destruction check failed to reload room {room}: {err:?}");
                return;
            }
        };

        let Some(current) = current else {
            return; // room already gone, nothing to do
        };

        if current.status() != crate::models::RoomStatus::Terminating {
            return; // re-entrant safe: someone else already moved it on
        }

        if current.download_in_progress() {
            self.clone().schedule_destruction_check(room);
            return;
        }

        self.destroy_room(room).await;
    }

    /// Final step: delete all blobs (best-effort), mark destroyed, then
    /// delete the room row (cascades files/presence/counter/index).
    async fn destroy_room(&self, room: Uuid) {
        let files: Vec<(String,)> =
            sqlx::query_as("SELECT blob_key FROM files WHERE room_id = $1")
                .bind(room)
                .fetch_all(&self.db)
                .await
                .unwrap_or_default();

        for (blob_key,) in files {
            if let Err(err) = self.s3.delete_object(&blob_key).await {
                tracing::warn!("failed to delete blob {blob_key} during room destruction: {err:?}");
            }
        }

        let _ = sqlx::query("UPDATE rooms SET status = 'destroyed' WHERE id = $1")
            .bind(room)
            .execute(&self.db)
            .await;

        if let Err(err) = sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(room)
            .execute(&self.db)
            .await
        {
            tracing::warn!("failed to delete room row {room}: {err:?}");
        }

        self.scheduler.cancel(room).await;
    }

    /// Author delete (`DELETE /api/delete-room/:roomId`). Caller has already
    /// verified the author token. Returns the number of files deleted.
    pub async fn delete_room_as_author(&self, room: Uuid) -> Result<i64, ApiError> {
        let files: Vec<(String,)> =
            sqlx::query_as("SELECT blob_key FROM files WHERE room_id = $1")
                .bind(room)
                .fetch_all(&self.db)
                .await?;

        let files_deleted = files.len() as i64;

        for (blob_key,) in files {
            if let Err(err) = self.s3.delete_object(&blob_key).await {
                tracing::warn!("failed to delete blob {blob_key} for author delete: {err:?}");
            }
        }

        let result = sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(room)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("room not found".into()));
        }

        self.scheduler.cancel(room).await;

        Ok(files_deleted)
    }

    /// Expiry reaper (spec §4.L): delete each blob then the room row, for
    /// every non-permanent room past `expires_at`.
    pub async fn sweep_expired_rooms(&self) -> Result<u64, ApiError> {
        let expired: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM rooms WHERE expires_at < NOW() AND is_permanent = FALSE",
        )
        .fetch_all(&self.db)
        .await?;

        let mut swept = 0u64;
        for room in expired {
            let files: Vec<(String,)> =
                sqlx::query_as("SELECT blob_key FROM files WHERE room_id = $1")
                    .bind(room)
                    .fetch_all(&self.db)
                    .await
                    .unwrap_or_default();

            for (blob_key,) in files {
                if let Err(err) = self.s3.delete_object(&blob_key).await {
                    tracing::warn!("reaper: failed to delete blob {blob_key}: {err:?}");
                }
            }

            match sqlx::query("DELETE FROM rooms WHERE id = $1")
                .bind(room)
                .execute(&self.db)
                .await
            {
                Ok(_) => {
                    self.scheduler.cancel(room).await;
                    swept += 1;
                }
                Err(err) => tracing::warn!("reaper: failed to delete room {room}: {err:?}"),
            }
        }

        Ok(swept)
    }

    /// Cancel every pending destruction timer (clean shutdown, spec §6).
    pub async fn cancel_all_timers(&self) {
        self.scheduler.cancel_all().await;
    }
}
