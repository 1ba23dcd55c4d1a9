use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;

/// Typed quota-violation kinds (spec §4.F), surfaced as `413` with a
/// machine-readable reason so the client can distinguish the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaViolation {
    TooManyFiles,
    SizeExceeded,
}

impl QuotaViolation {
    pub fn message(self) -> &'static str {
        match self {
            QuotaViolation::TooManyFiles => "too_many_files",
            QuotaViolation::SizeExceeded => "size_exceeded",
        }
    }
}

/// `EnsureQuota(room, incomingBytes)` (spec §4.F): reads the room's current
/// `file_count`/`total_size_bytes` and validates the projected values against
/// its (possibly per-room-overridden) `max_files`/`max_total_size_bytes`.
pub struct QuotaService {
    db: PgPool,
}

impl QuotaService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Called both at Initiate (cheap reject before any object-store work)
    /// and at Complete (recheck against concurrent uploads racing the same
    /// quota window).
    pub async fn ensure_quota(
        &self,
        room: Uuid,
        incoming_bytes: i64,
    ) -> Result<Result<(), QuotaViolation>, ApiError> {
        let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT file_count, total_size_bytes, max_files, max_total_size_bytes FROM rooms WHERE id = $1",
        )
        .bind(room)
        .fetch_optional(&self.db)
        .await?;

        let Some((file_count, total_size_bytes, max_files, max_total_size_bytes)) = row else {
            return Err(ApiError::NotFound("room not found".into()));
        };

        if file_count + 1 > max_files {
            return Ok(Err(QuotaViolation::TooManyFiles));
        }

        if total_size_bytes + incoming_bytes > max_total_size_bytes {
            return Ok(Err(QuotaViolation::SizeExceeded));
        }

        Ok(Ok(()))
    }

    /// Called once a Complete finalizes, bumping the room's running totals in
    /// lockstep with the newly persisted file row.
    pub async fn record_file(&self, room: Uuid, size_bytes: i64) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE rooms SET file_count = file_count + 1, total_size_bytes = total_size_bytes + $2 WHERE id = $1",
        )
        .bind(room)
        .bind(size_bytes)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn release_file(&self, room: Uuid, size_bytes: i64) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE rooms SET file_count = GREATEST(file_count - 1, 0), total_size_bytes = GREATEST(total_size_bytes - $2, 0) WHERE id = $1",
        )
        .bind(room)
        .bind(size_bytes)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
