use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::File,
    services::{quota_service::QuotaViolation, QuotaService, S3Service},
    utils::validation::is_valid_filename,
};

const PRESIGNED_PUT_TTL: Duration = Duration::from_secs(3600);
const PRESIGNED_PART_TTL: Duration = Duration::from_secs(3600);
const MAX_PART_COUNT: usize = 10_000;
/// Files at or above this size skip the heuristic scan (spec §4.E.3).
const LARGE_FILE_THRESHOLD_BYTES: i64 = 50 * 1024 * 1024;
/// Only the leading slice of small files is pattern-matched.
const SCAN_PEEK_BYTES: usize = 10 * 1024;

pub struct InitiateResult {
    pub upload_id: String,
    pub file_key: String,
    pub file_id: Uuid,
}

pub struct PresignedUploadResult {
    pub upload_url: String,
    pub file_id: Uuid,
    pub file_key: String,
}

pub struct CompletedPartInput {
    pub part_number: i32,
    pub etag: String,
}

/// Three-phase multipart orchestrator plus the single-PUT shortcut (spec
/// §4.E), modeled on the reference backend's `ImageService`/`handlers::media`
/// upload path but generalized from "resize-then-store one image" to
/// "stream arbitrary bytes through S3 multipart with quota gates".
pub struct UploadService {
    db: PgPool,
    s3: Arc<S3Service>,
    quota: QuotaService,
}

impl UploadService {
    pub fn new(db: PgPool, s3: Arc<S3Service>, quota: QuotaService) -> Self {
        Self { db, s3, quota }
    }

    fn blob_key(room: Uuid, file_id: Uuid, filename: &str) -> String {
        format!("{room}/{file_id}_{filename}")
    }

    async fn ensure_room_live(&self, room: Uuid) -> Result<(), ApiError> {
        let row: Option<(chrono::DateTime<Utc>, bool, String)> =
            sqlx::query_as("SELECT expires_at, is_permanent, status FROM rooms WHERE id = $1")
                .bind(room)
                .fetch_optional(&self.db)
                .await?;

        let Some((expires_at, is_permanent, status)) = row else {
            return Err(ApiError::NotFound("room not found".into()));
        };

        if status == "destroyed" {
            return Err(ApiError::Gone("room destroyed".into()));
        }

        if !is_permanent && expires_at < Utc::now() {
            return Err(ApiError::Gone("room expired".into()));
        }

        Ok(())
    }

    pub async fn initiate(
        &self,
        room: Uuid,
        filename: &str,
        size_bytes: i64,
        content_type: Option<&str>,
    ) -> Result<InitiateResult, ApiError> {
        if !is_valid_filename(filename) {
            return Err(ApiError::BadInput("invalid filename".into()));
        }
        if size_bytes <= 0 {
            return Err(ApiError::BadInput("fileSize must be > 0".into()));
        }

        self.ensure_room_live(room).await?;

        match self.quota.ensure_quota(room, size_bytes).await? {
            Err(violation) => {
                return Err(ApiError::PayloadTooLarge(violation.message().into()));
            }
            Ok(()) => {}
        }

        let file_id = Uuid::new_v4();
        let file_key = Self::blob_key(room, file_id, filename);

        let upload_id = self
            .s3
            .create_multipart_upload(&file_key, content_type)
            .await
            .map_err(|_| ApiError::Internal)?;

        Ok(InitiateResult {
            upload_id,
            file_key,
            file_id,
        })
    }

    pub async fn presigned_upload(
        &self,
        room: Uuid,
        filename: &str,
        size_bytes: i64,
        content_type: Option<&str>,
    ) -> Result<PresignedUploadResult, ApiError> {
        if !is_valid_filename(filename) {
            return Err(ApiError::BadInput("invalid filename".into()));
        }
        if size_bytes <= 0 {
            return Err(ApiError::BadInput("fileSize must be > 0".into()));
        }

        self.ensure_room_live(room).await?;

        match self.quota.ensure_quota(room, size_bytes).await? {
            Err(violation) => {
                return Err(ApiError::PayloadTooLarge(violation.message().into()));
            }
            Ok(()) => {}
        }

        let file_id = Uuid::new_v4();
        let file_key = Self::blob_key(room, file_id, filename);

        let upload_url = self
            .s3
            .presign_put(&file_key, content_type, PRESIGNED_PUT_TTL)
            .await
            .map_err(|_| ApiError::Internal)?;

        Ok(PresignedUploadResult {
            upload_url,
            file_id,
            file_key,
        })
    }

    pub async fn sign_part_urls(
        &self,
        file_key: &str,
        upload_id: &str,
        part_numbers: &[i32],
    ) -> Result<Vec<(i32, String)>, ApiError> {
        if part_numbers.is_empty() || part_numbers.len() > MAX_PART_COUNT {
            return Err(ApiError::BadInput(
                "part count must be between 1 and 10000".into(),
            ));
        }

        let parts = self
            .s3
            .presign_upload_parts(file_key, upload_id, part_numbers, PRESIGNED_PART_TTL)
            .await
            .map_err(|_| ApiError::Internal)?;

        Ok(parts.into_iter().map(|p| (p.part_number, p.url)).collect())
    }

    /// Complete (spec §4.E phase 3): finalize with the client-submitted
    /// ordered `(partNumber, etag)` pairs.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete(
        &self,
        room: Uuid,
        file_id: Uuid,
        upload_id: &str,
        file_key: &str,
        filename: &str,
        size_bytes: i64,
        content_type: Option<&str>,
        message: Option<&str>,
        parts: Vec<CompletedPartInput>,
    ) -> Result<File, ApiError> {
        self.ensure_room_live(room).await?;

        if let Err(violation) = self.quota.ensure_quota(room, size_bytes).await? {
            let _ = self.s3.abort_multipart_upload(file_key, upload_id).await;
            return Err(ApiError::PayloadTooLarge(violation.message().into()));
        }

        let ordered: Vec<(i32, String)> = parts.into_iter().map(|p| (p.part_number, p.etag)).collect();

        if self
            .s3
            .complete_multipart_upload(file_key, upload_id, ordered)
            .await
            .is_err()
        {
            let _ = self.s3.abort_multipart_upload(file_key, upload_id).await;
            return Err(ApiError::Internal);
        }

        let peek = self.peek_for_scan(file_key, size_bytes).await;

        self.finalize_file(
            room,
            file_id,
            file_key,
            filename,
            size_bytes,
            content_type,
            message,
            peek.as_deref(),
        )
        .await
    }

    /// Fetches the leading slice needed by the content half of the scan
    /// heuristic (spec §4.E.3).
    /// Large files skip the fetch entirely since they're auto-marked safe
    /// regardless of content; a failed peek degrades to "no peek" rather
    /// than failing the whole Complete call.
    async fn peek_for_scan(&self, file_key: &str, size_bytes: i64) -> Option<Vec<u8>> {
        if size_bytes >= LARGE_FILE_THRESHOLD_BYTES {
            return None;
        }

        match self.s3.peek_object_head(file_key, SCAN_PEEK_BYTES).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!("scan peek failed for {file_key}: {err:?}");
                None
            }
        }
    }

    pub async fn abort(&self, file_key: &str, upload_id: &str) -> Result<(), ApiError> {
        self.s3
            .abort_multipart_upload(file_key, upload_id)
            .await
            .map_err(|_| ApiError::Internal)
    }

    /// Finalizes the single-PUT shortcut (no multipart handle to complete or
    /// abort against) with the same quota recheck `complete` performs.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_direct(
        &self,
        room: Uuid,
        file_id: Uuid,
        file_key: &str,
        filename: &str,
        size_bytes: i64,
        content_type: Option<&str>,
        message: Option<&str>,
    ) -> Result<File, ApiError> {
        self.ensure_room_live(room).await?;

        if let Err(violation) = self.quota.ensure_quota(room, size_bytes).await? {
            return Err(ApiError::PayloadTooLarge(violation.message().into()));
        }

        let peek = self.peek_for_scan(file_key, size_bytes).await;

        self.finalize_file(
            room,
            file_id,
            file_key,
            filename,
            size_bytes,
            content_type,
            message,
            peek.as_deref(),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_file(
        &self,
        room: Uuid,
        file_id: Uuid,
        file_key: &str,
        filename: &str,
        size_bytes: i64,
        content_type: Option<&str>,
        message: Option<&str>,
        peek_bytes: Option<&[u8]>,
    ) -> Result<File, ApiError> {
        let (scan_status, scan_result) = classify_scan(filename, size_bytes, peek_bytes);

        let file = sqlx::query_as::<_, File>(
            r#"
            INSERT INTO files (id, room_id, filename, blob_key, size_bytes, content_type, scan_status, scan_result, message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(file_id)
        .bind(room)
        .bind(filename)
        .bind(file_key)
        .bind(size_bytes)
        .bind(content_type)
        .bind(scan_status)
        .bind(scan_result)
        .bind(message)
        .fetch_one(&self.db)
        .await?;

        self.quota.record_file(room, size_bytes).await?;

        let (_,): (i32,) = sqlx::query_as("SELECT increment_remaining_files($1)")
            .bind(room)
            .fetch_one(&self.db)
            .await?;

        Ok(file)
    }
}

/// Extensions treated as executable/script payloads by the denylist half of
/// the scan heuristic (spec §4.E.3).
const DENYLISTED_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "msi", "vbs", "vbe", "js", "jse", "wsf", "wsh", "ps1",
    "ps1xml", "psc1", "jar", "app", "dmg", "pkg", "sh", "bin", "deb", "rpm",
];

/// Scan policy (spec §4.E.3): large files are auto-marked safe; smaller
/// files get a deferred heuristic scan over an extension denylist, a
/// double-extension disguise check, and the first 10 KB of content.
fn classify_scan(filename: &str, size_bytes: i64, peek_bytes: Option<&[u8]>) -> (&'static str, &'static str) {
    if size_bytes >= LARGE_FILE_THRESHOLD_BYTES {
        return ("safe", "Large file — skipped heuristic scan.");
    }

    if has_denylisted_extension(filename) {
        return ("risky", "Pending scan — executable file extension flagged.");
    }

    if has_double_extension(filename) {
        return ("risky", "Pending scan — double file extension flagged.");
    }

    if let Some(bytes) = peek_bytes {
        let slice = &bytes[..bytes.len().min(SCAN_PEEK_BYTES)];
        if contains_risky_pattern(slice) {
            return ("risky", "Pending scan — suspicious content pattern detected.");
        }
    }

    ("unknown", "Pending scan...")
}

fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

fn has_denylisted_extension(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| DENYLISTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Disguise pattern like `invoice.pdf.exe`: two or more dotted suffixes,
/// each itself extension-shaped, where the last masks the file as something
/// else.
fn has_double_extension(filename: &str) -> bool {
    let parts: Vec<&str> = filename.split('.').collect();
    if parts.len() < 3 {
        return false;
    }

    let last = parts[parts.len() - 1];
    let second_last = parts[parts.len() - 2];
    let extension_shaped =
        |s: &str| !s.is_empty() && s.len() <= 8 && s.chars().all(|c| c.is_ascii_alphanumeric());

    extension_shaped(last) && extension_shaped(second_last)
}

fn contains_risky_pattern(bytes: &[u8]) -> bool {
    const NEEDLES: [&[u8]; 4] = [b"eval(", b"exec(", b"<script", b"powershell"];
    NEEDLES.iter().any(|needle| contains_subslice(bytes, needle))
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_files_are_auto_safe() {
        let (status, _) = classify_scan("movie.mp4", 60 * 1024 * 1024, None);
        assert_eq!(status, "safe");
    }

    #[test]
    fn small_clean_file_is_pending() {
        let (status, _) = classify_scan("notes.txt", 1024, Some(b"hello world"));
        assert_eq!(status, "unknown");
    }

    #[test]
    fn risky_pattern_is_flagged() {
        let (status, _) = classify_scan("notes.txt", 1024, Some(b"<html><script>alert(1)</script>"));
        assert_eq!(status, "risky");
    }

    #[test]
    fn denylisted_extension_is_flagged_regardless_of_content() {
        let (status, _) = classify_scan("invoice.exe", 1024, Some(b"hello world"));
        assert_eq!(status, "risky");
    }

    #[test]
    fn double_extension_disguise_is_flagged() {
        let (status, _) = classify_scan("invoice.pdf.exe", 1024, None);
        assert_eq!(status, "risky");
    }

    #[test]
    fn single_extension_is_not_a_double_extension() {
        assert!(!has_double_extension("report.pdf"));
        assert!(!has_double_extension("no-extension-at-all"));
    }

    #[test]
    fn blob_key_matches_spec_shape() {
        let room = Uuid::nil();
        let file_id = Uuid::nil();
        let key = UploadService::blob_key(room, file_id, "report.pdf");
        assert_eq!(
            key,
            format!("{room}/{file_id}_report.pdf")
        );
    }
}
