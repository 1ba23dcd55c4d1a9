use sqlx::PgPool;
use std::io::{Cursor, Write};
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::ApiError, models::File, services::S3Service, utils::slug::generate_simple_slug};

pub struct ArchiveResult {
    pub bytes: Vec<u8>,
    pub archive_filename: String,
}

/// Bulk Archiver (spec §4.H): streams every live file in a room into a
/// single zip, tolerating individual member failures.
pub struct BulkService {
    db: PgPool,
    s3: Arc<S3Service>,
}

impl BulkService {
    pub fn new(db: PgPool, s3: Arc<S3Service>) -> Self {
        Self { db, s3 }
    }

    pub async fn build_archive(&self, room: Uuid) -> Result<ArchiveResult, ApiError> {
        let room_name: Option<(String,)> = sqlx::query_as("SELECT name FROM rooms WHERE id = $1")
            .bind(room)
            .fetch_optional(&self.db)
            .await?;

        let Some((room_name,)) = room_name else {
            return Err(ApiError::NotFound("room not found".into()));
        };

        let files: Vec<File> = sqlx::query_as(
            "SELECT * FROM files WHERE room_id = $1 AND file_status = 'live' ORDER BY created_at",
        )
        .bind(room)
        .fetch_all(&self.db)
        .await?;

        if files.is_empty() {
            return Err(ApiError::NotFound("room has no files".into()));
        }

        let mut members = Vec::with_capacity(files.len());
        for file in &files {
            match self.s3.get_object_bytes(&file.blob_key).await {
                Ok(bytes) => members.push((file.filename.clone(), bytes)),
                Err(err) => {
                    tracing::warn!(
                        "bulk archive: failed to stream {} ({}): {err:?}",
                        file.filename,
                        file.blob_key
                    );
                }
            }
        }

        let bytes = tokio::task::spawn_blocking(move || write_zip(members))
            .await
            .map_err(|_| ApiError::Internal)?
            .map_err(|_| ApiError::Internal)?;

        let archive_filename = format!("{}.zip", generate_simple_slug(&room_name));

        Ok(ArchiveResult {
            bytes,
            archive_filename,
        })
    }
}

fn write_zip(members: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (filename, bytes) in members {
            writer.start_file(&filename, options)?;
            writer.write_all(&bytes)?;
        }

        writer.finish()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_all_members_into_the_archive() {
        let members = vec![
            ("a.txt".to_string(), b"hello".to_vec()),
            ("b.txt".to_string(), b"world".to_vec()),
        ];

        let bytes = write_zip(members).unwrap();
        let reader = zip::ZipArchive::new(Cursor::new(bytes));
        assert!(reader.is_ok());
        assert_eq!(reader.unwrap().len(), 2);
    }
}
