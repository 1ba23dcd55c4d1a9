use anyhow::{Context, Result};
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::Region,
    presigning::PresigningConfig,
    types::{CompletedMultipartUpload, CompletedPart},
    Client as RawS3Client,
};
use std::time::Duration;

use crate::config::S3Config;

/// Wraps `aws-sdk-s3` the same way the reference backend's `ImageService`
/// builds its S3 backend (credentials, region, optional custom endpoint,
/// `force_path_style` for MinIO/R2-style providers), generalized here to the
/// multipart-orchestration surface spec §4.E/§4.G/§4.H need instead of the
/// reference backend's single `put_object` call.
pub struct S3Service {
    client: RawS3Client,
    bucket: String,
}

pub struct PresignedPart {
    pub part_number: i32,
    pub url: String,
}

impl S3Service {
    pub async fn from_config(config: &S3Config) -> Result<Self> {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            config.session_token.clone(),
            None,
            "env",
        );

        let region = Region::new(config.region.clone());
        let region_provider = RegionProviderChain::first_try(region.clone());

        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(region)
            .force_path_style(config.force_path_style);

        if let Some(endpoint) = config.endpoint.as_deref() {
            builder = builder.endpoint_url(normalize_endpoint(endpoint));
        }

        let client = RawS3Client::from_conf(builder.build());

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    /// Initiate (spec §4.E phase 1): ask the object store for an upload
    /// handle. Failure here leaves no database state, by contract of the
    /// caller never persisting before this returns `Ok`.
    pub async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        let mut request = self.client.create_multipart_upload().bucket(&self.bucket).key(key);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        let output = request
            .send()
            .await
            .context("failed to create multipart upload")?;

        output
            .upload_id()
            .map(str::to_string)
            .context("object store did not return an upload id")
    }

    /// Sign Part URLs (spec §4.E phase 2): presigned PUT URLs valid for 1
    /// hour, idempotent for any subset of part numbers.
    pub async fn presign_upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        part_numbers: &[i32],
        ttl: Duration,
    ) -> Result<Vec<PresignedPart>> {
        let mut parts = Vec::with_capacity(part_numbers.len());

        for &part_number in part_numbers {
            let presigned = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .presigned(PresigningConfig::expires_in(ttl)?)
                .await
                .context("failed to presign upload-part url")?;

            parts.push(PresignedPart {
                part_number,
                url: presigned.uri().to_string(),
            });
        }

        Ok(parts)
    }

    /// Complete (spec §4.E phase 3): finalize with the ordered `(partNumber,
    /// etag)` list the client collected from its part uploads.
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()> {
        let completed_parts: Vec<CompletedPart> = parts
            .into_iter()
            .map(|(part_number, etag)| {
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .context("failed to complete multipart upload")?;

        Ok(())
    }

    /// Abort (spec §4.E phase 4): idempotent, succeeds unconditionally on a
    /// missing handle.
    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!("abort_multipart_upload for {key} ({upload_id}) failed: {err:?}");
                Ok(())
            }
        }
    }

    /// Single-PUT presigned URL for the non-multipart upload path.
    pub async fn presign_put(
        &self,
        key: &str,
        content_type: Option<&str>,
        ttl: Duration,
    ) -> Result<String> {
        let mut request = self.client.put_object().bucket(&self.bucket).key(key);
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        let presigned = request
            .presigned(PresigningConfig::expires_in(ttl)?)
            .await
            .context("failed to presign put url")?;

        Ok(presigned.uri().to_string())
    }

    /// Presigned GET for download/preview (spec §4.G/§4.H), 5-minute expiry.
    pub async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(ttl)?)
            .await
            .context("failed to presign get url")?;

        Ok(presigned.uri().to_string())
    }

    /// Fetch raw object bytes for the bulk archive stream (spec §4.H), which
    /// needs to read each member's bytes to write them into the zip writer.
    pub async fn get_object_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to fetch object")?;

        let bytes = output
            .body
            .collect()
            .await
            .context("failed to read object body")?;

        Ok(bytes.into_bytes().to_vec())
    }

    /// Fetches the leading `max_bytes` of an object for the upload-complete
    /// heuristic scan (spec §4.E.3), via a ranged GET so a large file's
    /// deferred scan never has to download the whole blob.
    pub async fn peek_object_head(&self, key: &str, max_bytes: usize) -> Result<Vec<u8>> {
        let range = format!("bytes=0-{}", max_bytes.saturating_sub(1));

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range)
            .send()
            .await
            .context("failed to fetch object range")?;

        let bytes = output
            .body
            .collect()
            .await
            .context("failed to read object range body")?;

        Ok(bytes.into_bytes().to_vec())
    }

    /// Best-effort delete; callers log and continue on failure (spec §4.I
    /// "Deletes all blobs (best-effort, continue on individual failures)").
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete object")?;

        Ok(())
    }

    /// Lists in-flight multipart uploads so the reaper can abort orphaned
    /// initiations (spec §4.I/§4.L) older than the configured staleness
    /// threshold.
    pub async fn list_stale_multipart_uploads(
        &self,
        older_than: chrono::Duration,
    ) -> Result<Vec<(String, String)>> {
        let output = self
            .client
            .list_multipart_uploads()
            .bucket(&self.bucket)
            .send()
            .await
            .context("failed to list multipart uploads")?;

        let cutoff = chrono::Utc::now() - older_than;

        let stale = output
            .uploads()
            .iter()
            .filter_map(|upload| {
                let initiated = upload.initiated()?;
                let initiated_at =
                    chrono::DateTime::from_timestamp(initiated.secs(), 0)?;
                if initiated_at < cutoff {
                    Some((upload.key()?.to_string(), upload.upload_id()?.to_string()))
                } else {
                    None
                }
            })
            .collect();

        Ok(stale)
    }
}

fn normalize_endpoint(raw: &str) -> String {
    let endpoint = raw.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}
