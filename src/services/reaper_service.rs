use chrono::Duration as ChronoDuration;
use std::sync::Arc;

use crate::services::{LifecycleService, S3Service};

/// Reaper (spec §4.L). Single-shot, sequential: abort stale multipart
/// uploads, then sweep expired rooms. The scheduler (a `tokio::time::interval`
/// loop, or an admin-triggered call) guarantees this never runs concurrently
/// with itself.
pub struct ReaperService {
    s3: Arc<S3Service>,
    lifecycle: Arc<LifecycleService>,
    multipart_stale_after: ChronoDuration,
}

impl ReaperService {
    pub fn new(
        s3: Arc<S3Service>,
        lifecycle: Arc<LifecycleService>,
        multipart_stale_after: std::time::Duration,
    ) -> Self {
        Self {
            s3,
            lifecycle,
            multipart_stale_after: ChronoDuration::from_std(multipart_stale_after)
                .unwrap_or_else(|_| ChronoDuration::hours(24)),
        }
    }

    pub async fn run_once(&self) {
        let stale = match self.s3.list_stale_multipart_uploads(self.multipart_stale_after).await {
            Ok(stale) => stale,
            Err(err) => {
                tracing::warn!("reaper: failed to list stale multipart uploads: {err:?}");
                Vec::new()
            }
        };

        for (key, upload_id) in stale {
            if let Err(err) = self.s3.abort_multipart_upload(&key, &upload_id).await {
                tracing::warn!("reaper: failed to abort stale multipart upload {upload_id} for {key}: {err:?}");
            }
        }

        match self.lifecycle.sweep_expired_rooms().await {
            Ok(swept) => {
                if swept > 0 {
                    tracing::info!("reaper: swept {swept} expired rooms");
                }
            }
            Err(err) => tracing::warn!("reaper: failed to sweep expired rooms: {err:?}"),
        }
    }
}
