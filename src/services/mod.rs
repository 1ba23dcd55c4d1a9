pub mod access_log_service;
pub mod bulk_service;
pub mod download_service;
pub mod geo_service;
pub mod identity_service;
pub mod invite_service;
pub mod lifecycle_service;
pub mod mailer_service;
pub mod presence_service;
pub mod quota_service;
pub mod reaper_service;
pub mod room_service;
pub mod s3_service;
pub mod scheduler;
pub mod upload_service;

pub use access_log_service::AccessLogService;
pub use bulk_service::{ArchiveResult, BulkService};
pub use download_service::{DownloadService, MintedDownload, PreviewBytes};
pub use geo_service::{GeoLocation, GeoProvider, NullGeoProvider};
pub use identity_service::IdentityService;
pub use invite_service::InviteService;
pub use lifecycle_service::LifecycleService;
pub use mailer_service::{Mailer, NoopMailer, SmtpMailer};
pub use presence_service::{AdmitResult, PresenceService};
pub use quota_service::{QuotaService, QuotaViolation};
pub use reaper_service::ReaperService;
pub use room_service::{ActivityEntry, CapacityGauge, CreatedRoom, NewRoom, RoomService};
pub use s3_service::{PresignedPart, S3Service};
pub use scheduler::Scheduler;
pub use upload_service::{CompletedPartInput, InitiateResult, PresignedUploadResult, UploadService};
