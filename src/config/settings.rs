use super::DatabaseConfig;
use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub force_path_style: bool,
}

/// Room-lifecycle tunables from spec §3/§4.I.
#[derive(Debug, Clone)]
pub struct CapacityConfig {
    /// A room capacity at or above this value is treated as unlimited (spec §4.C).
    pub unlimited_threshold: i32,
    /// Default per-room capacity ceiling when a room is created without one.
    pub default_capacity: i32,
    /// Active window for presence rows (spec §4.B), default 120s.
    pub active_window: Duration,
    /// Destruction countdown after a room enters `terminating` (spec §4.I), default 30s.
    pub destruction_countdown: Duration,
    /// Burn-destroy grace period after a successful download completes (spec §4.G), default 3s.
    pub burn_delete_delay: Duration,
}

/// Per-room quota defaults (spec §4.F).
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub max_files: i64,
    pub max_total_size_bytes: i64,
}

/// Overload-guard ceilings (spec §4.D).
#[derive(Debug, Clone)]
pub struct OverloadConfig {
    pub sample_interval: Duration,
    pub max_resident_mb: u64,
    pub min_free_system_mb: u64,
    pub max_load_per_cpu: f64,
}

/// Route-class rate-limit table (spec §4.D).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub global_window: Duration,
    pub global_max: u32,
    pub upload_window: Duration,
    pub upload_max: u32,
    pub presign_window: Duration,
    pub presign_max: u32,
    pub download_window: Duration,
    pub download_max: u32,
    pub room_access_window: Duration,
    pub room_access_max: u32,
    pub heartbeat_window: Duration,
    pub heartbeat_max: u32,
    pub activity_window: Duration,
    pub activity_max: u32,
    pub delete_window: Duration,
    pub delete_max: u32,
    pub invite_window: Duration,
    pub invite_max: u32,
    pub invite_per_recipient_window: Duration,
    pub invite_per_recipient_max: u32,
    pub invite_per_ip_room_window: Duration,
    pub invite_per_ip_room_max: u32,
    pub invite_min_interval: Duration,
    pub admin_window: Duration,
    pub admin_max: u32,
}

#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub frontend_origin: String,
    pub allow_localhost_origins: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub s3: S3Config,
    pub capacity: CapacityConfig,
    pub quota: QuotaConfig,
    pub overload: OverloadConfig,
    pub rate_limit: RateLimitConfig,
    pub mailer: MailerConfig,
    pub admin_bearer_token: String,
    /// Staleness threshold for orphaned multipart uploads (spec §4.L), default 24h.
    pub multipart_stale_after: Duration,
    /// Reaper interval when run as an in-process background loop (spec §4.L).
    pub reaper_interval: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env_parse("PORT", 8080),
                host: env_or("HOST", "0.0.0.0"),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 20),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 5),
            },
            s3: S3Config {
                bucket: std::env::var("S3_BUCKET").expect("S3_BUCKET must be set"),
                region: env_or("S3_REGION", "us-east-1"),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                access_key_id: std::env::var("S3_ACCESS_KEY_ID").unwrap_or_default(),
                secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").unwrap_or_default(),
                session_token: std::env::var("S3_SESSION_TOKEN").ok(),
                force_path_style: env_parse("S3_FORCE_PATH_STYLE", true),
            },
            capacity: CapacityConfig {
                unlimited_threshold: env_parse("ROOM_CAPACITY_UNLIMITED_THRESHOLD", 999),
                default_capacity: env_parse("ROOM_DEFAULT_CAPACITY", 999),
                active_window: Duration::from_secs(env_parse("PRESENCE_ACTIVE_WINDOW_SECS", 120)),
                destruction_countdown: Duration::from_secs(env_parse(
                    "ROOM_DESTRUCTION_COUNTDOWN_SECS",
                    30,
                )),
                burn_delete_delay: Duration::from_secs(env_parse("BURN_DELETE_DELAY_SECS", 3)),
            },
            quota: QuotaConfig {
                max_files: env_parse("ROOM_MAX_FILES", 100),
                max_total_size_bytes: env_parse(
                    "ROOM_MAX_TOTAL_SIZE_BYTES",
                    4 * 1024 * 1024 * 1024,
                ),
            },
            overload: OverloadConfig {
                sample_interval: Duration::from_secs(env_parse("OVERLOAD_SAMPLE_INTERVAL_SECS", 3)),
                max_resident_mb: env_parse("OVERLOAD_MAX_RESIDENT_MB", 1536),
                min_free_system_mb: env_parse("OVERLOAD_MIN_FREE_SYSTEM_MB", 128),
                max_load_per_cpu: env_parse("OVERLOAD_MAX_LOAD_PER_CPU", 2.0),
            },
            rate_limit: RateLimitConfig {
                global_window: Duration::from_secs(15 * 60),
                global_max: env_parse("RATE_GLOBAL_MAX", 300),
                upload_window: Duration::from_secs(15 * 60),
                upload_max: env_parse("RATE_UPLOAD_MAX", 30),
                presign_window: Duration::from_secs(60),
                presign_max: env_parse("RATE_PRESIGN_MAX", 12),
                download_window: Duration::from_secs(15 * 60),
                download_max: env_parse("RATE_DOWNLOAD_MAX", 80),
                room_access_window: Duration::from_secs(60),
                room_access_max: env_parse("RATE_ROOM_ACCESS_MAX", 4),
                heartbeat_window: Duration::from_secs(60),
                heartbeat_max: env_parse("RATE_HEARTBEAT_MAX", 12),
                activity_window: Duration::from_secs(60),
                activity_max: env_parse("RATE_ACTIVITY_MAX", 60),
                delete_window: Duration::from_secs(60),
                delete_max: env_parse("RATE_DELETE_MAX", 8),
                invite_window: Duration::from_secs(10 * 60),
                invite_max: env_parse("RATE_INVITE_MAX", 6),
                invite_per_recipient_window: Duration::from_secs(60 * 60),
                invite_per_recipient_max: env_parse("RATE_INVITE_PER_RECIPIENT_MAX", 3),
                invite_per_ip_room_window: Duration::from_secs(30 * 60),
                invite_per_ip_room_max: env_parse("RATE_INVITE_PER_IP_ROOM_MAX", 3),
                invite_min_interval: Duration::from_secs(env_parse(
                    "RATE_INVITE_MIN_INTERVAL_SECS",
                    8,
                )),
                admin_window: Duration::from_secs(60),
                admin_max: env_parse("RATE_ADMIN_MAX", 20),
            },
            mailer: MailerConfig {
                smtp_host: env_or("SMTP_HOST", "localhost"),
                smtp_port: env_parse("SMTP_PORT", 587),
                smtp_username: env_or("SMTP_USERNAME", ""),
                smtp_password: env_or("SMTP_PASSWORD", ""),
                from_address: env_or("MAIL_FROM", "no-reply@example.com"),
                frontend_origin: std::env::var("FRONTEND_ORIGIN")
                    .expect("FRONTEND_ORIGIN must be set"),
                allow_localhost_origins: env_parse("ALLOW_LOCALHOST_ORIGINS", false),
            },
            admin_bearer_token: std::env::var("ADMIN_BEARER_TOKEN").unwrap_or_default(),
            multipart_stale_after: Duration::from_secs(env_parse(
                "MULTIPART_STALE_AFTER_SECS",
                24 * 60 * 60,
            )),
            reaper_interval: Duration::from_secs(env_parse("REAPER_INTERVAL_SECS", 60 * 60)),
        })
    }
}
