pub mod database;
mod settings;

pub use database::DatabaseConfig;
pub use settings::{
    CapacityConfig, MailerConfig, OverloadConfig, QuotaConfig, RateLimitConfig, S3Config,
    ServerConfig, Settings,
};
